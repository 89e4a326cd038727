//! Dex command - pre-dex libraries through a shared cache

use crate::cache::hash::SourceHash;
use crate::cli::args::DexArgs;
use crate::config::{Config, ConfigManager};
use crate::dex::{BuildToolInfo, DexOptions, DexTransform, DxProcess, PreDexCache};
use crate::error::{PredexError, PredexResult};
use console::style;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::{debug, info};

const OUTPUT_HASH_LEN: usize = 8;

/// One library and where its dex output goes
#[derive(Debug, Clone, PartialEq, Eq)]
struct DexJob {
    input: PathBuf,
    output: PathBuf,
}

/// Execute the dex command
pub fn execute(args: DexArgs, config: &Config) -> PredexResult<()> {
    let mut options = config.dex.clone();
    if args.jumbo {
        options.jumbo_mode = true;
    }

    let tools = config.build_tools.tool_info();
    let dexer = DxProcess::new(&tools);

    let store = if config.cache.enabled && !args.no_cache {
        Some(ConfigManager::store_path(config))
    } else {
        debug!("Store file disabled for this run");
        None
    };

    fs::create_dir_all(&args.out_dir)
        .map_err(|e| PredexError::io(format!("creating {}", args.out_dir.display()), e))?;

    let jobs = plan_jobs(&args.inputs, &args.out_dir, args.multi_dex)?;
    let workers = args
        .jobs
        .or_else(|| thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
        .clamp(1, jobs.len().max(1));

    let cache = PreDexCache::new();
    if let Some(store) = &store {
        cache.load(store);
    }

    info!("Pre-dexing {} librar(ies) on {} worker(s)", jobs.len(), workers);
    let failures = run_jobs(&cache, &jobs, workers, args.multi_dex, &options, &tools, &dexer);

    let stats = cache.clear(store.as_deref())?;

    for (job, err) in &failures {
        eprintln!(
            "{} {}: {}",
            style("✗").red(),
            job.input.display(),
            err
        );
    }

    if !failures.is_empty() {
        return Err(PredexError::User(format!(
            "{} of {} librar(ies) failed to pre-dex",
            failures.len(),
            jobs.len()
        )));
    }

    println!(
        "{} Pre-dexed {} librar(ies): {}",
        style("✓").green(),
        jobs.len(),
        stats
    );
    Ok(())
}

/// Resolve inputs to absolute paths and pick an output location for each
///
/// Output names carry a short hash of the absolute input path, so libraries
/// sharing a file name never share an output. Single-dex output is
/// `<out_dir>/<stem>-<hash>.<ext>`; multi-dex output is the directory
/// `<out_dir>/<stem>-<hash>`, created here.
fn plan_jobs(inputs: &[PathBuf], out_dir: &Path, multi_dex: bool) -> PredexResult<Vec<DexJob>> {
    inputs
        .iter()
        .map(|input| {
            let input = std::path::absolute(input)
                .map_err(|e| PredexError::io(format!("resolving {}", input.display()), e))?;
            if !input.exists() {
                return Err(PredexError::InputNotFound(input));
            }

            let output = out_dir.join(output_name(&input, multi_dex)?);
            if multi_dex {
                fs::create_dir_all(&output)
                    .map_err(|e| PredexError::io(format!("creating {}", output.display()), e))?;
            }
            Ok(DexJob { input, output })
        })
        .collect()
}

fn output_name(input: &Path, multi_dex: bool) -> PredexResult<String> {
    let stem = input
        .file_stem()
        .ok_or_else(|| PredexError::InputNotFound(input.to_path_buf()))?
        .to_string_lossy();
    let path_hash = SourceHash::from_bytes(input.as_os_str().as_encoded_bytes()).to_string();
    let tag = &path_hash[..OUTPUT_HASH_LEN];

    Ok(match input.extension() {
        Some(ext) if !multi_dex => format!("{stem}-{tag}.{}", ext.to_string_lossy()),
        _ => format!("{stem}-{tag}"),
    })
}

/// Run `jobs` on `workers` threads and return the failures in input order
fn run_jobs(
    cache: &PreDexCache,
    jobs: &[DexJob],
    workers: usize,
    multi_dex: bool,
    options: &DexOptions,
    tools: &BuildToolInfo,
    dexer: &dyn DexTransform,
) -> Vec<(DexJob, PredexError)> {
    let next = AtomicUsize::new(0);
    let failures = Mutex::new(Vec::new());

    thread::scope(|s| {
        for _ in 0..workers {
            s.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(job) = jobs.get(index) else {
                    break;
                };

                debug!("Pre-dexing {}", job.input.display());
                if let Err(e) = cache.pre_dex_library(
                    &job.input,
                    &job.output,
                    multi_dex,
                    options,
                    tools,
                    dexer,
                ) {
                    failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, e));
                }
            });
        }
    });

    let mut failures = failures
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    failures.sort_by_key(|(index, _)| *index);
    failures
        .into_iter()
        .map(|(index, e)| (jobs[index].clone(), e))
        .collect()
}
