//! Running dx
//!
//! The cache treats dexing as a black box behind [`DexTransform`]. The real
//! implementation shells out to the build-tools `dx` launcher.

use crate::dex::options::{BuildToolInfo, DexOptions};
use crate::error::{PredexError, PredexResult};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;
use zip::ZipArchive;

const DOT_DEX: &str = "dex";
const DOT_CLASS: &str = ".class";

/// Converts a library into one or more dex files
pub trait DexTransform: Send + Sync {
    /// Whether `input` has anything to dex
    ///
    /// Libraries without classes are skipped entirely and never cached.
    fn has_classes(&self, _input: &Path) -> PredexResult<bool> {
        Ok(true)
    }

    /// Dex `input` into `output`
    ///
    /// In multi-dex mode `output` is a directory and every produced dex file
    /// is returned; otherwise `output` itself is the single result.
    fn transform(
        &self,
        input: &Path,
        output: &Path,
        multi_dex: bool,
        options: &DexOptions,
    ) -> PredexResult<Vec<PathBuf>>;
}

impl<F> DexTransform for F
where
    F: Fn(&Path, &Path, bool, &DexOptions) -> PredexResult<Vec<PathBuf>> + Send + Sync,
{
    fn transform(
        &self,
        input: &Path,
        output: &Path,
        multi_dex: bool,
        options: &DexOptions,
    ) -> PredexResult<Vec<PathBuf>> {
        self(input, output, multi_dex, options)
    }
}

/// [`DexTransform`] backed by the dx executable
#[derive(Debug, Clone)]
pub struct DxProcess {
    dx_path: PathBuf,
}

impl DxProcess {
    pub fn new(tools: &BuildToolInfo) -> Self {
        Self {
            dx_path: tools.dx_path().to_path_buf(),
        }
    }

    /// Command-line arguments for one dx invocation
    pub fn args(input: &Path, output: &Path, multi_dex: bool, options: &DexOptions) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(heap) = &options.java_max_heap_size {
            args.push(format!("-JXmx{heap}"));
        }
        args.push("--dex".to_string());
        if options.verbose {
            args.push("--verbose".to_string());
        }
        if multi_dex {
            args.push("--multi-dex".to_string());
        }
        if options.jumbo_mode {
            args.push("--force-jumbo".to_string());
        }
        if let Some(threads) = options.thread_count {
            args.push(format!("--num-threads={threads}"));
        }
        args.push(format!("--output={}", output.display()));
        args.push(input.display().to_string());

        args
    }
}

impl DexTransform for DxProcess {
    fn has_classes(&self, input: &Path) -> PredexResult<bool> {
        has_class_files(input)
    }

    fn transform(
        &self,
        input: &Path,
        output: &Path,
        multi_dex: bool,
        options: &DexOptions,
    ) -> PredexResult<Vec<PathBuf>> {
        if !input.exists() {
            return Err(PredexError::InputNotFound(input.to_path_buf()));
        }

        let args = Self::args(input, output, multi_dex, options);
        debug!("Running {} {}", self.dx_path.display(), args.join(" "));

        let result = Command::new(&self.dx_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| PredexError::command_failed(self.dx_path.display().to_string(), e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PredexError::Transform {
                input: input.to_path_buf(),
                reason: format!("{}: {}", result.status, stderr.trim()),
            });
        }

        if multi_dex {
            list_dex_files(output)
        } else {
            Ok(vec![output.to_path_buf()])
        }
    }
}

/// True if the jar or class directory `input` holds a `.class` file
pub fn has_class_files(input: &Path) -> PredexResult<bool> {
    if !input.exists() {
        return Err(PredexError::InputNotFound(input.to_path_buf()));
    }
    if input.is_dir() {
        return folder_has_classes(input);
    }

    let file = File::open(input)
        .map_err(|e| PredexError::io(format!("opening {}", input.display()), e))?;
    let archive = ZipArchive::new(file).map_err(|e| PredexError::Transform {
        input: input.to_path_buf(),
        reason: format!("not a readable jar: {e}"),
    })?;

    let found = archive.file_names().any(|name| name.ends_with(DOT_CLASS));
    Ok(found)
}

fn folder_has_classes(dir: &Path) -> PredexResult<bool> {
    let entries =
        fs::read_dir(dir).map_err(|e| PredexError::io(format!("listing {}", dir.display()), e))?;

    for entry in entries {
        let path = entry
            .map_err(|e| PredexError::io(format!("listing {}", dir.display()), e))?
            .path();
        if path.is_dir() {
            if folder_has_classes(&path)? {
                return Ok(true);
            }
        } else if path.to_string_lossy().ends_with(DOT_CLASS) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The `*.dex` files directly inside `dir`, sorted by name
fn list_dex_files(dir: &Path) -> PredexResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| PredexError::io(format!("listing dex output {}", dir.display()), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| PredexError::io(format!("listing dex output {}", dir.display()), e))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == DOT_DEX) {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(PredexError::NoDexOutput(dir.to_path_buf()));
    }

    files.sort();
    Ok(files)
}
