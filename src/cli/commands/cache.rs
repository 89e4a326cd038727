//! Cache command - inspect and maintain the store file

use crate::cache::store::{read_store, write_store, Record, RecordStatus};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::dex::key::jumbo_mode_attribute;
use crate::error::{PredexError, PredexResult};
use console::style;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the cache command
pub fn execute(args: CacheArgs, config: &Config) -> PredexResult<()> {
    let store = ConfigManager::store_path(config);

    match args.action {
        CacheAction::List { format } => list_entries(&store, format),
        CacheAction::Prune { dry_run } => prune_entries(&store, dry_run),
        CacheAction::Clear => clear_store(&store),
        CacheAction::Path => {
            println!("{}", store.display());
            Ok(())
        }
    }
}

fn load_records(store: &Path) -> PredexResult<Vec<Record>> {
    read_store(store).map_err(|e| PredexError::StoreRead {
        path: store.to_path_buf(),
        reason: e.to_string(),
    })
}

fn jumbo_mode(record: &Record) -> bool {
    jumbo_mode_attribute(&record.attributes).unwrap_or(false)
}

/// List stored entries with their current status
fn list_entries(store: &Path, format: OutputFormat) -> PredexResult<()> {
    let records = load_records(store)?;

    if records.is_empty() {
        println!("No cache entries found.");
        return Ok(());
    }

    let entries: Vec<(&Record, RecordStatus)> =
        records.iter().map(|r| (r, r.status())).collect();

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => print_entry_json(&entries)?,
        OutputFormat::Plain => print_entry_plain(&entries),
    }

    Ok(())
}

fn print_entry_table(entries: &[(&Record, RecordStatus)]) {
    println!(
        "{:<50} {:<14} {:<6} {:<16} {:>7}",
        "LIBRARY", "REVISION", "JUMBO", "STATUS", "OUTPUTS"
    );
    println!("{}", "-".repeat(97));

    for (record, status) in entries {
        let status_display = match status {
            RecordStatus::Valid => style(status.to_string()).green().to_string(),
            RecordStatus::Stale => style(status.to_string()).yellow().to_string(),
            _ => style(status.to_string()).red().to_string(),
        };

        println!(
            "{:<50} {:<14} {:<6} {:<16} {:>7}",
            record.source_file.display(),
            record.revision,
            if jumbo_mode(record) { "yes" } else { "no" },
            status_display,
            record.outputs.len()
        );
    }

    println!();
    println!("Total: {} entr(ies)", entries.len());
}

fn print_entry_json(entries: &[(&Record, RecordStatus)]) -> PredexResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        jar: PathBuf,
        revision: String,
        sha1: String,
        jumbo_mode: bool,
        status: String,
        outputs: Vec<PathBuf>,
    }

    let json_entries: Vec<EntryJson> = entries
        .iter()
        .map(|(r, status)| EntryJson {
            jar: r.source_file.clone(),
            revision: r.revision.to_string(),
            sha1: r.sha1.to_string(),
            jumbo_mode: jumbo_mode(r),
            status: status.to_string(),
            outputs: r.outputs.clone(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_entries)?);
    Ok(())
}

fn print_entry_plain(entries: &[(&Record, RecordStatus)]) {
    for (record, _) in entries {
        println!("{}", record.source_file.display());
    }
}

/// Drop every entry that can no longer be reused
fn prune_entries(store: &Path, dry_run: bool) -> PredexResult<()> {
    let records = load_records(store)?;
    let (keep, remove): (Vec<_>, Vec<_>) = records
        .into_iter()
        .map(|r| {
            let status = r.status();
            (r, status)
        })
        .partition(|(_, status)| *status == RecordStatus::Valid);

    if remove.is_empty() {
        println!("No entries to prune.");
        return Ok(());
    }

    println!("Found {} unusable entr(ies):", remove.len());
    for (record, status) in &remove {
        println!(
            "  {} {} ({})",
            style("•").red(),
            record.source_file.display(),
            status
        );
    }

    if dry_run {
        println!();
        println!("Dry run - store not modified.");
        return Ok(());
    }

    let kept: Vec<Record> = keep.into_iter().map(|(r, _)| r).collect();
    write_store(store, &kept).map_err(|e| PredexError::StoreWrite {
        path: store.to_path_buf(),
        reason: e.to_string(),
    })?;

    println!();
    println!(
        "{} removed {} entr(ies), {} kept",
        style("✓").green(),
        remove.len(),
        kept.len()
    );
    Ok(())
}

/// Delete the store file; dexed outputs are left where they are
fn clear_store(store: &Path) -> PredexResult<()> {
    match fs::remove_file(store) {
        Ok(()) => {
            debug!("Removed {}", store.display());
            println!("{} cleared {}", style("✓").green(), store.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            println!("No cache store to clear.");
            Ok(())
        }
        Err(e) => Err(PredexError::io(format!("removing {}", store.display()), e)),
    }
}
