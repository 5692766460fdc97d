//! User-triggered workflows.
//!
//! Each function here is one unit of work for the sequencer: it runs its
//! steps strictly in order and returns counts the caller can report.
//! Failures on individual items are logged and counted rather than aborting
//! the batch; a failed tool invocation abandons the job it belongs to.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use thiserror::Error;
use walkdir::WalkDir;

use crate::context::AppContext;
use crate::events::Event;
use crate::matcher;
use crate::pathsafe::{self, Platform};
use crate::store::databases::DatabaseError;
use crate::store::{self, StoreEntry, StoreKind, artifacts, databases, sidecar};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counts from one import batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportResult {
    pub copied: usize,
    pub copy_failures: usize,
    /// Completion actions that ran cleanly: per imported database for a
    /// database import, per existing database for an artifact import.
    pub processed: usize,
    pub process_failures: usize,
}

/// Counts from one export batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportResult {
    pub exported: usize,
    pub removed: usize,
    pub failures: usize,
}

/// Counts from one analysis batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzeResult {
    pub analyzed: usize,
    pub failed: usize,
    pub databases_matched: usize,
}

/// What to do with the store copies after an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalDecision {
    Keep,
    Remove,
}

fn batch_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Import every matching data file from `source_dir` into the store.
///
/// Only data files are copied. Companions are regenerated on the spot:
/// imported databases get a fresh listing and are matched against the whole
/// artifact store, imported artifacts get an (empty) sidecar initialized and
/// are matched against every database. Item failures are isolated.
pub fn import(
    ctx: &AppContext,
    kind: StoreKind,
    source_dir: &Path,
) -> Result<ImportResult, PipelineError> {
    let layout = kind.layout();
    let found = store::list_files(source_dir, layout.data_ext);
    if found.is_empty() {
        ctx.emit(Event::notice(format!(
            "No .{} files found in {}",
            layout.data_ext,
            source_dir.display()
        )));
        return Ok(ImportResult::default());
    }

    let root = kind.root(&ctx.config);
    fs::create_dir_all(&root)?;

    let mut result = ImportResult::default();
    let mut imported: Vec<StoreEntry> = Vec::new();
    let pb = batch_bar(found.len() as u64, &format!("Importing {}...", layout.plural));
    for entry in &found {
        let Some(file_name) = entry.path.file_name() else {
            pb.inc(1);
            continue;
        };
        let dest = root.join(file_name);
        ctx.emit(Event::tool_output(format!(
            "Copying {}...",
            entry.path.display()
        )));
        match fs::copy(&entry.path, &dest) {
            Ok(_) => {
                result.copied += 1;
                imported.push(StoreEntry {
                    name: entry.name.clone(),
                    path: dest,
                });
            }
            Err(err) => {
                log::warn!("could not import {}: {err}", entry.path.display());
                result.copy_failures += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("Copied {} of {}", result.copied, found.len()));

    match kind {
        StoreKind::Databases => {
            let artifact_paths: Vec<PathBuf> =
                store::list_files(&ctx.config.artifacts_root(), crate::ARTIFACT_EXT)
                    .into_iter()
                    .map(|entry| entry.path)
                    .collect();
            for db in &imported {
                match databases::process_new(ctx, &db.path, &artifact_paths) {
                    Ok(_) => result.processed += 1,
                    Err(err) => {
                        log::warn!("post-import processing failed for {}: {err}", db.name);
                        result.process_failures += 1;
                    }
                }
            }
        }
        StoreKind::Artifacts => {
            for artifact in &imported {
                // Data files travel without their sidecars; make sure one
                // exists so match history has somewhere to accumulate.
                let sidecar_path = sidecar::sidecar_path(&artifact.path);
                if let Err(err) = sidecar::write_patch(&sidecar_path, &json!({})) {
                    log::warn!("could not initialize sidecar for {}: {err}", artifact.name);
                }
            }
            let new_paths: Vec<PathBuf> = imported.iter().map(|e| e.path.clone()).collect();
            for db in store::list_files(&ctx.config.databases_root(), crate::DATABASE_EXT) {
                match matcher::run_match(ctx, &db.path, &new_paths) {
                    Ok(_) => result.processed += 1,
                    Err(err) => {
                        log::warn!("match against {} failed: {err}", db.name);
                        result.process_failures += 1;
                    }
                }
            }
        }
    }

    store::refresh(ctx, kind);
    Ok(result)
}

/// Export managed files to `target_dir`: every data file plus its
/// companion, or just one selected by name or path.
///
/// With [`RemovalDecision::Remove`] the store copies are deleted afterwards
/// and the new store contents announced. Copy failures are isolated and
/// counted; a file that fails to copy is still eligible for removal, the
/// same way the workflow has always behaved.
pub fn export(
    ctx: &AppContext,
    kind: StoreKind,
    target_dir: &Path,
    only: Option<&str>,
    decision: RemovalDecision,
) -> Result<ExportResult, PipelineError> {
    let layout = kind.layout();
    let stored = store::list_files(&kind.root(&ctx.config), layout.data_ext);
    let selected: Vec<&StoreEntry> = match only {
        Some(reference) => stored
            .iter()
            .filter(|e| e.name == reference || e.path == Path::new(reference))
            .collect(),
        None => stored.iter().collect(),
    };
    if selected.is_empty() {
        ctx.emit(Event::notice(format!("No {} to export", layout.plural)));
        return Ok(ExportResult::default());
    }
    fs::create_dir_all(target_dir)?;

    let mut staged: Vec<PathBuf> = Vec::new();
    for entry in &selected {
        staged.push(entry.path.clone());
        staged.push(store::companion_path(&entry.path, kind));
    }

    let mut result = ExportResult::default();
    let pb = batch_bar(
        staged.len() as u64,
        &format!("Exporting {}...", layout.plural),
    );
    for file in &staged {
        let Some(file_name) = file.file_name() else {
            pb.inc(1);
            continue;
        };
        ctx.emit(Event::tool_output(format!("Copying {}...", file.display())));
        match fs::copy(file, target_dir.join(file_name)) {
            Ok(_) => result.exported += 1,
            Err(err) => {
                log::warn!("could not export {}: {err}", file.display());
                result.failures += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("Exported {}", result.exported));

    if decision == RemovalDecision::Remove {
        for file in &staged {
            match fs::remove_file(file) {
                Ok(()) => result.removed += 1,
                Err(err) => log::warn!("could not remove {}: {err}", file.display()),
            }
        }
        store::refresh(ctx, kind);
    }
    Ok(result)
}

/// Analyze audio files into artifacts, then match everything that was
/// produced against every database in the store.
pub fn analyze_files(
    ctx: &AppContext,
    audio_paths: &[PathBuf],
) -> Result<AnalyzeResult, PipelineError> {
    let mut result = AnalyzeResult::default();
    let mut produced: Vec<PathBuf> = Vec::new();
    let pb = batch_bar(audio_paths.len() as u64, "Analyzing...");
    for path in audio_paths {
        match artifacts::analyze(ctx, path) {
            Ok(Some(artifact)) => {
                result.analyzed += 1;
                produced.push(artifact);
            }
            Ok(None) => result.failed += 1,
            Err(err) => {
                log::warn!("analysis failed for {}: {err}", path.display());
                result.failed += 1;
            }
        }
        pb.inc(1);
        pb.set_message(format!("{} analyzed, {} failed", result.analyzed, result.failed));
    }
    pb.finish_with_message(format!(
        "Done: {} analyzed, {} failed",
        result.analyzed, result.failed
    ));

    if !produced.is_empty() {
        for db in store::list_files(&ctx.config.databases_root(), crate::DATABASE_EXT) {
            match matcher::run_match(ctx, &db.path, &produced) {
                Ok(_) => result.databases_matched += 1,
                Err(err) => log::warn!("match against {} failed: {err}", db.name),
            }
        }
    }

    store::refresh(ctx, StoreKind::Artifacts);
    Ok(result)
}

/// Build a database from audio files, generate its listing, match the whole
/// artifact store against it, and announce the new store contents.
pub fn build_database(
    ctx: &AppContext,
    name: &str,
    audio_files: &[String],
    cores: usize,
    cwd: Option<&Path>,
) -> Result<PathBuf, PipelineError> {
    let db_path = databases::build(ctx, name, audio_files, cores, cwd)?;
    let artifact_paths: Vec<PathBuf> =
        store::list_files(&ctx.config.artifacts_root(), crate::ARTIFACT_EXT)
            .into_iter()
            .map(|entry| entry.path)
            .collect();
    databases::process_new(ctx, &db_path, &artifact_paths)?;
    store::refresh(ctx, StoreKind::Databases);
    Ok(db_path)
}

/// Merge incoming database files into an existing database.
///
/// The target's listing is regenerated, but no matching runs: merging adds
/// no new artifacts, and the merged-in fingerprints will be seen by the
/// next match anyway.
pub fn merge_databases(
    ctx: &AppContext,
    target: &str,
    incoming: &[String],
) -> Result<PathBuf, PipelineError> {
    let target_path = store::resolve(&ctx.config, StoreKind::Databases, target);
    databases::merge(ctx, &target_path, incoming)?;
    databases::process_new(ctx, &target_path, &[])?;
    Ok(target_path)
}

/// Survey a directory ahead of fingerprinting: every file below it, a
/// database name suggested from the directory, and the machine's core count.
pub fn scan_audio_directory(ctx: &AppContext, root: &Path) {
    let platform = Platform::current();
    let mut filenames: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| pathsafe::command_path(entry.path(), platform))
        .collect();
    filenames.sort();

    let db_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let max_cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    ctx.emit(Event::AudioDirectoryOpened {
        root: root.to_path_buf(),
        db_name,
        filenames,
        max_cores,
        platform: std::env::consts::OS,
    });
}

/// Announce the current contents of one store.
pub fn list_store(ctx: &AppContext, kind: StoreKind) {
    store::refresh(ctx, kind);
}

/// Emit a database's listing text, or the failure to read it.
pub fn show_database(ctx: &AppContext, reference: &str) {
    let db_path = store::resolve(&ctx.config, StoreKind::Databases, reference);
    match databases::read_listing(&db_path) {
        Ok(text) => ctx.emit(Event::tool_output(text)),
        Err(err) => ctx.emit(Event::ToolError {
            message: format!("could not read listing for {}: {err}", db_path.display()),
        }),
    }
}

/// Emit the recorded matches for one artifact. A sidecar problem becomes
/// the error alternative of the same notification.
pub fn list_matches(ctx: &AppContext, reference: &str) {
    let artifact = store::resolve(&ctx.config, StoreKind::Artifacts, reference);
    match artifacts::matches_for(&artifact) {
        Ok(rows) => ctx.emit(Event::matches_listed(rows)),
        Err(err) => ctx.emit(Event::matches_error(err.to_string())),
    }
}

/// Emit every recorded match in the artifact store.
pub fn search_matches(ctx: &AppContext) {
    let rows = artifacts::search(&ctx.config.artifacts_root());
    ctx.emit(Event::matches_listed(rows));
}
