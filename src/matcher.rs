//! Matching artifacts against a database and recording the outcome.
//!
//! One match job runs the tool once over a set of artifacts, then walks the
//! output strictly in order. Each line is attributed to the artifact whose
//! path appears in it and folded into that artifact's sidecar, raw always,
//! parsed when the line is a recognized match. Every sidecar write completes
//! before the next line is examined, so a crash mid-job leaves a prefix of
//! the output applied rather than a torn document.

use std::path::{Path, PathBuf};

use crate::context::AppContext;
use crate::grammar::{self, MatchLine};
use crate::store::sidecar;
use crate::tool::{self, ToolError};

/// Neighbor count handed to `match -N`.
const MATCH_NEIGHBORS: &str = "2";

/// Counts from one match job.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Lines attributed to an artifact and recorded in its sidecar.
    pub recorded: usize,
    /// Lines attributed to an artifact whose sidecar could not be updated.
    pub skipped: usize,
    /// Lines no supplied artifact claimed (tool chatter, progress output).
    pub unattributed: usize,
}

/// Match `artifact_paths` against the database at `db_path` and fold every
/// output line into the owning artifact's sidecar.
///
/// An empty artifact set is a no-op that never invokes the tool. A tool
/// failure abandons the job before any sidecar is touched.
pub fn run_match(
    ctx: &AppContext,
    db_path: &Path,
    artifact_paths: &[PathBuf],
) -> Result<MatchOutcome, ToolError> {
    if artifact_paths.is_empty() {
        return Ok(MatchOutcome::default());
    }
    let db_name = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut args = vec![
        "-N".to_string(),
        MATCH_NEIGHBORS.to_string(),
        "-d".to_string(),
        db_path.to_string_lossy().into_owned(),
    ];
    args.extend(
        artifact_paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned()),
    );
    args.push("-R".to_string());

    let lines = tool::run_logged(ctx.tools(), ctx.events(), "Matching...", "match", &args, None)?;

    let mut outcome = MatchOutcome::default();
    for line in &lines {
        record_line(&db_name, line, artifact_paths, &mut outcome);
    }
    log::info!(
        "match against {db_name}: {} recorded, {} skipped, {} unattributed",
        outcome.recorded,
        outcome.skipped,
        outcome.unattributed
    );
    Ok(outcome)
}

/// Attribute one output line to the first supplied artifact whose path
/// appears in it, then fold the line into that artifact's sidecar.
///
/// The raw line is appended to the database's history unconditionally; the
/// parsed slot is replaced only when the line is a recognized match. Other
/// databases' entries and unknown sidecar keys are left untouched.
fn record_line(db_name: &str, line: &str, artifact_paths: &[PathBuf], outcome: &mut MatchOutcome) {
    let claimed = artifact_paths
        .iter()
        .find(|p| line.contains(p.to_string_lossy().as_ref()));
    let Some(artifact) = claimed else {
        outcome.unattributed += 1;
        return;
    };

    let sidecar_path = sidecar::sidecar_path(artifact);
    let mut state = match sidecar::read(&sidecar_path) {
        Ok(state) => state,
        Err(err) => {
            log::warn!("dropping match line for {}: {err}", artifact.display());
            outcome.skipped += 1;
            return;
        }
    };

    state
        .matches_by_database
        .entry(db_name.to_string())
        .or_default()
        .push(line.to_string());
    if let MatchLine::Matched(record) = grammar::parse_match_line(line) {
        state
            .parsed_matches_by_database
            .insert(db_name.to_string(), record);
    }

    match sidecar::write(&sidecar_path, &state) {
        Ok(()) => outcome.recorded += 1,
        Err(err) => {
            log::warn!("could not update sidecar for {}: {err}", artifact.display());
            outcome.skipped += 1;
        }
    }
}
