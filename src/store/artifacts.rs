//! Artifact analysis and sidecar-backed match queries.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;

use crate::context::AppContext;
use crate::events::MatchRow;
use crate::grammar;
use crate::pathsafe::{self, Platform};
use crate::store::sidecar::{self, SidecarError};
use crate::tool::{self, ToolError};

/// Fingerprint density handed to `precompute -i`. Databases and artifacts
/// must agree on this for matches to land, so it is not configurable.
const PRECOMPUTE_DENSITY: &str = "4";

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("Sidecar error: {0}")]
    Sidecar(#[from] SidecarError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Analyze one audio file into the artifact store.
///
/// The input is normalized for the platform first (Windows-unsafe names get
/// staged copies), then `precompute` runs on it. The artifact the tool
/// reports having written is moved into the store and the full analyzer
/// output is patched into its sidecar, which preserves any match history a
/// previous artifact of the same name had accumulated.
///
/// Returns the stored artifact path, or `None` when the tool finished
/// without reporting an artifact.
pub fn analyze(ctx: &AppContext, audio_path: &Path) -> Result<Option<PathBuf>, AnalyzeError> {
    let platform = Platform::current();
    let normalized = pathsafe::normalize(
        audio_path,
        platform,
        &ctx.config.staging_root(),
        ctx.events(),
    )?;
    let arg = pathsafe::command_path(&normalized, platform);

    let lines = tool::run_logged(
        ctx.tools(),
        ctx.events(),
        "Analyzing...",
        "precompute",
        &["-i".to_string(), PRECOMPUTE_DENSITY.to_string(), arg],
        None,
    )?;

    let written = lines
        .iter()
        .find_map(|line| grammar::parse_wrote_line(line))
        .map(PathBuf::from);
    let Some(written) = written else {
        log::warn!(
            "precompute reported no artifact for {}",
            audio_path.display()
        );
        return Ok(None);
    };
    let Some(file_name) = written.file_name() else {
        return Ok(None);
    };

    let root = ctx.config.artifacts_root();
    fs::create_dir_all(&root)?;
    let dest = root.join(file_name);
    move_into_store(&written, &dest)?;

    sidecar::write_patch(
        &sidecar::sidecar_path(&dest),
        &json!({ "precompute": lines }),
    )?;
    Ok(Some(dest))
}

/// Rename, falling back to copy-and-remove when the artifact was written on
/// a different filesystem than the store.
fn move_into_store(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// All recorded matches for one artifact, one row per database, read from
/// its sidecar. Sidecar failures surface to the caller.
pub fn matches_for(artifact_path: &Path) -> Result<Vec<MatchRow>, SidecarError> {
    let name = artifact_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let state = sidecar::read(&sidecar::sidecar_path(artifact_path))?;
    Ok(state
        .parsed_matches_by_database
        .into_iter()
        .map(|(database, record)| MatchRow {
            record,
            database,
            name: name.clone(),
        })
        .collect())
}

/// Collect every recorded match in the store by scanning all sidecars.
/// Unreadable sidecars are skipped; search is a best-effort view.
pub fn search(artifact_root: &Path) -> Vec<MatchRow> {
    let mut rows = Vec::new();
    for entry in crate::store::list_files(artifact_root, crate::SIDECAR_EXT) {
        match sidecar::read(&entry.path) {
            Ok(state) => {
                rows.extend(state.parsed_matches_by_database.into_iter().map(
                    |(database, record)| MatchRow {
                        record,
                        database,
                        name: entry.name.clone(),
                    },
                ));
            }
            Err(err) => log::debug!("search skipping {}: {err}", entry.path.display()),
        }
    }
    rows
}
