//! Database construction, merging, and listing upkeep.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::AppContext;
use crate::matcher::{self, MatchOutcome};
use crate::tool::{self, ToolError};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build a new database named `name` from `audio_files`.
///
/// `cwd` is handed through to the tool so relative audio paths resolve
/// against the directory the user picked. Returns the database path; the
/// listing and matching happen in [`process_new`].
pub fn build(
    ctx: &AppContext,
    name: &str,
    audio_files: &[String],
    cores: usize,
    cwd: Option<&Path>,
) -> Result<PathBuf, DatabaseError> {
    let root = ctx.config.databases_root();
    fs::create_dir_all(&root)?;
    let db_path = root.join(format!("{name}.{}", crate::DATABASE_EXT));
    let mut args = vec![
        "-C".to_string(),
        "-H".to_string(),
        cores.to_string(),
        "-d".to_string(),
        db_path.to_string_lossy().into_owned(),
    ];
    args.extend(audio_files.iter().cloned());
    tool::run_logged(
        ctx.tools(),
        ctx.events(),
        "Fingerprinting...",
        "new",
        &args,
        cwd,
    )?;
    Ok(db_path)
}

/// Merge `incoming` database files into the one at `target`.
pub fn merge(ctx: &AppContext, target: &Path, incoming: &[String]) -> Result<(), DatabaseError> {
    let mut args = vec!["-d".to_string(), target.to_string_lossy().into_owned()];
    args.extend(incoming.iter().cloned());
    tool::run_logged(ctx.tools(), ctx.events(), "Merging...", "merge", &args, None)?;
    Ok(())
}

/// Listing path for a database: same base name, `.txt` extension.
pub fn listing_path(db_path: &Path) -> PathBuf {
    db_path.with_extension(crate::LISTING_EXT)
}

/// Read a database's listing text.
pub fn read_listing(db_path: &Path) -> std::io::Result<String> {
    fs::read_to_string(listing_path(db_path))
}

/// Regenerate the text listing for a database by running `list`.
///
/// A failed invocation is not fatal: the failure text is written into the
/// listing file instead, so the store stays inspectable and a later rebuild
/// overwrites it.
pub fn write_listing(ctx: &AppContext, db_path: &Path) -> Result<(), DatabaseError> {
    let args = vec!["-d".to_string(), db_path.to_string_lossy().into_owned()];
    let text = match ctx.tools().run("list", &args, None) {
        Ok(lines) => derive_listing(db_path, &lines).unwrap_or_else(|| {
            log::warn!("list output for {} was too short to use", db_path.display());
            format!("could not derive listing for {}", db_path.display())
        }),
        Err(err) => {
            log::warn!("list failed for {}: {err}", db_path.display());
            err.to_string()
        }
    };
    fs::write(listing_path(db_path), text)?;
    Ok(())
}

/// Derive listing text from raw `list` output: drop the tool preamble line,
/// shorten the full database path in the header to its file name, and sort
/// the per-track lines. Fewer than two lines means the output was unusable.
pub(crate) fn derive_listing(db_path: &Path, lines: &[String]) -> Option<String> {
    if lines.len() < 2 {
        return None;
    }
    let full = db_path.to_string_lossy();
    let base = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let header = lines[1].replace(full.as_ref(), &base);
    let mut tracks: Vec<String> = lines[2..].to_vec();
    tracks.sort_unstable();
    let mut parts = vec![header];
    parts.extend(tracks);
    Some(parts.join("\n"))
}

/// Post-build processing shared by `new`, `merge`, and database import:
/// refresh the listing, then match the supplied artifacts against the
/// database so their sidecars learn about the new contents.
pub fn process_new(
    ctx: &AppContext,
    db_path: &Path,
    artifact_paths: &[PathBuf],
) -> Result<MatchOutcome, DatabaseError> {
    write_listing(ctx, db_path)?;
    Ok(matcher::run_match(ctx, db_path, artifact_paths)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::harness;

    #[test]
    fn build_places_the_database_and_forwards_cores() {
        let h = harness();
        let db = build(&h.ctx, "demo", &["a.wav".to_string()], 3, None).unwrap();
        assert_eq!(db, h.databases_root().join("demo.pklz"));
        assert!(h.databases_root().is_dir());

        let calls = h.runner.calls_for("new");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec![
                "-C".to_string(),
                "-H".to_string(),
                "3".to_string(),
                "-d".to_string(),
                db.to_string_lossy().into_owned(),
                "a.wav".to_string(),
            ]
        );
        assert!(calls[0].cwd.is_none());
    }

    #[test]
    fn build_forwards_the_working_directory() {
        let h = harness();
        let cwd = h.dir.path().join("album");
        std::fs::create_dir_all(&cwd).unwrap();
        build(&h.ctx, "demo", &["t1.flac".to_string()], 1, Some(&cwd)).unwrap();
        assert_eq!(h.runner.calls_for("new")[0].cwd.as_deref(), Some(&*cwd));
    }

    #[test]
    fn merge_targets_then_appends_incoming() {
        let h = harness();
        let target = h.databases_root().join("demo.pklz");
        merge(
            &h.ctx,
            &target,
            &["in1.pklz".to_string(), "in2.pklz".to_string()],
        )
        .unwrap();
        let calls = h.runner.calls_for("merge");
        assert_eq!(
            calls[0].args,
            vec![
                "-d".to_string(),
                target.to_string_lossy().into_owned(),
                "in1.pklz".to_string(),
                "in2.pklz".to_string(),
            ]
        );
    }

    #[test]
    fn derive_listing_drops_preamble_and_sorts_tracks() {
        let db = Path::new("/tmp/store/demo.pklz");
        let lines = vec![
            "audfprint 0.9 loading hash table".to_string(),
            "Database /tmp/store/demo.pklz holds 3 tracks".to_string(),
            "t3.wav".to_string(),
            "t1.wav".to_string(),
            "t2.wav".to_string(),
        ];
        let text = derive_listing(db, &lines).unwrap();
        assert_eq!(
            text,
            "Database demo.pklz holds 3 tracks\nt1.wav\nt2.wav\nt3.wav"
        );
    }

    #[test]
    fn derive_listing_rejects_short_output() {
        let db = Path::new("/tmp/demo.pklz");
        assert!(derive_listing(db, &[]).is_none());
        assert!(derive_listing(db, &["preamble only".to_string()]).is_none());
    }

    #[test]
    fn failed_list_invocation_becomes_the_listing_text() {
        let h = harness();
        std::fs::create_dir_all(h.databases_root()).unwrap();
        let db = h.databases_root().join("demo.pklz");
        h.runner.script_failure("list", "hash table unreadable");

        write_listing(&h.ctx, &db).unwrap();
        let text = std::fs::read_to_string(listing_path(&db)).unwrap();
        assert!(text.contains("hash table unreadable"));
    }

    #[test]
    fn process_new_skips_matching_when_no_artifacts_exist() {
        let h = harness();
        std::fs::create_dir_all(h.databases_root()).unwrap();
        let db = h.databases_root().join("demo.pklz");
        h.runner.script(
            "list",
            &["preamble", "Database demo.pklz holds 0 tracks"],
        );

        let outcome = process_new(&h.ctx, &db, &[]).unwrap();
        assert_eq!(outcome, MatchOutcome::default());
        assert!(listing_path(&db).exists());
        assert!(h.runner.calls_for("match").is_empty());
    }
}
