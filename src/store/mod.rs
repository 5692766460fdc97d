//! The two managed file stores.
//!
//! Databases (`.pklz` + `.txt` listing) and artifacts (`.afpt` + `.json`
//! sidecar) live in flat directories owned by this application. Store
//! contents are always derived by re-listing the directory; nothing is
//! cached, so external drops and deletions are picked up on the next
//! listing.

pub mod artifacts;
pub mod databases;
pub mod sidecar;

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::events::Event;

/// One managed file: base name (no extension) plus full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Which of the two stores an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Databases,
    Artifacts,
}

/// Static description of a store's file pairing and vocabulary.
pub struct StoreLayout {
    pub data_ext: &'static str,
    pub companion_ext: &'static str,
    pub plural: &'static str,
}

const DATABASES_LAYOUT: StoreLayout = StoreLayout {
    data_ext: crate::DATABASE_EXT,
    companion_ext: crate::LISTING_EXT,
    plural: "databases",
};

const ARTIFACTS_LAYOUT: StoreLayout = StoreLayout {
    data_ext: crate::ARTIFACT_EXT,
    companion_ext: crate::SIDECAR_EXT,
    plural: "artifacts",
};

impl StoreKind {
    pub fn layout(self) -> &'static StoreLayout {
        match self {
            StoreKind::Databases => &DATABASES_LAYOUT,
            StoreKind::Artifacts => &ARTIFACTS_LAYOUT,
        }
    }

    /// Directory this store lives in.
    pub fn root(self, config: &AppConfig) -> PathBuf {
        match self {
            StoreKind::Databases => config.databases_root(),
            StoreKind::Artifacts => config.artifacts_root(),
        }
    }

    fn listing_event(self, files: Vec<StoreEntry>) -> Event {
        match self {
            StoreKind::Databases => Event::DatabasesListed { files },
            StoreKind::Artifacts => Event::PrecomputeListed { files },
        }
    }
}

/// List the files under `root` carrying exactly `ext`, sorted by name.
/// A missing or unreadable directory reads as empty.
pub fn list_files(root: &Path, ext: &str) -> Vec<StoreEntry> {
    let mut entries: Vec<StoreEntry> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(ext))
        .map(|entry| StoreEntry {
            name: entry
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: entry.into_path(),
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    entries
}

/// Re-list a store and announce its contents.
pub fn refresh(ctx: &AppContext, kind: StoreKind) -> Vec<StoreEntry> {
    let files = list_files(&kind.root(&ctx.config), kind.layout().data_ext);
    ctx.emit(kind.listing_event(files.clone()));
    files
}

/// Path of the companion file paired with a data file.
pub fn companion_path(data_path: &Path, kind: StoreKind) -> PathBuf {
    data_path.with_extension(kind.layout().companion_ext)
}

/// Resolve a user-supplied store reference. An existing path is taken
/// as-is; anything else is treated as a base name inside the store, with
/// the data extension appended when absent.
pub fn resolve(config: &AppConfig, kind: StoreKind, reference: &str) -> PathBuf {
    let as_path = Path::new(reference);
    if as_path.exists() {
        return as_path.to_path_buf();
    }
    let layout = kind.layout();
    let suffix = format!(".{}", layout.data_ext);
    let file_name = if reference.ends_with(&suffix) {
        reference.to_string()
    } else {
        format!("{reference}{suffix}")
    };
    kind.root(config).join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_files_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.pklz", "a.pklz", "skip.txt", "noext"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let entries = list_files(dir.path(), "pklz");
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "z"]);
        assert!(entries[0].path.ends_with("a.pklz"));
    }

    #[test]
    fn listing_a_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(&dir.path().join("nope"), "afpt").is_empty());
    }

    #[test]
    fn extension_match_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        // ".afpt" must not match files merely containing the text.
        for name in ["real.afpt", "not.afpt.bak", "afpt.data"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names: Vec<_> = list_files(dir.path(), "afpt")
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["real"]);
    }

    #[test]
    fn companion_paths_pair_data_files() {
        assert_eq!(
            companion_path(Path::new("/s/demo.pklz"), StoreKind::Databases),
            Path::new("/s/demo.txt")
        );
        assert_eq!(
            companion_path(Path::new("/s/track.one.afpt"), StoreKind::Artifacts),
            Path::new("/s/track.one.json")
        );
    }

    #[test]
    fn resolve_prefers_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("anywhere.pklz");
        std::fs::write(&existing, b"x").unwrap();
        let config = AppConfig {
            database_dir: Some(dir.path().join("store")),
            ..Default::default()
        };
        assert_eq!(
            resolve(
                &config,
                StoreKind::Databases,
                existing.to_str().unwrap()
            ),
            existing
        );
    }

    #[test]
    fn resolve_joins_names_into_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(
            resolve(&config, StoreKind::Databases, "demo"),
            dir.path().join("demo.pklz")
        );
        assert_eq!(
            resolve(&config, StoreKind::Databases, "demo.pklz"),
            dir.path().join("demo.pklz")
        );
    }
}
