//! The JSON sidecar paired with every artifact.
//!
//! A sidecar accumulates the artifact's whole history: the analyzer output
//! that produced it and every match ever run against it. Updates are
//! whole-document read-modify-write; the sequencer guarantees only one
//! writer at a time within this process.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::grammar::MatchRecord;

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("could not read sidecar {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write sidecar {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sidecar {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode sidecar {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Typed view of a sidecar document.
///
/// `extra` holds any keys this version doesn't model so foreign fields
/// survive a read-modify-write cycle intact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarState {
    /// Raw analyzer output lines from the run that produced the artifact.
    pub precompute: Vec<String>,
    /// Append-only raw match lines, keyed by database name.
    pub matches_by_database: BTreeMap<String, Vec<String>>,
    /// Latest parsed match per database.
    pub parsed_matches_by_database: BTreeMap<String, MatchRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sidecar path for an artifact: same base name, `.json` extension.
pub fn sidecar_path(artifact_path: &Path) -> PathBuf {
    artifact_path.with_extension(crate::SIDECAR_EXT)
}

/// Read and decode a sidecar. Failures surface to the caller; whether a
/// missing sidecar is an error is the operation's call, not ours.
pub fn read(path: &Path) -> Result<SidecarState, SidecarError> {
    let text = fs::read_to_string(path).map_err(|source| SidecarError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SidecarError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace a sidecar with `state`, whole document at once.
pub fn write(path: &Path, state: &SidecarState) -> Result<(), SidecarError> {
    let text = serde_json::to_string(state).map_err(|source| SidecarError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| SidecarError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Deep-merge `patch` into the document at `path` and write the result.
///
/// A missing or unreadable document starts from `{}`, so a patch can
/// initialize a sidecar as well as update one.
pub fn write_patch(path: &Path, patch: &Value) -> Result<(), SidecarError> {
    let mut doc = match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
            log::warn!("sidecar {} was corrupt, rebuilding: {err}", path.display());
            Value::Object(Map::new())
        }),
        Err(_) => Value::Object(Map::new()),
    };
    deep_merge(&mut doc, patch);
    let text = serde_json::to_string(&doc).map_err(|source| SidecarError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| SidecarError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Objects merge key-by-key, recursively. Any other pair replaces: arrays
/// and scalars in the patch overwrite whatever the base held.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
