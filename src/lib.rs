pub mod config;
pub mod context;
pub mod events;
pub mod grammar;
pub mod matcher;
pub mod pathsafe;
pub mod pipeline;
pub mod sequencer;
pub mod store;
pub mod tool;

/// Extension of precomputed fingerprint artifacts written by audfprint
pub const ARTIFACT_EXT: &str = "afpt";

/// Extension of fingerprint databases written by audfprint
pub const DATABASE_EXT: &str = "pklz";

/// Extension of the JSON sidecar paired with every artifact
pub const SIDECAR_EXT: &str = "json";

/// Extension of the text listing paired with every database
pub const LISTING_EXT: &str = "txt";

/// Application name for XDG paths
pub const APP_NAME: &str = "ridgeline";
