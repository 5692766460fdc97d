use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ridgeline::config::AppConfig;
use ridgeline::context::AppContext;
use ridgeline::events::{ConsoleSink, EventSink, JsonSink};
use ridgeline::pipeline::{self, RemovalDecision};
use ridgeline::sequencer::Sequencer;
use ridgeline::store::StoreKind;
use ridgeline::tool::ToolGateway;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "ridgeline",
    version,
    about = "Audio fingerprint workbench built on audfprint"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit events as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreName {
    Databases,
    #[value(alias = "precompute")]
    Artifacts,
}

impl StoreName {
    fn kind(self) -> StoreKind {
        match self {
            Self::Databases => StoreKind::Databases,
            Self::Artifacts => StoreKind::Artifacts,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check that audfprint and ffmpeg run, and report their versions
    Check,

    /// Survey a directory of audio ahead of fingerprinting
    Scan {
        /// Directory to survey
        dir: PathBuf,
    },

    /// Fingerprint audio files into artifacts and match them against every database
    Analyze {
        /// Audio files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Build a new database from audio files
    New {
        /// Database name (stored as <name>.pklz)
        #[arg(long)]
        name: String,

        /// Cores handed to the fingerprinter (0 = auto-detect from config)
        #[arg(long, default_value = "0")]
        cores: usize,

        /// Working directory the audio paths are relative to
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Audio files to fingerprint
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Merge database files into an existing database
    Merge {
        /// Target database (name in the store, or a path)
        #[arg(long)]
        into: String,

        /// Database files to merge in
        #[arg(required = true)]
        incoming: Vec<String>,
    },

    /// List the databases in the store
    ListDatabases,

    /// List the artifacts in the store
    ListArtifacts,

    /// Print a database's track listing
    ShowDatabase {
        /// Database name in the store, or a path
        name: String,
    },

    /// Print the recorded matches for one artifact
    Matches {
        /// Artifact name in the store, or a path
        name: String,
    },

    /// Print every recorded match across the artifact store
    Search,

    /// Copy data files from a directory into a store
    Import {
        /// Which store to import into
        #[arg(value_enum)]
        store: StoreName,

        /// Directory to import from
        dir: PathBuf,
    },

    /// Copy store files (data plus companions) out to a directory
    Export {
        /// Which store to export from
        #[arg(value_enum)]
        store: StoreName,

        /// Directory to export into
        dir: PathBuf,

        /// Export only this file (store name or path)
        #[arg(long)]
        only: Option<String>,

        /// Delete the store copies after exporting
        #[arg(long)]
        remove: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = AppConfig::load(cli.config.as_deref());

    let events: Box<dyn EventSink> = if cli.json {
        Box::new(JsonSink)
    } else {
        Box::new(ConsoleSink)
    };
    let tools = ToolGateway::from_config(&config.tools);
    let ctx = Arc::new(AppContext::new(config, Box::new(tools), events));

    // Store-mutating commands refuse to start unless the tools run.
    if matches!(
        cli.command,
        Commands::Check
            | Commands::Analyze { .. }
            | Commands::New { .. }
            | Commands::Merge { .. }
            | Commands::Import { .. }
            | Commands::Export { .. }
    ) {
        if let Err(err) = ctx.check_dependencies() {
            eprintln!("Dependency check failed: {err}");
            std::process::exit(1);
        }
    }

    // Tool-running jobs go through the queue, one at a time.
    let seq = Sequencer::new();

    match cli.command {
        Commands::Check => {
            if let Some(versions) = ctx.versions() {
                println!("audfprint: {}", versions.audfprint);
                println!("ffmpeg:    {}", versions.ffmpeg);
            }
        }

        Commands::Scan { dir } => {
            pipeline::scan_audio_directory(&ctx, &dir);
        }

        Commands::Analyze { files } => {
            let job_ctx = Arc::clone(&ctx);
            let result = seq
                .run("analyze", move || {
                    pipeline::analyze_files(&job_ctx, &files)
                })
                .context("job worker unavailable")?
                .context("Analysis failed")?;
            println!(
                "Analysis complete: {} analyzed, {} failed, {} databases matched",
                result.analyzed, result.failed, result.databases_matched
            );
        }

        Commands::New {
            name,
            cores,
            cwd,
            files,
        } => {
            let cores = if cores > 0 {
                cores
            } else {
                ctx.config.resolve_cores()
            };
            let job_ctx = Arc::clone(&ctx);
            let db_path = seq
                .run("new", move || {
                    pipeline::build_database(&job_ctx, &name, &files, cores, cwd.as_deref())
                })
                .context("job worker unavailable")?
                .context("Fingerprinting failed")?;
            println!("Database ready: {}", db_path.display());
        }

        Commands::Merge { into, incoming } => {
            let job_ctx = Arc::clone(&ctx);
            let db_path = seq
                .run("merge", move || {
                    pipeline::merge_databases(&job_ctx, &into, &incoming)
                })
                .context("job worker unavailable")?
                .context("Merge failed")?;
            println!("Merged into {}", db_path.display());
        }

        Commands::ListDatabases => {
            pipeline::list_store(&ctx, StoreKind::Databases);
        }

        Commands::ListArtifacts => {
            pipeline::list_store(&ctx, StoreKind::Artifacts);
        }

        Commands::ShowDatabase { name } => {
            pipeline::show_database(&ctx, &name);
        }

        Commands::Matches { name } => {
            pipeline::list_matches(&ctx, &name);
        }

        Commands::Search => {
            pipeline::search_matches(&ctx);
        }

        Commands::Import { store, dir } => {
            let kind = store.kind();
            let job_ctx = Arc::clone(&ctx);
            let result = seq
                .run("import", move || pipeline::import(&job_ctx, kind, &dir))
                .context("job worker unavailable")?
                .context("Import failed")?;
            println!(
                "Import complete: {} copied, {} copy errors, {} processed, {} processing errors",
                result.copied, result.copy_failures, result.processed, result.process_failures
            );
        }

        Commands::Export {
            store,
            dir,
            only,
            remove,
        } => {
            let decision = if remove {
                RemovalDecision::Remove
            } else {
                RemovalDecision::Keep
            };
            let kind = store.kind();
            let job_ctx = Arc::clone(&ctx);
            let result = seq
                .run("export", move || {
                    pipeline::export(&job_ctx, kind, &dir, only.as_deref(), decision)
                })
                .context("job worker unavailable")?
                .context("Export failed")?;
            println!(
                "Export complete: {} files exported, {} removed, {} errors",
                result.exported, result.removed, result.failures
            );
        }
    }

    Ok(())
}
