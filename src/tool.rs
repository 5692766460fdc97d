//! Subprocess boundary around the external fingerprint tools.
//!
//! Every audfprint invocation goes through the [`ToolRunner`] trait so the
//! orchestration layers can be exercised with a scripted runner. The real
//! [`ToolGateway`] shells out with `std::process::Command`, optionally
//! prepending a configured directory to PATH so bundled tool builds win.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::config::ToolConfig;
use crate::events::{Event, EventSink};
use crate::grammar;

#[derive(Error, Debug)]
pub enum ToolError {
    /// The startup dependency probe failed. Callers treat this as fatal.
    #[error("{tool} is required but unavailable: {detail}")]
    Unavailable { tool: String, detail: String },
    /// An invocation ran but exited non-zero. The job it belonged to is
    /// abandoned; queued work continues.
    #[error("{tool} {subcommand} failed ({status}): {stderr}")]
    Failed {
        tool: String,
        subcommand: String,
        status: String,
        stderr: String,
    },
    /// The invocation could not be spawned or its output collected.
    #[error("failed to run {tool} {subcommand}: {source}")]
    Spawn {
        tool: String,
        subcommand: String,
        #[source]
        source: std::io::Error,
    },
}

/// Version strings gathered by the dependency check.
#[derive(Debug, Clone)]
pub struct ToolVersions {
    pub audfprint: String,
    pub ffmpeg: String,
}

/// Runs audfprint subcommands. `cwd` overrides the working directory for
/// tools that resolve relative audio paths, and stdout comes back as lines
/// in the order the tool printed them.
pub trait ToolRunner: Send + Sync {
    fn run(
        &self,
        subcommand: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<Vec<String>, ToolError>;

    /// Probe both tools and report their versions. ffmpeg is probed even
    /// though it is never invoked directly; audfprint decodes through it.
    fn versions(&self) -> Result<ToolVersions, ToolError>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for std::sync::Arc<T> {
    fn run(
        &self,
        subcommand: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<Vec<String>, ToolError> {
        (**self).run(subcommand, args, cwd)
    }

    fn versions(&self) -> Result<ToolVersions, ToolError> {
        (**self).versions()
    }
}

/// The real subprocess-backed runner.
pub struct ToolGateway {
    audfprint: String,
    ffmpeg: String,
    path_prefix: Option<PathBuf>,
}

impl ToolGateway {
    pub fn from_config(tools: &ToolConfig) -> Self {
        Self {
            audfprint: tools.audfprint.clone(),
            ffmpeg: tools.ffmpeg.clone(),
            path_prefix: tools.path_prefix.clone(),
        }
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(prefix) = &self.path_prefix {
            let existing = std::env::var_os("PATH").unwrap_or_default();
            let mut parts = vec![prefix.clone()];
            parts.extend(std::env::split_paths(&existing));
            match std::env::join_paths(parts) {
                Ok(joined) => {
                    cmd.env("PATH", joined);
                }
                Err(err) => {
                    log::warn!("ignoring tools.path_prefix {}: {err}", prefix.display());
                }
            }
        }
        cmd
    }

    /// Run `program args` for the dependency check. Any failure, including a
    /// non-zero exit, reads as the tool being unavailable.
    fn probe(&self, program: &str, args: &[&str]) -> Result<String, ToolError> {
        let mut cmd = self.command(program);
        cmd.args(args);
        let output = cmd.output().map_err(|err| ToolError::Unavailable {
            tool: program.to_string(),
            detail: err.to_string(),
        })?;
        if !output.status.success() {
            return Err(ToolError::Unavailable {
                tool: program.to_string(),
                detail: format!(
                    "{} ({})",
                    String::from_utf8_lossy(&output.stderr).trim(),
                    output.status
                ),
            });
        }
        // ffmpeg prints its banner on stdout, but some builds use stderr.
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            Ok(String::from_utf8_lossy(&output.stderr).into_owned())
        } else {
            Ok(stdout)
        }
    }
}

impl ToolRunner for ToolGateway {
    fn run(
        &self,
        subcommand: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<Vec<String>, ToolError> {
        let mut cmd = self.command(&self.audfprint);
        cmd.arg(subcommand).args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        log::debug!("running {} {} {}", self.audfprint, subcommand, args.join(" "));
        let output = cmd.output().map_err(|source| ToolError::Spawn {
            tool: self.audfprint.clone(),
            subcommand: subcommand.to_string(),
            source,
        })?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.audfprint.clone(),
                subcommand: subcommand.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn versions(&self) -> Result<ToolVersions, ToolError> {
        let banner = self.probe(&self.ffmpeg, &["-version"])?;
        let Some(ffmpeg) = grammar::parse_ffmpeg_banner(&banner) else {
            return Err(ToolError::Unavailable {
                tool: self.ffmpeg.clone(),
                detail: "could not parse version banner".to_string(),
            });
        };
        let banner = self.probe(&self.audfprint, &["--version"])?;
        let audfprint = banner
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "installed".to_string());
        Ok(ToolVersions { audfprint, ffmpeg })
    }
}

/// Run a subcommand while relaying its output as events: a label line first,
/// then each stdout line as it came back, or the failure message.
pub fn run_logged(
    runner: &dyn ToolRunner,
    events: &dyn EventSink,
    label: &str,
    subcommand: &str,
    args: &[String],
    cwd: Option<&Path>,
) -> Result<Vec<String>, ToolError> {
    events.emit(Event::tool_output(label));
    match runner.run(subcommand, args, cwd) {
        Ok(lines) => {
            for line in &lines {
                events.emit(Event::tool_output(line.clone()));
            }
            Ok(lines)
        }
        Err(err) => {
            events.emit(Event::ToolError {
                message: err.to_string(),
            });
            Err(err)
        }
    }
}
