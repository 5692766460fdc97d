//! Shared application context.
//!
//! Configuration, the tool runner, and the event sink are wired together
//! once at startup and passed explicitly to every operation. Nothing in the
//! crate reads process-wide mutable state.

use std::sync::OnceLock;

use crate::config::AppConfig;
use crate::events::{Event, EventSink};
use crate::tool::{ToolError, ToolRunner, ToolVersions};

pub struct AppContext {
    pub config: AppConfig,
    tools: Box<dyn ToolRunner>,
    events: Box<dyn EventSink>,
    versions: OnceLock<ToolVersions>,
}

impl AppContext {
    pub fn new(config: AppConfig, tools: Box<dyn ToolRunner>, events: Box<dyn EventSink>) -> Self {
        Self {
            config,
            tools,
            events,
            versions: OnceLock::new(),
        }
    }

    pub fn tools(&self) -> &dyn ToolRunner {
        self.tools.as_ref()
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    pub fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    /// Probe the external tools, announcing start and finish.
    ///
    /// On failure the finish announcement is withheld and the error returned;
    /// mutating commands treat that as fatal and do not start their work.
    pub fn check_dependencies(&self) -> Result<ToolVersions, ToolError> {
        self.emit(Event::InstallationStatusChanged { installing: true });
        let versions = self.tools.versions()?;
        self.emit(Event::InstallationStatusChanged { installing: false });
        let _ = self.versions.set(versions.clone());
        Ok(versions)
    }

    /// Versions recorded by the last successful dependency check.
    pub fn versions(&self) -> Option<&ToolVersions> {
        self.versions.get()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::events::MemorySink;
    use crate::tool::testing::FakeRunner;

    pub(crate) struct TestHarness {
        pub ctx: AppContext,
        pub runner: Arc<FakeRunner>,
        pub sink: Arc<MemorySink>,
        pub dir: tempfile::TempDir,
    }

    impl TestHarness {
        pub fn databases_root(&self) -> std::path::PathBuf {
            self.ctx.config.databases_root()
        }

        pub fn artifacts_root(&self) -> std::path::PathBuf {
            self.ctx.config.artifacts_root()
        }
    }

    /// Context wired to a scripted runner, a collecting sink, and store
    /// roots inside a fresh temp dir.
    pub(crate) fn harness() -> TestHarness {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let sink = Arc::new(MemorySink::new());
        let config = AppConfig {
            database_dir: Some(dir.path().join("databases")),
            artifact_dir: Some(dir.path().join("precompute")),
            staging_dir: Some(dir.path().join("ascii")),
            ..Default::default()
        };
        let ctx = AppContext::new(
            config,
            Box::new(Arc::clone(&runner)),
            Box::new(Arc::clone(&sink)),
        );
        TestHarness {
            ctx,
            runner,
            sink,
            dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::harness;
    use crate::events::Event;

    #[test]
    fn dependency_check_announces_and_caches_versions() {
        let h = harness();
        assert!(h.ctx.versions().is_none());

        let versions = h.ctx.check_dependencies().unwrap();
        assert_eq!(versions.ffmpeg, "0.0-test");
        assert_eq!(h.ctx.versions().unwrap().ffmpeg, "0.0-test");

        let events = h.sink.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            Event::InstallationStatusChanged { installing: true }
        ));
        assert!(matches!(
            events[1],
            Event::InstallationStatusChanged { installing: false }
        ));
    }

    #[test]
    fn failed_dependency_check_withholds_the_finish_event() {
        let h = harness();
        h.runner.break_versions("audfprint exploded");

        assert!(h.ctx.check_dependencies().is_err());
        assert!(h.ctx.versions().is_none());

        let events = h.sink.take();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::InstallationStatusChanged { installing: true }
        ));
    }
}
