//! Outward-facing notifications.
//!
//! Every externally visible state change funnels through [`Event`] and an
//! [`EventSink`]. The core never prints on its own behalf; it emits events
//! and the sink chosen at startup decides how they reach the user. That keeps
//! the orchestration logic testable (capture the events) and lets `--json`
//! swap human output for newline-delimited JSON without touching the core.

use crate::grammar::MatchRecord;
use crate::store::StoreEntry;
use serde::Serialize;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;

/// One recorded match joined with the artifact and database it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRow {
    #[serde(flatten)]
    pub record: MatchRecord,
    /// Database the match was found in (base name, no extension).
    pub database: String,
    /// Artifact the match belongs to (base name, no extension).
    pub name: String,
}

/// A notification crossing the boundary from the core to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    /// The dependency check started (`installing: true`) or finished.
    InstallationStatusChanged { installing: bool },
    /// Current contents of the database store.
    DatabasesListed { files: Vec<StoreEntry> },
    /// Current contents of the artifact store.
    PrecomputeListed { files: Vec<StoreEntry> },
    /// Result of a match query: rows on success, a message on failure.
    MatchesListed {
        #[serde(skip_serializing_if = "Option::is_none")]
        parsed_matches: Option<Vec<MatchRow>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A directory of audio was surveyed for fingerprinting.
    AudioDirectoryOpened {
        root: PathBuf,
        db_name: String,
        filenames: Vec<String>,
        max_cores: usize,
        platform: &'static str,
    },
    /// One line of external tool output, relayed as it arrived.
    ToolOutput { line: String },
    /// A tool invocation failed; the job it belonged to was abandoned.
    ToolError { message: String },
    /// Plain informational message (empty imports, skipped files).
    Notice { message: String },
}

impl Event {
    pub fn matches_listed(rows: Vec<MatchRow>) -> Self {
        Event::MatchesListed {
            parsed_matches: Some(rows),
            error: None,
        }
    }

    pub fn matches_error(message: impl Into<String>) -> Self {
        Event::MatchesListed {
            parsed_matches: None,
            error: Some(message.into()),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Event::Notice {
            message: message.into(),
        }
    }

    pub fn tool_output(line: impl Into<String>) -> Self {
        Event::ToolOutput { line: line.into() }
    }
}

/// Destination for [`Event`]s. Implementations must tolerate being called
/// from the sequencer worker thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: Event) {
        (**self).emit(event);
    }
}

/// Human-readable rendering to stdout/stderr.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: Event) {
        match event {
            Event::InstallationStatusChanged { installing: true } => {
                println!("Checking external tools...");
            }
            Event::InstallationStatusChanged { installing: false } => {}
            Event::DatabasesListed { files } => print_entries("Databases", &files),
            Event::PrecomputeListed { files } => print_entries("Artifacts", &files),
            Event::MatchesListed {
                parsed_matches: Some(rows),
                ..
            } => print_matches(&rows),
            Event::MatchesListed {
                error: Some(message),
                ..
            } => eprintln!("error: {message}"),
            Event::MatchesListed { .. } => {}
            Event::AudioDirectoryOpened {
                root,
                db_name,
                filenames,
                max_cores,
                platform,
            } => {
                println!("Surveyed {}", root.display());
                println!("  suggested database name: {db_name}");
                println!("  cores available: {max_cores} ({platform})");
                println!("  audio files ({}):", filenames.len());
                for name in &filenames {
                    println!("    {name}");
                }
            }
            Event::ToolOutput { line } => println!("{line}"),
            Event::ToolError { message } => eprintln!("{message}"),
            Event::Notice { message } => println!("{message}"),
        }
    }
}

fn print_entries(label: &str, files: &[StoreEntry]) {
    if files.is_empty() {
        println!("{label}: none");
        return;
    }
    println!("{label} ({}):", files.len());
    for file in files {
        println!("  {}  {}", file.name, file.path.display());
    }
}

fn print_matches(rows: &[MatchRow]) {
    if rows.is_empty() {
        println!("No matches recorded.");
        return;
    }
    for row in rows {
        println!(
            "{} [{}] {}: {} of {} hashes, rank {}, {} s (query {} s, reference {} s)",
            row.name,
            row.database,
            row.record.match_filename,
            row.record.common_hash_numerator,
            row.record.common_hash_denominator,
            row.record.rank,
            row.record.match_duration,
            row.record.match_start_in_query,
            row.record.match_start_in_fingerprint,
        );
    }
}

/// Newline-delimited JSON rendering, one event per line on stdout.
#[derive(Debug, Default)]
pub struct JsonSink;

impl EventSink for JsonSink {
    fn emit(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => log::error!("could not serialize event: {err}"),
        }
    }
}

/// Collecting sink that records every event in memory. Used by tests to
/// assert on the notification stream.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything emitted so far.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut self.events.lock().unwrap())
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{MatchLine, parse_match_line};

    #[test]
    fn events_serialize_with_camel_case_tags() {
        let value =
            serde_json::to_value(Event::InstallationStatusChanged { installing: true }).unwrap();
        assert_eq!(value["event"], "installationStatusChanged");
        assert_eq!(value["installing"], true);

        let value = serde_json::to_value(Event::DatabasesListed { files: vec![] }).unwrap();
        assert_eq!(value["event"], "databasesListed");
        assert!(value["files"].as_array().unwrap().is_empty());

        let value = serde_json::to_value(Event::PrecomputeListed { files: vec![] }).unwrap();
        assert_eq!(value["event"], "precomputeListed");
    }

    #[test]
    fn matches_listed_omits_the_absent_alternative() {
        let ok = serde_json::to_value(Event::matches_listed(vec![])).unwrap();
        assert_eq!(ok["event"], "matchesListed");
        assert!(ok["parsedMatches"].as_array().unwrap().is_empty());
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(Event::matches_error("sidecar unreadable")).unwrap();
        assert_eq!(err["error"], "sidecar unreadable");
        assert!(err.get("parsedMatches").is_none());
    }

    #[test]
    fn match_rows_flatten_the_record() {
        let record = match parse_match_line(
            "Matched 1.0 s starting at 2.0 s in q.wav to time 3.0 s in r.afpt \
             with 4 of 5 common hashes at rank 6",
        ) {
            MatchLine::Matched(record) => record,
            MatchLine::Unrecognized(_) => unreachable!(),
        };
        let row = MatchRow {
            record,
            database: "refs".into(),
            name: "q".into(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["matchFilename"], "r.afpt");
        assert_eq!(value["rank"], "6");
        assert_eq!(value["database"], "refs");
        assert_eq!(value["name"], "q");
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(Event::notice("one"));
        sink.emit(Event::notice("two"));
        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Event::Notice { message } if message == "one"));
        assert!(sink.take().is_empty());
    }
}
