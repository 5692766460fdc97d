//! Parsers for the line-oriented output of the external fingerprint tools.
//!
//! audfprint reports results as prose lines on stdout. Everything downstream
//! (sidecar history, match tables) hangs off these parsers, so unrecognized
//! lines are tagged rather than dropped and every field is captured verbatim
//! as text. No numeric conversion happens here; the tool's own formatting is
//! the record of truth.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// One parsed match reported by `audfprint match`.
///
/// Fields stay as the exact substrings the tool printed (trimmed). Seconds
/// and hash counts are not parsed into numbers so that re-serialized records
/// are indistinguishable from freshly parsed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// Matched span length in seconds.
    pub match_duration: String,
    /// Offset of the span within the query, in seconds.
    pub match_start_in_query: String,
    /// Offset of the span within the matched reference, in seconds.
    pub match_start_in_fingerprint: String,
    /// Path of the matched reference as the tool printed it.
    pub match_filename: String,
    /// Common hash count.
    pub common_hash_numerator: String,
    /// Total hash count the query contributed.
    pub common_hash_denominator: String,
    /// Rank of this result among the tool's candidates.
    pub rank: String,
}

/// Classification of one `audfprint match` output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchLine<'a> {
    /// The line described a match and every field was captured.
    Matched(MatchRecord),
    /// Anything else: progress chatter, warnings, or a malformed match line.
    Unrecognized(&'a str),
}

/// Parse one stdout line from `audfprint match`.
///
/// The grammar is anchored from both ends: the three leading fields are cut
/// at the first occurrence of their delimiter phrases, the four trailing
/// fields at the last occurrence. That way reference paths containing phrases
/// like " with " or " s in " still parse. The query filename between
/// "to time" and the reference is discarded; sidecars already know which
/// artifact the line belongs to.
pub fn parse_match_line(line: &str) -> MatchLine<'_> {
    match try_parse_match(line) {
        Some(record) => MatchLine::Matched(record),
        None => MatchLine::Unrecognized(line),
    }
}

fn try_parse_match(line: &str) -> Option<MatchRecord> {
    let rest = line.trim_start().strip_prefix("Matched ")?;

    let (duration, rest) = split_field(rest, " s starting at ")?;
    let (start_in_query, rest) = split_field(rest, " s in ")?;

    let (rest, rank) = rsplit_field(rest, " common hashes at rank ")?;
    let (rest, denominator) = rsplit_field(rest, " of ")?;
    let (rest, numerator) = rsplit_field(rest, " with ")?;
    let (rest, filename) = rsplit_field(rest, " s in ")?;
    let (_query, start_in_fingerprint) = rsplit_field(rest, " to time ")?;

    Some(MatchRecord {
        match_duration: duration.trim().to_string(),
        match_start_in_query: start_in_query.trim().to_string(),
        match_start_in_fingerprint: start_in_fingerprint.trim().to_string(),
        match_filename: filename.trim().to_string(),
        common_hash_numerator: numerator.trim().to_string(),
        common_hash_denominator: denominator.trim().to_string(),
        rank: rank.trim().to_string(),
    })
}

/// Split at the first occurrence of `delim`; both halves must be non-empty.
fn split_field<'a>(s: &'a str, delim: &str) -> Option<(&'a str, &'a str)> {
    let (left, right) = s.split_once(delim)?;
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, right))
}

/// Split at the last occurrence of `delim`; both halves must be non-empty.
fn rsplit_field<'a>(s: &'a str, delim: &str) -> Option<(&'a str, &'a str)> {
    let (left, right) = s.rsplit_once(delim)?;
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, right))
}

/// Extract the artifact path from an `audfprint precompute` "wrote" line.
///
/// The tool appends a hash-count suffix after the path, so the path is the
/// prefix up to the last ".afpt" on the line.
pub fn parse_wrote_line(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("wrote ")?;
    let end = rest.rfind(".afpt")? + ".afpt".len();
    Some(&rest[..end])
}

static FFMPEG_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ffmpeg version (\S+)").unwrap());

/// Pull the version token out of the `ffmpeg -version` banner.
pub fn parse_ffmpeg_banner(output: &str) -> Option<String> {
    FFMPEG_VERSION_RE
        .captures(output)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_match(line: &str) -> MatchRecord {
        match parse_match_line(line) {
            MatchLine::Matched(record) => record,
            MatchLine::Unrecognized(l) => panic!("line should parse: {l}"),
        }
    }

    #[test]
    fn parses_canonical_match_line() {
        let record = expect_match(
            "Matched 12.3 s starting at 1.0 s in q.wav to time 45.6 s in ref.wav \
             with 80 of 100 common hashes at rank 1",
        );
        assert_eq!(record.match_duration, "12.3");
        assert_eq!(record.match_start_in_query, "1.0");
        assert_eq!(record.match_start_in_fingerprint, "45.6");
        assert_eq!(record.match_filename, "ref.wav");
        assert_eq!(record.common_hash_numerator, "80");
        assert_eq!(record.common_hash_denominator, "100");
        assert_eq!(record.rank, "1");
    }

    #[test]
    fn parses_real_tool_output() {
        let record = expect_match(
            "Matched    11.9 s starting at     0.0 s in /tmp/precompute/gd77.afpt \
             to time    21.1 s in refs/barton_hall_d1.afpt with    316 of    577 \
             common hashes at rank  0",
        );
        assert_eq!(record.match_duration, "11.9");
        assert_eq!(record.match_start_in_query, "0.0");
        assert_eq!(record.match_start_in_fingerprint, "21.1");
        assert_eq!(record.match_filename, "refs/barton_hall_d1.afpt");
        assert_eq!(record.common_hash_numerator, "316");
        assert_eq!(record.common_hash_denominator, "577");
        assert_eq!(record.rank, "0");
    }

    #[test]
    fn reference_path_containing_delimiter_phrases_still_parses() {
        // The reference filename carries " with " and " of " lookalikes;
        // trailing fields anchor at the last occurrence.
        let record = expect_match(
            "Matched 3.0 s starting at 0.5 s in q.wav to time 9.9 s in \
             shows/live with strings of 1999.afpt with 10 of 40 common hashes at rank 2",
        );
        assert_eq!(record.match_filename, "shows/live with strings of 1999.afpt");
        assert_eq!(record.common_hash_numerator, "10");
        assert_eq!(record.common_hash_denominator, "40");
        assert_eq!(record.rank, "2");
    }

    #[test]
    fn non_match_lines_are_tagged_unrecognized() {
        for line in [
            "NOMATCH /tmp/q.afpt",
            "Reading database refs.pklz ...",
            "Matched nothing today",
            "",
        ] {
            assert_eq!(parse_match_line(line), MatchLine::Unrecognized(line));
        }
    }

    #[test]
    fn truncated_match_line_is_unrecognized() {
        let line = "Matched 12.3 s starting at 1.0 s in q.wav to time 45.6 s in ref.wav";
        assert_eq!(parse_match_line(line), MatchLine::Unrecognized(line));
    }

    #[test]
    fn empty_capture_is_rejected() {
        // A field delimiter with nothing before it must not produce an empty capture.
        let line = "Matched  s starting at 1.0 s in q.wav to time 45.6 s in ref.wav \
                    with 80 of 100 common hashes at rank 1";
        assert!(matches!(parse_match_line(line), MatchLine::Unrecognized(_)));
    }

    #[test]
    fn wrote_line_yields_artifact_path() {
        assert_eq!(
            parse_wrote_line("wrote /tmp/out/q.afpt ( 2113 hashes, 45.1 sec)"),
            Some("/tmp/out/q.afpt")
        );
        assert_eq!(parse_wrote_line("wrote q.afpt"), Some("q.afpt"));
    }

    #[test]
    fn wrote_line_takes_last_extension_occurrence() {
        assert_eq!(
            parse_wrote_line("wrote dir.afpt/take two.afpt ( 9 hashes)"),
            Some("dir.afpt/take two.afpt")
        );
    }

    #[test]
    fn non_wrote_lines_yield_nothing() {
        assert_eq!(parse_wrote_line("Reading q.wav"), None);
        assert_eq!(parse_wrote_line("wrote q.pklz"), None);
        assert_eq!(parse_wrote_line("they wrote q.afpt"), None);
    }

    #[test]
    fn ffmpeg_banner_version_is_extracted() {
        let banner = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 \
                      the FFmpeg developers\nbuilt with gcc 13";
        assert_eq!(parse_ffmpeg_banner(banner), Some("6.1.1-3ubuntu5".into()));
        assert_eq!(parse_ffmpeg_banner("command not found"), None);
    }

    #[test]
    fn match_record_serializes_camel_case() {
        let record = expect_match(
            "Matched 1.0 s starting at 2.0 s in q.wav to time 3.0 s in r.wav \
             with 4 of 5 common hashes at rank 6",
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["matchDuration"], "1.0");
        assert_eq!(json["matchStartInQuery"], "2.0");
        assert_eq!(json["matchStartInFingerprint"], "3.0");
        assert_eq!(json["matchFilename"], "r.wav");
        assert_eq!(json["commonHashNumerator"], "4");
        assert_eq!(json["commonHashDenominator"], "5");
        assert_eq!(json["rank"], "6");
    }
}
