//! Detection of stats objects fused onto the tail of answer text
//!
//! Some backends append `{"type":"stats",...}` directly to the last answer
//! fragment instead of sending it as its own record.

use jot_ai::Stats;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// A flat `{"type":"stats", ...}` object followed only by whitespace
static TRAILING_STATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"type"\s*:\s*"stats"[^{}]*\}\s*$"#).expect("valid regex")
});

#[derive(Deserialize)]
struct EmbeddedRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    inference_time: Option<f64>,
    #[serde(default)]
    tokens_per_second: Option<f64>,
}

/// Result of scanning an answer fragment
#[derive(Debug, Clone, PartialEq)]
pub enum TrailingStats<'a> {
    /// Stats found; `text` is the fragment with the object removed
    Found { text: &'a str, stats: Stats },
    /// Something stats-shaped was there but did not parse
    Malformed,
    /// No trailing stats object
    Absent,
}

/// Scan the end of `fragment` for an embedded stats object
pub fn split_trailing_stats(fragment: &str) -> TrailingStats<'_> {
    let Some(m) = TRAILING_STATS.find(fragment) else {
        return TrailingStats::Absent;
    };

    match serde_json::from_str::<EmbeddedRecord>(m.as_str().trim_end()) {
        Ok(record) if record.kind == "stats" => TrailingStats::Found {
            text: &fragment[..m.start()],
            stats: Stats {
                inference_time: record.inference_time,
                tokens_per_second: record.tokens_per_second,
            },
        },
        Ok(_) => TrailingStats::Malformed,
        Err(e) => {
            tracing::warn!("Ignoring malformed embedded stats: {}", e);
            TrailingStats::Malformed
        }
    }
}
