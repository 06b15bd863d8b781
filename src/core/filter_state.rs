use crate::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_TAIL_LINES, MAX_TAIL_LINES, MIN_POLL_INTERVAL_MS,
};
use crate::core::{Level, LogRecord};
use crate::protocol::RequestPayload;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub keyword: String,
    pub header_search: String,
    /// Empty means every level passes.
    pub selected_levels: BTreeSet<Level>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub tail_lines: u32,
    pub poll_interval_ms: u64,
    pub selected_file: Option<String>,
    pub auto_poll: bool,
    pub auto_reconnect: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            header_search: String::new(),
            selected_levels: BTreeSet::new(),
            start_ts: None,
            end_ts: None,
            tail_lines: DEFAULT_TAIL_LINES,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            selected_file: None,
            auto_poll: true,
            auto_reconnect: true,
        }
    }
}

pub fn clamp_poll_interval(ms: u64) -> u64 {
    ms.max(MIN_POLL_INTERVAL_MS)
}

pub fn clamp_tail_lines(lines: u32) -> u32 {
    lines.clamp(1, MAX_TAIL_LINES)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl FilterState {
    pub fn active_keyword(&self) -> &str {
        self.keyword.trim()
    }

    pub fn matches_keyword(&self, record: &LogRecord) -> bool {
        let keyword = self.active_keyword();
        if keyword.is_empty() {
            return true;
        }
        let haystack = format!("{} {} {}", record.timestamp, record.level, record.message);
        contains_ci(&haystack, keyword)
    }

    pub fn matches_level(&self, record: &LogRecord) -> bool {
        if self.selected_levels.is_empty() {
            return true;
        }
        record
            .known_level()
            .is_some_and(|level| self.selected_levels.contains(&level))
    }

    /// Inclusive range check. A row whose timestamp cannot be parsed fails
    /// whenever a bound is set.
    pub fn matches_range(&self, record: &LogRecord) -> bool {
        if self.start_ts.is_none() && self.end_ts.is_none() {
            return true;
        }
        let Some(ts) = record.timestamp_ms() else {
            return false;
        };
        self.start_ts.map_or(true, |start| ts >= start) && self.end_ts.map_or(true, |end| ts <= end)
    }

    pub fn matches_header_search(&self, record: &LogRecord) -> bool {
        let needle = self.header_search.trim();
        needle.is_empty() || contains_ci(&record.message, needle)
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        self.matches_keyword(record)
            && self.matches_level(record)
            && self.matches_range(record)
            && self.matches_header_search(record)
    }

    pub fn build_request_payload(&self) -> RequestPayload {
        let keyword = self.active_keyword();
        RequestPayload {
            lines: self.tail_lines,
            keyword: (!keyword.is_empty()).then(|| keyword.to_string()),
            levels: (!self.selected_levels.is_empty()).then(|| {
                self.selected_levels
                    .iter()
                    .map(|level| level.as_str().to_string())
                    .collect()
            }),
            start: self.start_ts,
            end: self.end_ts,
            file: self.selected_file.clone().filter(|f| !f.is_empty()),
        }
    }
}
