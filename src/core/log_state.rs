use crate::markup::RowMarkup;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Error,
    Warning,
    Info,
    Debug,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Error, Level::Warning, Level::Info, Level::Debug];

    pub fn parse(raw: &str) -> Option<Level> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Some(Level::Error),
            "WARNING" => Some(Level::Warning),
            "INFO" => Some(Level::Info),
            "DEBUG" => Some(Level::Debug),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }

    pub fn priority(self) -> u8 {
        match self {
            Level::Error => 4,
            Level::Warning => 3,
            Level::Info => 2,
            Level::Debug => 1,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn level_priority(level: &str) -> u8 {
    Level::parse(level).map_or(0, Level::priority)
}

/// Parse a server display timestamp into milliseconds since the epoch.
///
/// Naive forms (`2024-01-01 10:00:00`, optional fraction, optional `T`) are read
/// as local time, the way the server writes them.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    let normalized = s.replacen('T', " ", 1);
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return naive
                .and_local_timezone(Local)
                .earliest()
                .map(|dt| dt.timestamp_millis());
        }
    }
    None
}

pub fn format_timestamp_ms(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(
        timestamp: impl Into<String>,
        level: impl AsRef<str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            level: level.as_ref().trim().to_uppercase(),
            message: message.into(),
        }
    }

    pub fn known_level(&self) -> Option<Level> {
        Level::parse(&self.level)
    }

    pub fn timestamp_ms(&self) -> Option<i64> {
        parse_timestamp_ms(&self.timestamp)
    }
}

#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: u64,
    pub record: LogRecord,
    pub markup: RowMarkup,
    pub visible: bool,
    pub expanded: bool,
    // Sort keys, computed once at insertion.
    pub timestamp_ms: Option<i64>,
    pub message_key: String,
}

impl LogRow {
    pub fn new(id: u64, record: LogRecord, markup: RowMarkup, visible: bool) -> Self {
        Self {
            id,
            timestamp_ms: record.timestamp_ms(),
            message_key: record.message.to_lowercase(),
            record,
            markup,
            visible,
            expanded: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct LogTable {
    rows: VecDeque<LogRow>,
    next_id: u64,
    last_update: Option<DateTime<Local>>,
}

impl LogTable {
    pub fn prepend(&mut self, record: LogRecord, markup: RowMarkup, visible: bool) -> u64 {
        let row = self.next_row(record, markup, visible);
        let id = row.id;
        self.rows.push_front(row);
        id
    }

    /// Inserts a new row at the index chosen by `position`, given the current
    /// rows and the row being inserted.
    pub fn insert_at(
        &mut self,
        record: LogRecord,
        markup: RowMarkup,
        visible: bool,
        position: impl FnOnce(&[LogRow], &LogRow) -> usize,
    ) -> u64 {
        let row = self.next_row(record, markup, visible);
        let id = row.id;
        let index = position(&*self.rows.make_contiguous(), &row);
        self.rows.insert(index, row);
        id
    }

    fn next_row(&mut self, record: LogRecord, markup: RowMarkup, visible: bool) -> LogRow {
        let id = self.next_id;
        self.next_id += 1;
        self.last_update = Some(Local::now());
        LogRow::new(id, record, markup, visible)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.last_update = None;
    }

    pub fn total(&self) -> usize {
        self.rows.len()
    }

    pub fn visible_count(&self) -> usize {
        self.rows.iter().filter(|row| row.visible).count()
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogRow> {
        self.rows.iter()
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &LogRow> {
        self.rows.iter().filter(|row| row.visible)
    }

    pub fn get(&self, id: u64) -> Option<&LogRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut LogRow> {
        self.rows.iter_mut()
    }

    pub fn as_mut_slice(&mut self) -> &mut [LogRow] {
        self.rows.make_contiguous()
    }

    pub fn toggle_expanded(&mut self, id: u64) -> bool {
        match self.rows.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                row.expanded = !row.expanded;
                true
            }
            None => false,
        }
    }
}
