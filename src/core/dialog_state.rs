use crate::core::filter_state::{clamp_poll_interval, clamp_tail_lines};
use crate::core::{format_timestamp_ms, parse_timestamp_ms, FilterState, Level};
use crate::input::TextInput;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogField {
    Keyword,
    Levels,
    Start,
    End,
    Lines,
    PollInterval,
    AutoPoll,
}

impl DialogField {
    const ORDER: [DialogField; 7] = [
        DialogField::Keyword,
        DialogField::Levels,
        DialogField::Start,
        DialogField::End,
        DialogField::Lines,
        DialogField::PollInterval,
        DialogField::AutoPoll,
    ];

    fn position(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ORDER[(self.position() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        Self::ORDER[(self.position() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogEdits {
    pub keyword: String,
    pub levels: BTreeSet<Level>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub tail_lines: u32,
    pub poll_interval_ms: u64,
    pub auto_poll: bool,
}

#[derive(Debug, Clone)]
pub struct FilterDialog {
    pub keyword: TextInput,
    pub levels: BTreeSet<Level>,
    pub start: TextInput,
    pub end: TextInput,
    pub lines: TextInput,
    pub poll_interval: TextInput,
    pub auto_poll: bool,
    pub field: DialogField,
    pub error: Option<String>,
}

fn parse_bound(input: &TextInput, name: &str) -> Result<Option<i64>, String> {
    if input.is_blank() {
        return Ok(None);
    }
    let raw = input.trimmed();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(Some(ms));
    }
    parse_timestamp_ms(raw)
        .map(Some)
        .ok_or_else(|| format!("invalid {} time: {}", name, raw))
}

impl FilterDialog {
    pub fn open(filter: &FilterState) -> Self {
        Self {
            keyword: TextInput::new(filter.keyword.clone()),
            levels: filter.selected_levels.clone(),
            start: TextInput::new(filter.start_ts.map(format_timestamp_ms).unwrap_or_default()),
            end: TextInput::new(filter.end_ts.map(format_timestamp_ms).unwrap_or_default()),
            lines: TextInput::new(filter.tail_lines.to_string()),
            poll_interval: TextInput::new(filter.poll_interval_ms.to_string()),
            auto_poll: filter.auto_poll,
            field: DialogField::Keyword,
            error: None,
        }
    }

    pub fn next_field(&mut self) {
        self.field = self.field.next();
    }

    pub fn prev_field(&mut self) {
        self.field = self.field.prev();
    }

    pub fn active_input_mut(&mut self) -> Option<&mut TextInput> {
        match self.field {
            DialogField::Keyword => Some(&mut self.keyword),
            DialogField::Start => Some(&mut self.start),
            DialogField::End => Some(&mut self.end),
            DialogField::Lines => Some(&mut self.lines),
            DialogField::PollInterval => Some(&mut self.poll_interval),
            DialogField::Levels | DialogField::AutoPoll => None,
        }
    }

    pub fn toggle_level(&mut self, level: Level) {
        if !self.levels.remove(&level) {
            self.levels.insert(level);
        }
    }

    pub fn toggle_auto_poll(&mut self) {
        self.auto_poll = !self.auto_poll;
    }

    pub fn validate(&self) -> Result<DialogEdits, String> {
        let start_ts = parse_bound(&self.start, "start")?;
        let end_ts = parse_bound(&self.end, "end")?;
        if let (Some(start), Some(end)) = (start_ts, end_ts) {
            if start > end {
                return Err("start time is after end time".to_string());
            }
        }
        let tail_lines = match self.lines.parse::<u32>() {
            Some(Ok(lines)) if lines > 0 => clamp_tail_lines(lines),
            _ => return Err(format!("invalid line count: {}", self.lines.trimmed())),
        };
        let poll_interval_ms = match self.poll_interval.parse::<u64>() {
            Some(Ok(ms)) => clamp_poll_interval(ms),
            _ => {
                return Err(format!(
                    "invalid poll interval: {}",
                    self.poll_interval.trimmed()
                ))
            }
        };
        Ok(DialogEdits {
            keyword: self.keyword.text.clone(),
            levels: self.levels.clone(),
            start_ts,
            end_ts,
            tail_lines,
            poll_interval_ms,
            auto_poll: self.auto_poll,
        })
    }
}
