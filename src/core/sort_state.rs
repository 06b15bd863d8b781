use crate::core::{level_priority, LogRow};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortColumn {
    Timestamp,
    Level,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

impl SortColumn {
    pub const ALL: [SortColumn; 3] = [SortColumn::Timestamp, SortColumn::Level, SortColumn::Message];

    /// Newest-first for time, ascending for the text columns.
    pub fn default_direction(self) -> SortDirection {
        match self {
            SortColumn::Timestamp => SortDirection::Descending,
            SortColumn::Level | SortColumn::Message => SortDirection::Ascending,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortColumn::Timestamp => "Time",
            SortColumn::Level => "Level",
            SortColumn::Message => "Message",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortState {
    pub column: Option<SortColumn>,
    pub direction: Option<SortDirection>,
    pub toggles: BTreeMap<SortColumn, SortDirection>,
}

impl SortState {
    pub fn select(&mut self, column: SortColumn, forced: Option<SortDirection>) -> SortDirection {
        let direction = match (forced, self.column, self.direction) {
            (Some(direction), _, _) => direction,
            (None, Some(current), Some(direction)) if current == column => direction.flipped(),
            _ => column.default_direction(),
        };
        self.column = Some(column);
        self.direction = Some(direction);
        self.toggles.insert(column, direction);
        direction
    }

    pub fn active(&self) -> Option<(SortColumn, SortDirection)> {
        self.column.zip(self.direction)
    }

    pub fn clear(&mut self) {
        self.column = None;
        self.direction = None;
        self.toggles.clear();
    }
}

fn compare_keys(a: &LogRow, b: &LogRow, column: SortColumn, direction: SortDirection) -> Ordering {
    let directed = |ord: Ordering| match direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    };
    match column {
        SortColumn::Timestamp => {
            // Unknown timestamps go last in either direction.
            match (a.timestamp_ms, b.timestamp_ms) {
                (Some(x), Some(y)) => directed(x.cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }
        SortColumn::Level => {
            directed(level_priority(&a.record.level).cmp(&level_priority(&b.record.level)))
        }
        SortColumn::Message => directed(a.message_key.cmp(&b.message_key)),
    }
}

/// Stable sort: rows with equal keys keep their relative order.
pub fn sort_rows(rows: &mut [LogRow], column: SortColumn, direction: SortDirection) {
    rows.sort_by(|a, b| compare_keys(a, b, column, direction));
}

/// Where `row` lands in already sorted `rows`, ahead of rows with an equal key
/// as a stable sort of a newly prepended row would place it.
pub fn insertion_index(
    rows: &[LogRow],
    row: &LogRow,
    column: SortColumn,
    direction: SortDirection,
) -> usize {
    rows.partition_point(|other| compare_keys(other, row, column, direction) == Ordering::Less)
}

pub fn restore_arrival_order(rows: &mut [LogRow]) {
    rows.sort_by(|a, b| b.id.cmp(&a.id));
}
