pub mod connection_state;
pub mod dialog_state;
pub mod filter_state;
pub mod log_state;
pub mod sort_state;

pub use connection_state::{backoff_delay, ConnectionState, ConnectionStatus};
pub use dialog_state::{DialogEdits, DialogField, FilterDialog};
pub use filter_state::FilterState;
pub use log_state::{
    format_timestamp_ms, level_priority, parse_timestamp_ms, Level, LogRecord, LogRow, LogTable,
};
pub use sort_state::{SortColumn, SortDirection, SortState};
