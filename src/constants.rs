pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws/logging-tail";
pub const DEFAULT_HTTP_URL: &str = "http://127.0.0.1:8000/api/de-mcu-tail";
pub const DEFAULT_STATE_FILE: &str = ".logtail-state";
pub const DEFAULT_LOG_FILE: &str = "logtail.log";
pub const DEFAULT_EXPORT_PATH: &str = "logtail-export.html";

pub const DEFAULT_TAIL_LINES: u32 = 200;
pub const MAX_TAIL_LINES: u32 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

pub const RECONNECT_BASE_MS: u64 = 500;
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 6;

pub const KEYWORD_DEBOUNCE_MS: u64 = 300;
pub const HEADER_SEARCH_DEBOUNCE_MS: u64 = 200;

pub const UI_TICK_MS: u64 = 50;
pub const HTTP_TIMEOUT_MS: u64 = 10_000;
pub const SOCKET_READ_TIMEOUT_MS: u64 = 100;

pub const INPUT_FIELD_HEIGHT: u16 = 3;
pub const STATUS_BAR_HEIGHT: u16 = 1;
pub const TIMESTAMP_COLUMN_WIDTH: u16 = 23;
pub const LEVEL_COLUMN_WIDTH: u16 = 9;

pub const DIALOG_WIDTH: u16 = 60;
pub const DIALOG_HEIGHT: u16 = 14;
pub const HELP_POPUP_WIDTH: u16 = 52;
pub const HELP_POPUP_HEIGHT: u16 = 18;
