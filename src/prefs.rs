use crate::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_TAIL_LINES};
use crate::core::filter_state::{clamp_poll_interval, clamp_tail_lines};
use crate::core::{FilterState, Level};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const KEY_TOKEN: &str = "logtail.token";
pub const KEY_TAIL_LINES: &str = "logtail.lines";
pub const KEY_POLL_INTERVAL: &str = "logtail.pollIntervalMs";
pub const KEY_KEYWORD: &str = "logtail.keyword";
pub const KEY_HEADER_SEARCH: &str = "logtail.headerSearch";
pub const KEY_AUTO_POLL: &str = "logtail.autoPoll";
pub const KEY_LEVELS: &str = "logtail.levels";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring unreadable state file");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    fn save(&self) {
        let result = serde_json::to_string_pretty(&self.entries)
            .map_err(std::io::Error::from)
            .and_then(|content| fs::write(&self.path, content));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to write state file");
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
        self.save();
    }

    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.save();
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

#[derive(Debug)]
pub struct Preferences<S> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read every persisted field, falling back to the default for anything
    /// missing or unparsable.
    pub fn load(&self) -> FilterState {
        let mut filter = FilterState::default();
        filter.tail_lines = self
            .parsed::<u32>(KEY_TAIL_LINES)
            .filter(|lines| *lines > 0)
            .map(clamp_tail_lines)
            .unwrap_or(DEFAULT_TAIL_LINES);
        filter.poll_interval_ms = self
            .parsed::<u64>(KEY_POLL_INTERVAL)
            .map(clamp_poll_interval)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        filter.keyword = self.store.get(KEY_KEYWORD).unwrap_or_default();
        filter.header_search = self.store.get(KEY_HEADER_SEARCH).unwrap_or_default();
        if let Some(auto_poll) = self.parsed::<bool>(KEY_AUTO_POLL) {
            filter.auto_poll = auto_poll;
        }
        filter.selected_levels = self.levels();
        filter
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "invalid stored preference, using default");
                None
            }
        }
    }

    fn levels(&self) -> BTreeSet<Level> {
        let Some(raw) = self.store.get(KEY_LEVELS) else {
            return BTreeSet::new();
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(names) => names.iter().filter_map(|name| Level::parse(name)).collect(),
            Err(e) => {
                warn!(value = %raw, error = %e, "invalid stored level set, using default");
                BTreeSet::new()
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(KEY_TOKEN).filter(|t| !t.is_empty())
    }

    pub fn save_token(&mut self, token: Option<&str>) {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => self.store.set(KEY_TOKEN, token.to_string()),
            None => self.store.remove(KEY_TOKEN),
        }
    }

    pub fn save_tail_lines(&mut self, lines: u32) {
        self.store.set(KEY_TAIL_LINES, lines.to_string());
    }

    pub fn save_poll_interval(&mut self, ms: u64) {
        self.store.set(KEY_POLL_INTERVAL, ms.to_string());
    }

    pub fn save_keyword(&mut self, keyword: &str) {
        self.store.set(KEY_KEYWORD, keyword.to_string());
    }

    pub fn save_header_search(&mut self, text: &str) {
        self.store.set(KEY_HEADER_SEARCH, text.to_string());
    }

    pub fn save_auto_poll(&mut self, enabled: bool) {
        self.store.set(KEY_AUTO_POLL, enabled.to_string());
    }

    pub fn save_levels(&mut self, levels: &BTreeSet<Level>) {
        let names: Vec<&str> = levels.iter().map(|level| level.as_str()).collect();
        match serde_json::to_string(&names) {
            Ok(json) => self.store.set(KEY_LEVELS, json),
            Err(e) => warn!(error = %e, "failed to encode level set"),
        }
    }
}
