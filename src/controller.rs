use crate::constants::{HEADER_SEARCH_DEBOUNCE_MS, KEYWORD_DEBOUNCE_MS};
use crate::core::filter_state::{clamp_poll_interval, clamp_tail_lines};
use crate::core::sort_state::{insertion_index, restore_arrival_order, sort_rows};
use crate::core::{
    ConnectionState, ConnectionStatus, DialogEdits, FilterState, Level, LogRecord, LogTable,
    SortColumn, SortDirection, SortState,
};
use crate::markup::{table_html, Highlighter, RowMarkup};
use crate::prefs::{KeyValueStore, Preferences};
use crate::protocol::{decode_frame, decode_snapshot, snapshot_url, socket_url, ServerFrame};
use crate::timer::Timer;
use crate::transport::{Transport, TransportEvent};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub socket: Url,
    pub snapshot: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

pub struct Controller<T, S> {
    transport: T,
    prefs: Preferences<S>,
    endpoints: Endpoints,
    token: Option<String>,
    filter: FilterState,
    table: LogTable,
    sort: SortState,
    connection: ConnectionState,
    highlighter: Highlighter,
    poll_timer: Timer,
    reconnect_timer: Timer,
    keyword_debounce: Timer,
    header_debounce: Timer,
    poll_seq: u64,
    notice: Option<Notice>,
}

impl<T: Transport, S: KeyValueStore> Controller<T, S> {
    pub fn new(transport: T, store: S, endpoints: Endpoints, token: Option<String>) -> Self {
        let mut prefs = Preferences::new(store);
        let token = match token {
            Some(token) => {
                prefs.save_token(Some(&token));
                Some(token)
            }
            None => prefs.token(),
        };
        let filter = prefs.load();
        let highlighter = Highlighter::new(filter.active_keyword());
        Self {
            transport,
            prefs,
            endpoints,
            token,
            filter,
            table: LogTable::default(),
            sort: SortState::default(),
            connection: ConnectionState::default(),
            highlighter,
            poll_timer: Timer::default(),
            reconnect_timer: Timer::default(),
            keyword_debounce: Timer::default(),
            header_debounce: Timer::default(),
            poll_seq: 0,
            notice: None,
        }
    }

    pub fn start(&mut self, now: Instant, file: Option<String>, connect: bool) {
        self.filter.selected_file = file.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
        if connect {
            self.connect(now);
        } else if self.filter.auto_poll {
            self.poll_once();
            self.start_polling(now);
        } else {
            self.poll_once();
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn table(&self) -> &LogTable {
        &self.table
    }

    pub fn sort_state(&self) -> &SortState {
        &self.sort
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn is_paused(&self) -> bool {
        self.connection.paused
    }

    pub fn is_polling(&self) -> bool {
        self.poll_timer.is_active()
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_timer.deadline()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            text: text.into(),
        });
    }

    // --- transport manager -------------------------------------------------

    /// User-initiated connect. Restores the full retry budget.
    pub fn connect(&mut self, _now: Instant) {
        if !self.connection.is_disconnected() {
            return;
        }
        self.connection.reconnect_attempts = 0;
        self.reconnect_timer.cancel();
        self.open_socket();
    }

    fn open_socket(&mut self) {
        let generation = self.connection.begin_connect();
        let url = socket_url(
            &self.endpoints.socket,
            self.token.as_deref(),
            self.filter.selected_file.as_deref(),
        );
        info!(
            generation,
            attempt = self.connection.reconnect_attempts,
            "connecting"
        );
        self.transport.connect(generation, url);
    }

    /// User-initiated close; no automatic reconnect follows it.
    pub fn disconnect(&mut self, now: Instant) {
        self.reconnect_timer.cancel();
        if let Some(generation) = self.connection.abandon() {
            info!(generation, "disconnecting");
            self.transport.close(generation);
            self.after_close(now, false);
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Opened { generation } => {
                if !self.connection.is_current(generation) {
                    debug!(generation, "open from abandoned socket");
                    return;
                }
                self.connection.mark_open();
                self.reconnect_timer.cancel();
                self.stop_polling();
                self.clear_log_table();
                info!(generation, "connected");
            }
            TransportEvent::Frame { generation, text } => {
                if !self.connection.is_current(generation) || self.connection.paused {
                    return;
                }
                self.handle_frame(&text);
            }
            TransportEvent::Closed { generation, reason } => {
                if !self.connection.is_current(generation) {
                    return;
                }
                self.connection.mark_closed();
                match reason {
                    Some(reason) => {
                        warn!(generation, %reason, "connection lost");
                        self.notify(NoticeKind::Error, format!("Disconnected: {}", reason));
                    }
                    None => info!(generation, "connection closed"),
                }
                self.after_close(now, true);
            }
            TransportEvent::PollResult { seq, result } => self.handle_poll_result(seq, result),
        }
    }

    fn handle_frame(&mut self, text: &str) {
        match decode_frame(text) {
            Ok(ServerFrame::Line(wire)) => {
                self.add_log_entry(wire.into());
            }
            Ok(ServerFrame::Error { msg }) => {
                warn!(message = %msg, "server reported an error");
                self.notify(NoticeKind::Error, msg);
            }
            Ok(ServerFrame::Info { msg }) => self.notify(NoticeKind::Info, msg),
            Ok(ServerFrame::Unknown) => debug!("ignoring unrecognized frame"),
            Err(e) => debug!(error = %e, "discarding malformed frame"),
        }
    }

    fn after_close(&mut self, now: Instant, allow_reconnect: bool) {
        // A running poll keeps its cadence across failed reconnects.
        if self.filter.auto_poll && !self.poll_timer.is_active() {
            self.start_polling(now);
        }
        if allow_reconnect && self.filter.auto_reconnect {
            self.schedule_reconnect(now);
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        match self.connection.next_reconnect_delay() {
            Some(delay) => {
                info!(
                    attempt = self.connection.reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.reconnect_timer.once(now, delay);
            }
            None => {
                warn!(
                    attempts = self.connection.reconnect_attempts,
                    "reconnect budget exhausted, giving up"
                );
                self.notify(
                    NoticeKind::Error,
                    format!(
                        "Reconnect failed after {} attempts - press c to retry",
                        self.connection.reconnect_attempts
                    ),
                );
            }
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if self.reconnect_timer.fire(now) && self.connection.is_disconnected() {
            self.open_socket();
        }
        if self.poll_timer.fire(now) {
            self.poll_once();
        }
        if self.keyword_debounce.fire(now) {
            self.apply_filter();
            self.refetch(now);
        }
        if self.header_debounce.fire(now) {
            self.apply_filter();
        }
    }

    fn start_polling(&mut self, now: Instant) {
        if self.connection.is_live() {
            return;
        }
        let period = Duration::from_millis(self.filter.poll_interval_ms);
        self.poll_timer.every(now, period);
        debug!(interval_ms = self.filter.poll_interval_ms, "polling started");
    }

    fn stop_polling(&mut self) {
        if self.poll_timer.is_active() {
            debug!("polling stopped");
        }
        self.poll_timer.cancel();
    }

    fn poll_once(&mut self) {
        if self.connection.is_live() {
            return;
        }
        self.poll_seq += 1;
        let payload = self.filter.build_request_payload();
        let url = snapshot_url(&self.endpoints.snapshot, &payload);
        debug!(seq = self.poll_seq, %url, "polling");
        self.transport.fetch(self.poll_seq, url);
    }

    fn handle_poll_result(&mut self, seq: u64, result: Result<String, String>) {
        if seq != self.poll_seq {
            debug!(seq, latest = self.poll_seq, "discarding superseded poll response");
            return;
        }
        if self.connection.is_live() || self.connection.paused {
            return;
        }
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                warn!(seq, error = %e, "poll failed");
                self.notify(NoticeKind::Error, format!("Poll failed: {}", e));
                return;
            }
        };
        match decode_snapshot(&body) {
            Ok(records) => {
                self.table.clear();
                for record in records {
                    self.insert_row(record);
                }
                self.resort();
            }
            Err(e) => {
                warn!(seq, error = %e, "undecodable poll response");
                self.notify(NoticeKind::Error, format!("Poll failed: {}", e));
            }
        }
    }

    pub fn refetch(&mut self, _now: Instant) {
        if !self.connection.is_live() {
            self.poll_once();
            return;
        }
        match self.filter.build_request_payload().command_frame() {
            Ok(frame) => {
                self.clear_log_table();
                self.transport.send(self.connection.generation, frame);
            }
            Err(e) => warn!(error = %e, "could not encode reload command"),
        }
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.connection.paused = !self.connection.paused;
        info!(paused = self.connection.paused, "pause toggled");
        self.connection.paused
    }

    pub fn select_file(&mut self, file: Option<String>, now: Instant) {
        let file = file.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
        if file == self.filter.selected_file {
            return;
        }
        info!(file = file.as_deref().unwrap_or("<latest>"), "switching log source");
        self.filter.selected_file = file;

        let was_connected = match self.connection.abandon() {
            Some(generation) => {
                self.transport.close(generation);
                true
            }
            None => false,
        };
        self.reconnect_timer.cancel();
        self.clear_log_table();
        self.poll_once();

        if was_connected || self.filter.auto_reconnect {
            self.connection.reconnect_attempts = 0;
            self.open_socket();
        }
        if self.filter.auto_poll {
            self.start_polling(now);
        }
    }

    pub fn set_token(&mut self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        self.prefs.save_token(token.as_deref());
        self.token = token;
    }

    // --- filter state ----------------------------------------------------

    pub fn set_keyword(&mut self, keyword: &str, now: Instant) {
        self.filter.keyword = keyword.to_string();
        self.prefs.save_keyword(keyword);
        self.keyword_debounce
            .once(now, Duration::from_millis(KEYWORD_DEBOUNCE_MS));
    }

    pub fn set_header_search(&mut self, text: &str, now: Instant) {
        self.filter.header_search = text.to_string();
        self.prefs.save_header_search(text);
        self.header_debounce
            .once(now, Duration::from_millis(HEADER_SEARCH_DEBOUNCE_MS));
    }

    pub fn toggle_level(&mut self, level: Level, now: Instant) {
        let mut levels = self.filter.selected_levels.clone();
        if !levels.remove(&level) {
            levels.insert(level);
        }
        self.set_levels(levels, now);
    }

    pub fn set_levels(&mut self, levels: BTreeSet<Level>, now: Instant) {
        self.prefs.save_levels(&levels);
        self.filter.selected_levels = levels;
        self.apply_filter();
        self.refetch(now);
    }

    pub fn set_tail_lines(&mut self, lines: u32, now: Instant) {
        let lines = clamp_tail_lines(lines);
        self.filter.tail_lines = lines;
        self.prefs.save_tail_lines(lines);
        self.refetch(now);
    }

    pub fn set_poll_interval(&mut self, ms: u64, now: Instant) {
        let ms = clamp_poll_interval(ms);
        self.filter.poll_interval_ms = ms;
        self.prefs.save_poll_interval(ms);
        if self.poll_timer.is_active() {
            self.start_polling(now);
        }
    }

    pub fn set_auto_poll(&mut self, enabled: bool, now: Instant) {
        self.filter.auto_poll = enabled;
        self.prefs.save_auto_poll(enabled);
        if enabled {
            self.start_polling(now);
        } else {
            self.stop_polling();
        }
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.filter.auto_reconnect = enabled;
        if !enabled {
            self.reconnect_timer.cancel();
        }
    }

    pub fn apply_edits(&mut self, edits: DialogEdits, now: Instant) {
        self.filter.keyword = edits.keyword;
        self.prefs.save_keyword(&self.filter.keyword);
        self.keyword_debounce.cancel();
        self.prefs.save_levels(&edits.levels);
        self.filter.selected_levels = edits.levels;
        self.filter.start_ts = edits.start_ts;
        self.filter.end_ts = edits.end_ts;
        self.filter.tail_lines = edits.tail_lines;
        self.prefs.save_tail_lines(edits.tail_lines);

        let interval_changed = edits.poll_interval_ms != self.filter.poll_interval_ms;
        self.filter.poll_interval_ms = edits.poll_interval_ms;
        self.prefs.save_poll_interval(edits.poll_interval_ms);
        if edits.auto_poll != self.filter.auto_poll {
            self.set_auto_poll(edits.auto_poll, now);
        } else if interval_changed && self.poll_timer.is_active() {
            self.start_polling(now);
        }

        self.apply_filter();
        self.refetch(now);
    }

    fn current_highlighter(&mut self) -> &Highlighter {
        if self.highlighter.keyword() != self.filter.active_keyword() {
            self.highlighter = Highlighter::new(self.filter.active_keyword());
        }
        &self.highlighter
    }

    pub fn apply_filter(&mut self) {
        let highlighter = self.current_highlighter().clone();
        for row in self.table.rows_mut() {
            row.visible = self.filter.matches(&row.record);
            row.markup = RowMarkup::render(&row.record, Some(&highlighter));
        }
        self.resort();
    }

    // --- row renderer ------------------------------------------------------

    fn insert_row(&mut self, record: LogRecord) -> u64 {
        let markup = RowMarkup::render(&record, Some(self.current_highlighter()));
        let visible = self.filter.matches(&record);
        self.table.prepend(record, markup, visible)
    }

    pub fn add_log_entry(&mut self, record: LogRecord) -> u64 {
        let Some((column, direction)) = self.sort.active() else {
            return self.insert_row(record);
        };
        let markup = RowMarkup::render(&record, Some(self.current_highlighter()));
        let visible = self.filter.matches(&record);
        self.table.insert_at(record, markup, visible, |rows, row| {
            insertion_index(rows, row, column, direction)
        })
    }

    pub fn clear_log_table(&mut self) {
        self.table.clear();
        self.connection.paused = false;
    }

    pub fn toggle_expanded(&mut self, row_id: u64) -> bool {
        self.table.toggle_expanded(row_id)
    }

    pub fn export_html(&self) -> String {
        let source = self.filter.selected_file.as_deref().unwrap_or("latest log");
        table_html(&format!("Log tail: {}", source), self.table.visible_rows())
    }

    // --- sort engine -------------------------------------------------------

    pub fn sort_table(&mut self, column: SortColumn, forced: Option<SortDirection>) {
        let direction = self.sort.select(column, forced);
        sort_rows(self.table.as_mut_slice(), column, direction);
    }

    pub fn clear_sort(&mut self) {
        self.sort.clear();
        restore_arrival_order(self.table.as_mut_slice());
    }

    fn resort(&mut self) {
        if let Some((column, direction)) = self.sort.active() {
            sort_rows(self.table.as_mut_slice(), column, direction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backoff_delay;
    use crate::markup::{HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};
    use crate::prefs::{MemoryStore, KEY_KEYWORD, KEY_LEVELS, KEY_POLL_INTERVAL};
    use crate::transport::fake::RecordingTransport;
    use serde_json::Value;

    type TestController = Controller<RecordingTransport, MemoryStore>;

    fn endpoints() -> Endpoints {
        Endpoints {
            socket: Url::parse("ws://logs.test/ws/logging-tail").unwrap(),
            snapshot: Url::parse("http://logs.test/api/de-mcu-tail").unwrap(),
        }
    }

    fn controller() -> TestController {
        Controller::new(
            RecordingTransport::default(),
            MemoryStore::default(),
            endpoints(),
            None,
        )
    }

    fn line(ts: &str, level: &str, msg: &str) -> String {
        serde_json::json!({"type": "line", "ts": ts, "level": level, "msg": msg}).to_string()
    }

    fn last_generation(c: &TestController) -> u64 {
        c.transport().connects().last().map(|(g, _)| *g).unwrap()
    }

    fn open(c: &mut TestController, now: Instant) -> u64 {
        c.connect(now);
        let generation = last_generation(c);
        c.handle_event(TransportEvent::Opened { generation }, now);
        generation
    }

    fn frame(c: &mut TestController, generation: u64, text: String, now: Instant) {
        c.handle_event(TransportEvent::Frame { generation, text }, now);
    }

    fn messages(c: &TestController) -> Vec<String> {
        c.table().iter().map(|r| r.record.message.clone()).collect()
    }

    fn visible_messages(c: &TestController) -> Vec<String> {
        c.table()
            .visible_rows()
            .map(|r| r.record.message.clone())
            .collect()
    }

    fn respond(c: &mut TestController, body: &str, now: Instant) {
        let seq = c.transport().fetches().last().map(|(s, _)| *s).unwrap();
        c.handle_event(
            TransportEvent::PollResult {
                seq,
                result: Ok(body.to_string()),
            },
            now,
        );
    }

    #[test]
    fn test_connect_url_carries_token_and_file() {
        let mut c = Controller::new(
            RecordingTransport::default(),
            MemoryStore::default(),
            endpoints(),
            Some("tok".to_string()),
        );
        let t0 = Instant::now();
        c.select_file(Some("de_mcu_2.log".to_string()), t0);
        c.disconnect(t0);
        c.connect(t0);
        let (_, url) = c.transport().connects().last().cloned().unwrap();
        assert_eq!(
            url,
            "ws://logs.test/ws/logging-tail?token=tok&file=de_mcu_2.log"
        );
    }

    #[test]
    fn test_connect_is_noop_while_connecting_or_connected() {
        let mut c = controller();
        let t0 = Instant::now();
        c.connect(t0);
        c.connect(t0);
        assert_eq!(c.transport().connects().len(), 1);
        assert_eq!(c.status(), ConnectionStatus::Connecting);
        let generation = last_generation(&c);
        c.handle_event(TransportEvent::Opened { generation }, t0);
        c.connect(t0);
        assert_eq!(c.transport().connects().len(), 1);
        assert_eq!(c.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_start_with_file_and_no_socket() {
        let mut c = controller();
        let t0 = Instant::now();
        c.start(t0, Some("de_mcu_1.log".into()), false);
        assert!(c.transport().connects().is_empty());
        assert!(c.is_polling());
        assert!(c.transport().fetches()[0].1.ends_with("file=de_mcu_1.log"));
    }

    #[test]
    fn test_open_clears_stale_rows_and_stops_polling() {
        let mut c = controller();
        let t0 = Instant::now();
        c.start(t0, None, false);
        assert!(c.is_polling());
        respond(&mut c, &format!("[{}]", line("t", "INFO", "old file")), t0);
        assert_eq!(c.table().total(), 1);

        open(&mut c, t0);
        assert!(!c.is_polling());
        assert_eq!(c.table().total(), 0);
    }

    #[test]
    fn test_live_and_polling_never_overlap() {
        let mut c = controller();
        let mut now = Instant::now();
        let step = Duration::from_millis(700);
        let check = |c: &TestController| assert!(!(c.connection().is_live() && c.is_polling()));

        for round in 0..4u64 {
            let generation = open(&mut c, now);
            check(&c);
            c.set_auto_poll(true, now);
            check(&c);
            c.set_poll_interval(1_000 + round * 100, now);
            check(&c);
            now += step;
            c.tick(now);
            check(&c);
            if round % 2 == 0 {
                c.disconnect(now);
            } else {
                c.handle_event(
                    TransportEvent::Closed {
                        generation,
                        reason: Some("reset".into()),
                    },
                    now,
                );
            }
            check(&c);
            assert!(c.is_polling());
            c.set_auto_poll(false, now);
            check(&c);
            c.set_auto_poll(true, now);
            check(&c);
            now += step;
            c.tick(now);
            check(&c);
            if let Some(deadline) = c.reconnect_deadline() {
                c.tick(deadline);
            }
            check(&c);
            c.disconnect(now);
            check(&c);
        }
    }

    #[test]
    fn test_backoff_schedule_and_budget() {
        let mut c = controller();
        let mut now = Instant::now();
        c.connect(now);

        for attempt in 1..=6u32 {
            let generation = last_generation(&c);
            c.handle_event(
                TransportEvent::Closed {
                    generation,
                    reason: Some("refused".into()),
                },
                now,
            );
            let deadline = c.reconnect_deadline().expect("retry scheduled");
            assert_eq!(deadline - now, backoff_delay(attempt));
            assert_eq!(
                backoff_delay(attempt),
                Duration::from_millis((500u64 << attempt).min(30_000))
            );
            now = deadline;
            c.tick(now);
            assert_eq!(c.transport().connects().len(), attempt as usize + 1);
        }

        let generation = last_generation(&c);
        c.handle_event(
            TransportEvent::Closed {
                generation,
                reason: Some("refused".into()),
            },
            now,
        );
        assert!(c.reconnect_deadline().is_none());
        c.tick(now + Duration::from_secs(120));
        assert_eq!(c.transport().connects().len(), 7);
        assert_eq!(c.notice().unwrap().kind, NoticeKind::Error);

        // A manual connect restores the budget.
        c.connect(now);
        assert_eq!(c.connection().reconnect_attempts, 0);
        assert_eq!(c.transport().connects().len(), 8);
    }

    #[test]
    fn test_successful_open_resets_attempts() {
        let mut c = controller();
        let t0 = Instant::now();
        c.connect(t0);
        let generation = last_generation(&c);
        c.handle_event(TransportEvent::Closed { generation, reason: None }, t0);
        assert_eq!(c.connection().reconnect_attempts, 1);
        let deadline = c.reconnect_deadline().unwrap();
        c.tick(deadline);
        let generation = last_generation(&c);
        c.handle_event(TransportEvent::Opened { generation }, deadline);
        assert_eq!(c.connection().reconnect_attempts, 0);
    }

    #[test]
    fn test_failed_reconnects_keep_poll_cadence() {
        let mut c = controller();
        let t0 = Instant::now();
        c.set_poll_interval(5_000, t0);
        let generation = open(&mut c, t0);
        c.handle_event(
            TransportEvent::Closed {
                generation,
                reason: Some("reset".into()),
            },
            t0,
        );
        assert!(c.is_polling());
        let fetched = c.transport().fetches().len();
        let first_poll = t0 + Duration::from_millis(5_000);

        // Retries at 1 s and 3 s, each refused straight away.
        while let Some(deadline) = c.reconnect_deadline().filter(|d| *d < first_poll) {
            c.tick(deadline);
            let generation = last_generation(&c);
            c.handle_event(
                TransportEvent::Closed {
                    generation,
                    reason: Some("refused".into()),
                },
                deadline,
            );
        }
        assert_eq!(c.transport().connects().len(), 3);
        assert_eq!(c.transport().fetches().len(), fetched);

        c.tick(first_poll);
        assert_eq!(c.transport().fetches().len(), fetched + 1);
    }

    #[test]
    fn test_disconnect_suppresses_reconnect_but_polls() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        c.disconnect(t0);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        assert!(c.reconnect_deadline().is_none());
        assert!(c.is_polling());
        assert_eq!(c.transport().closes(), 1);

        // The worker's own close report for that socket changes nothing.
        c.handle_event(TransportEvent::Closed { generation, reason: None }, t0);
        assert!(c.reconnect_deadline().is_none());
    }

    #[test]
    fn test_close_without_auto_flags_stays_idle() {
        let mut c = controller();
        let t0 = Instant::now();
        c.set_auto_poll(false, t0);
        c.set_auto_reconnect(false);
        let generation = open(&mut c, t0);
        c.handle_event(TransportEvent::Closed { generation, reason: None }, t0);
        assert!(!c.is_polling());
        assert!(c.reconnect_deadline().is_none());
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        frame(&mut c, generation, "{not json".into(), t0);
        frame(&mut c, generation, r#"{"type":"heartbeat"}"#.into(), t0);
        frame(&mut c, generation, r#"{"level":"INFO","msg":"untyped"}"#.into(), t0);
        assert_eq!(c.table().total(), 0);
        assert_eq!(c.status(), ConnectionStatus::Connected);
        frame(&mut c, generation, line("t", "INFO", "ok"), t0);
        assert_eq!(c.table().total(), 1);
    }

    #[test]
    fn test_server_notices() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        frame(&mut c, generation, r#"{"type":"info","msg":"Switched to a.log"}"#.into(), t0);
        assert_eq!(c.notice().unwrap().text, "Switched to a.log");
        frame(&mut c, generation, r#"{"type":"error","msg":"Unauthorized"}"#.into(), t0);
        assert_eq!(
            c.notice(),
            Some(&Notice {
                kind: NoticeKind::Error,
                text: "Unauthorized".into()
            })
        );
    }

    #[test]
    fn test_frames_from_abandoned_socket_are_ignored() {
        let mut c = controller();
        let t0 = Instant::now();
        let old = open(&mut c, t0);
        c.disconnect(t0);
        c.connect(t0);
        frame(&mut c, old, line("t", "INFO", "stale"), t0);
        assert_eq!(c.table().total(), 0);
    }

    #[test]
    fn test_pause_suppresses_rendering() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        frame(&mut c, generation, line("t", "INFO", "before"), t0);
        assert!(c.toggle_pause());
        frame(&mut c, generation, line("t", "INFO", "during"), t0);
        assert_eq!(c.table().total(), 1);
        assert_eq!(c.status(), ConnectionStatus::Connected);

        assert!(!c.toggle_pause());
        frame(&mut c, generation, line("t", "INFO", "during"), t0);
        assert_eq!(c.table().total(), 2);
    }

    #[test]
    fn test_poll_snapshot_replaces_rows() {
        let mut c = controller();
        let t0 = Instant::now();
        c.start(t0, None, false);
        let body = format!(
            "[{},{}]",
            line("2024-01-01 10:00:00", "INFO", "older"),
            line("2024-01-01 10:00:01", "INFO", "newer")
        );
        respond(&mut c, &body, t0);
        assert_eq!(messages(&c), vec!["newer", "older"]);

        c.tick(t0 + Duration::from_millis(c.filter().poll_interval_ms));
        respond(&mut c, "[]", t0);
        assert_eq!(c.table().total(), 0);
        assert!(c.table().last_update().is_none());
    }

    #[test]
    fn test_poll_failure_keeps_rows() {
        let mut c = controller();
        let t0 = Instant::now();
        c.start(t0, None, false);
        respond(&mut c, &format!("[{}]", line("t", "INFO", "kept")), t0);
        c.refetch(t0);
        let seq = c.transport().fetches().last().unwrap().0;
        c.handle_event(
            TransportEvent::PollResult {
                seq,
                result: Err("server responded with 500".into()),
            },
            t0,
        );
        assert_eq!(messages(&c), vec!["kept"]);
        assert_eq!(c.notice().unwrap().kind, NoticeKind::Error);
        assert!(c.is_polling());
    }

    #[test]
    fn test_superseded_poll_response_is_discarded() {
        let mut c = controller();
        let t0 = Instant::now();
        c.start(t0, None, false);
        let first = c.transport().fetches()[0].0;
        c.refetch(t0);
        c.handle_event(
            TransportEvent::PollResult {
                seq: first,
                result: Ok(format!("[{}]", line("t", "INFO", "stale"))),
            },
            t0,
        );
        assert_eq!(c.table().total(), 0);
        respond(&mut c, &format!("[{}]", line("t", "INFO", "fresh")), t0);
        assert_eq!(messages(&c), vec!["fresh"]);
    }

    #[test]
    fn test_poll_request_carries_filters() {
        let mut c = controller();
        let t0 = Instant::now();
        c.set_levels(BTreeSet::from([Level::Error, Level::Warning]), t0);
        let (_, url) = c.transport().fetches().last().cloned().unwrap();
        assert_eq!(
            url,
            "http://logs.test/api/de-mcu-tail?lines=200&level=ERROR%2CWARNING"
        );
    }

    #[test]
    fn test_poll_interval_change_restarts_single_timer() {
        let mut c = controller();
        let t0 = Instant::now();
        c.start(t0, None, false);
        let fetched = c.transport().fetches().len();
        let later = t0 + Duration::from_millis(1_000);
        c.set_poll_interval(10_000, later);
        c.tick(t0 + Duration::from_millis(5_000));
        assert_eq!(c.transport().fetches().len(), fetched);
        c.tick(later + Duration::from_millis(10_000));
        assert_eq!(c.transport().fetches().len(), fetched + 1);
        assert_eq!(
            c.prefs.store().get(KEY_POLL_INTERVAL).as_deref(),
            Some("10000")
        );
    }

    #[test]
    fn test_keyword_debounce_coalesces_input() {
        let mut c = controller();
        let t0 = Instant::now();
        c.set_auto_poll(false, t0);
        let step = Duration::from_millis(100);
        c.set_keyword("d", t0);
        c.set_keyword("di", t0 + step);
        c.set_keyword("disk", t0 + step * 2);
        c.tick(t0 + step * 4);
        assert!(c.transport().fetches().is_empty());
        c.tick(t0 + step * 2 + Duration::from_millis(KEYWORD_DEBOUNCE_MS));
        let fetches = c.transport().fetches();
        assert_eq!(fetches.len(), 1);
        assert!(fetches[0].1.contains("keyword=disk"));
        assert_eq!(c.prefs.store().get(KEY_KEYWORD).as_deref(), Some("disk"));
    }

    #[test]
    fn test_header_search_is_local_only() {
        let mut c = controller();
        let t0 = Instant::now();
        c.set_auto_poll(false, t0);
        let generation = open(&mut c, t0);
        frame(&mut c, generation, line("t", "INFO", "pump on"), t0);
        frame(&mut c, generation, line("t", "INFO", "fan on"), t0);
        c.set_header_search("PUMP", t0);
        c.tick(t0 + Duration::from_millis(HEADER_SEARCH_DEBOUNCE_MS));
        assert_eq!(visible_messages(&c), vec!["pump on"]);
        assert!(c.transport().sent().is_empty());
        assert!(c.transport().fetches().is_empty());
    }

    #[test]
    fn test_refetch_over_socket_sends_reload_command() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        frame(&mut c, generation, line("t", "INFO", "x"), t0);
        c.set_tail_lines(50, t0);
        assert_eq!(c.table().total(), 0);
        let sent: Value = serde_json::from_str(&c.transport().sent()[0]).unwrap();
        assert_eq!(sent["cmd"], "reload_tail");
        assert_eq!(sent["lines"], 50);
        assert!(sent.get("keyword").is_none());
        assert!(c.transport().fetches().is_empty());
    }

    #[test]
    fn test_filter_conjunction_end_to_end() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        frame(&mut c, generation, line("2024-01-01 10:00:00", "ERROR", "disk full"), t0);
        frame(&mut c, generation, line("2024-01-01 11:00:00", "INFO", "ok"), t0);
        c.set_levels(BTreeSet::from([Level::Error]), t0);
        // the refetch above cleared the table; replay the server's answer
        frame(&mut c, generation, line("2024-01-01 10:00:00", "ERROR", "disk full"), t0);
        frame(&mut c, generation, line("2024-01-01 11:00:00", "INFO", "ok"), t0);
        c.set_keyword("disk", t0);
        c.apply_filter();
        assert_eq!(visible_messages(&c), vec!["disk full"]);
        assert_eq!(c.table().total(), 2);
        assert_eq!(c.prefs.store().get(KEY_LEVELS).as_deref(), Some(r#"["ERROR"]"#));
    }

    #[test]
    fn test_new_rows_get_full_filter_check() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        c.set_header_search("valve", t0);
        c.filter.start_ts = crate::core::parse_timestamp_ms("2024-01-01 10:00:00");
        frame(&mut c, generation, line("2024-01-01 09:00:00", "INFO", "valve open"), t0);
        frame(&mut c, generation, line("2024-01-01 12:00:00", "INFO", "pump on"), t0);
        frame(&mut c, generation, line("2024-01-01 12:00:00", "INFO", "valve shut"), t0);
        assert_eq!(visible_messages(&c), vec!["valve shut"]);
    }

    #[test]
    fn test_escaping_keeps_raw_record() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        let raw = "<b>temp</b> > 40 & rising";
        frame(&mut c, generation, line("t", "WARNING", raw), t0);
        let row = c.table().iter().next().unwrap();
        assert_eq!(row.record.message, raw);
        assert!(!row.markup.message.contains('<'));
        assert!(!row.markup.message.contains('>'));
    }

    #[test]
    fn test_highlight_reapplication_is_stable() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        frame(&mut c, generation, line("t", "INFO", "Disk <full> disk"), t0);
        c.set_keyword("disk", t0);
        c.apply_filter();
        let first = c.table().iter().next().unwrap().markup.message.clone();
        c.apply_filter();
        let second = c.table().iter().next().unwrap().markup.message.clone();
        assert_eq!(first, second);
        assert_eq!(
            first,
            format!(
                "{o}Disk{c} &lt;full&gt; {o}disk{c}",
                o = HIGHLIGHT_OPEN,
                c = HIGHLIGHT_CLOSE
            )
        );
    }

    #[test]
    fn test_level_sort_and_stability() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        for (level, msg) in [("INFO", "i1"), ("ERROR", "e1"), ("DEBUG", "d1"), ("WARNING", "w1"), ("ERROR", "e2")] {
            frame(&mut c, generation, line("t", level, msg), t0);
        }
        c.sort_table(SortColumn::Level, Some(SortDirection::Descending));
        let once = messages(&c);
        assert_eq!(once, vec!["e2", "e1", "w1", "i1", "d1"]);
        c.sort_table(SortColumn::Level, Some(SortDirection::Descending));
        assert_eq!(messages(&c), once);

        // Toggle without a forced direction flips it.
        c.sort_table(SortColumn::Level, None);
        assert_eq!(c.sort_state().active(), Some((SortColumn::Level, SortDirection::Ascending)));
        assert_eq!(c.sort_state().toggles.len(), 1);

        c.clear_sort();
        assert_eq!(messages(&c), vec!["e2", "w1", "d1", "e1", "i1"]);
    }

    #[test]
    fn test_active_sort_survives_new_rows_and_filtering() {
        let mut c = controller();
        let t0 = Instant::now();
        let generation = open(&mut c, t0);
        c.sort_table(SortColumn::Timestamp, None);
        assert_eq!(c.sort_state().direction, Some(SortDirection::Descending));
        frame(&mut c, generation, line("2024-01-01 10:00:00", "INFO", "ten"), t0);
        frame(&mut c, generation, line("garbage", "INFO", "unknown"), t0);
        frame(&mut c, generation, line("2024-01-01 12:00:00", "INFO", "noon"), t0);
        frame(&mut c, generation, line("2024-01-01 08:00:00", "INFO", "eight"), t0);
        assert_eq!(messages(&c), vec!["noon", "ten", "eight", "unknown"]);
        // Equal keys: the newer row goes first.
        frame(&mut c, generation, line("2024-01-01 10:00:00", "INFO", "ten again"), t0);
        assert_eq!(
            messages(&c),
            vec!["noon", "ten again", "ten", "eight", "unknown"]
        );
        c.set_levels(BTreeSet::from([Level::Info]), t0);
        assert_eq!(c.sort_state().direction, Some(SortDirection::Descending));
    }

    #[test]
    fn test_select_file_resets_feed() {
        let mut c = controller();
        let t0 = Instant::now();
        let old = open(&mut c, t0);
        frame(&mut c, old, line("t", "INFO", "from a"), t0);
        c.select_file(Some("b.log".into()), t0);

        assert_eq!(c.transport().closes(), 1);
        assert_eq!(c.table().total(), 0);
        let fetches = c.transport().fetches();
        assert_eq!(fetches.len(), 1);
        assert!(fetches[0].1.ends_with("file=b.log"));
        let (generation, url) = c.transport().connects().last().cloned().unwrap();
        assert!(url.ends_with("?file=b.log"));
        assert_ne!(generation, old);
        assert_eq!(c.status(), ConnectionStatus::Connecting);

        frame(&mut c, old, line("t", "INFO", "late from a"), t0);
        assert_eq!(c.table().total(), 0);

        c.select_file(Some("b.log".into()), t0);
        assert_eq!(c.transport().connects().len(), 2);
    }

    #[test]
    fn test_apply_edits_commits_everything() {
        let mut c = controller();
        let t0 = Instant::now();
        c.start(t0, None, false);
        let edits = DialogEdits {
            keyword: "pump".into(),
            levels: BTreeSet::from([Level::Warning]),
            start_ts: Some(1),
            end_ts: Some(2),
            tail_lines: 20,
            poll_interval_ms: 9_000,
            auto_poll: false,
        };
        c.apply_edits(edits, t0);
        assert_eq!(c.filter().keyword, "pump");
        assert_eq!(c.filter().tail_lines, 20);
        assert!(!c.filter().auto_poll);
        assert!(!c.is_polling());
        let (_, url) = c.transport().fetches().last().cloned().unwrap();
        assert!(url.contains("lines=20&keyword=pump&level=WARNING&start=1&end=2"));

        let reloaded = Preferences::new(c.prefs.store().clone()).load();
        assert_eq!(reloaded.poll_interval_ms, 9_000);
        assert_eq!(reloaded.keyword, "pump");
        assert!(!reloaded.auto_poll);
    }

    #[test]
    fn test_clear_log_table_unpauses() {
        let mut c = controller();
        c.add_log_entry(LogRecord::new("t", "INFO", "x"));
        c.toggle_pause();
        c.clear_log_table();
        assert!(!c.is_paused());
        assert_eq!(c.table().total(), 0);
    }

    #[test]
    fn test_export_contains_only_visible_rows() {
        let mut c = controller();
        let t0 = Instant::now();
        c.add_log_entry(LogRecord::new("t", "INFO", "pump <on>"));
        c.add_log_entry(LogRecord::new("t", "DEBUG", "noise"));
        c.set_levels(BTreeSet::from([Level::Info]), t0);
        let html = c.export_html();
        assert!(html.contains("pump &lt;on&gt;"));
        assert!(!html.contains("noise"));
    }

    #[test]
    fn test_toggle_expanded() {
        let mut c = controller();
        let id = c.add_log_entry(LogRecord::new("t", "INFO", "x"));
        assert!(c.toggle_expanded(id));
        assert!(c.table().get(id).unwrap().expanded);
    }
}
