use crate::controller::Controller;
use crate::core::{DialogField, FilterDialog, Level, SortColumn};
use crate::input::TextInput;
use crate::prefs::KeyValueStore;
use crate::transport::{Transport, TransportEvent};
use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::{Position, Rect};
use ratatui::widgets::TableState;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    KeywordEdit,
    HeaderSearchEdit,
    FileEdit,
    TokenEdit,
    Dialog,
    Help,
}

impl InputMode {
    pub fn is_modal(self) -> bool {
        matches!(self, InputMode::Dialog | InputMode::Help)
    }
}

pub struct App<T, S> {
    pub controller: Controller<T, S>,
    pub events: Receiver<TransportEvent>,
    pub input_mode: InputMode,
    pub keyword_input: TextInput,
    pub header_input: TextInput,
    pub file_input: TextInput,
    pub token_input: TextInput,
    pub dialog: Option<FilterDialog>,
    pub level_cursor: usize,
    pub dialog_area: Option<Rect>,
    pub table_state: TableState,
    pub status_message: Option<String>,
    pub export_path: PathBuf,
    pub should_quit: bool,
    previous_mode: Option<InputMode>,
}

impl<T: Transport, S: KeyValueStore> App<T, S> {
    pub fn new(
        controller: Controller<T, S>,
        events: Receiver<TransportEvent>,
        export_path: PathBuf,
    ) -> Self {
        let filter = controller.filter();
        let keyword_input = TextInput::new(filter.keyword.clone());
        let header_input = TextInput::new(filter.header_search.clone());
        let file_input = TextInput::new(filter.selected_file.clone().unwrap_or_default());
        let token_input = TextInput::new(controller.token().unwrap_or_default());
        Self {
            controller,
            events,
            input_mode: InputMode::Normal,
            keyword_input,
            header_input,
            file_input,
            token_input,
            dialog: None,
            level_cursor: 0,
            dialog_area: None,
            table_state: TableState::default(),
            status_message: None,
            export_path,
            should_quit: false,
            previous_mode: None,
        }
    }

    pub fn poll_transport(&mut self, now: Instant) {
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle_event(event, now);
        }
        self.controller.tick(now);
        self.clamp_selection();
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key.code, now),
            InputMode::KeywordEdit => {
                if let Some(done) = edit(&mut self.keyword_input, key.code) {
                    if done {
                        self.controller.set_keyword(&self.keyword_input.text, now);
                    } else {
                        self.keyword_input.set(self.controller.filter().keyword.clone());
                    }
                    self.input_mode = InputMode::Normal;
                } else {
                    self.controller.set_keyword(&self.keyword_input.text, now);
                }
            }
            InputMode::HeaderSearchEdit => {
                if edit(&mut self.header_input, key.code).is_some() {
                    self.input_mode = InputMode::Normal;
                }
                self.controller.set_header_search(&self.header_input.text, now);
            }
            InputMode::FileEdit => match edit(&mut self.file_input, key.code) {
                Some(true) => {
                    let file = self.file_input.trimmed().to_string();
                    self.controller.select_file(Some(file), now);
                    self.input_mode = InputMode::Normal;
                }
                Some(false) => {
                    let current = self.controller.filter().selected_file.clone();
                    self.file_input.set(current.unwrap_or_default());
                    self.input_mode = InputMode::Normal;
                }
                None => {}
            },
            InputMode::TokenEdit => match edit(&mut self.token_input, key.code) {
                Some(true) => {
                    let token = self.token_input.trimmed().to_string();
                    self.controller.set_token(Some(token));
                    self.status_message = Some("Token saved, applies on next connect".to_string());
                    self.input_mode = InputMode::Normal;
                }
                Some(false) => {
                    let current = self.controller.token().unwrap_or_default().to_string();
                    self.token_input.set(current);
                    self.input_mode = InputMode::Normal;
                }
                None => {}
            },
            InputMode::Dialog => self.handle_dialog_key(key.code, now),
            InputMode::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Enter) {
                    self.close_modal();
                }
            }
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode, now: Instant) {
        self.status_message = None;
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('c') => self.controller.connect(now),
            KeyCode::Char('x') => self.controller.disconnect(now),
            KeyCode::Char('p') => {
                let paused = self.controller.toggle_pause();
                self.status_message = Some(if paused { "Paused" } else { "Resumed" }.to_string());
            }
            KeyCode::Char('r') => self.controller.refetch(now),
            KeyCode::Char('C') => {
                self.controller.clear_log_table();
                self.status_message = Some("Cleared".to_string());
            }
            KeyCode::Char('1') => self.controller.sort_table(SortColumn::Timestamp, None),
            KeyCode::Char('2') => self.controller.sort_table(SortColumn::Level, None),
            KeyCode::Char('3') => self.controller.sort_table(SortColumn::Message, None),
            KeyCode::Char('0') => self.controller.clear_sort(),
            KeyCode::Char('E') => self.controller.toggle_level(Level::Error, now),
            KeyCode::Char('W') => self.controller.toggle_level(Level::Warning, now),
            KeyCode::Char('I') => self.controller.toggle_level(Level::Info, now),
            KeyCode::Char('D') => self.controller.toggle_level(Level::Debug, now),
            KeyCode::Char('a') => {
                let enabled = !self.controller.filter().auto_poll;
                self.controller.set_auto_poll(enabled, now);
            }
            KeyCode::Char('R') => {
                let enabled = !self.controller.filter().auto_reconnect;
                self.controller.set_auto_reconnect(enabled);
            }
            KeyCode::Char('f') => self.open_dialog(),
            KeyCode::Char('?') => self.open_modal(InputMode::Help),
            KeyCode::Char('/') => self.input_mode = InputMode::HeaderSearchEdit,
            KeyCode::Char('k') => self.input_mode = InputMode::KeywordEdit,
            KeyCode::Char('o') => self.input_mode = InputMode::FileEdit,
            KeyCode::Char('t') => self.input_mode = InputMode::TokenEdit,
            KeyCode::Char('e') => {
                self.status_message = Some(match self.export() {
                    Ok(path) => format!("Exported to {}", path.display()),
                    Err(e) => format!("Export failed: {:#}", e),
                });
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-10),
            KeyCode::PageDown => self.move_selection(10),
            KeyCode::Home => self.table_state.select_first(),
            KeyCode::End => {
                let count = self.controller.table().visible_count();
                self.table_state.select(count.checked_sub(1));
            }
            KeyCode::Enter => {
                if let Some(id) = self.selected_row_id() {
                    self.controller.toggle_expanded(id);
                }
            }
            KeyCode::Esc => self.controller.dismiss_notice(),
            _ => {}
        }
    }

    fn handle_dialog_key(&mut self, code: KeyCode, now: Instant) {
        let Some(dialog) = self.dialog.as_mut() else {
            self.close_modal();
            return;
        };
        match code {
            KeyCode::Esc => {
                self.close_modal();
                return;
            }
            KeyCode::Tab | KeyCode::Down => dialog.next_field(),
            KeyCode::BackTab | KeyCode::Up => dialog.prev_field(),
            KeyCode::Enter => {
                match dialog.validate() {
                    Ok(edits) => {
                        self.controller.apply_edits(edits, now);
                        let filter = self.controller.filter();
                        self.keyword_input.set(filter.keyword.clone());
                        self.close_modal();
                    }
                    Err(e) => dialog.error = Some(e),
                }
                return;
            }
            _ => match dialog.field {
                DialogField::Levels => match code {
                    KeyCode::Left => {
                        self.level_cursor =
                            (self.level_cursor + Level::ALL.len() - 1) % Level::ALL.len();
                    }
                    KeyCode::Right => self.level_cursor = (self.level_cursor + 1) % Level::ALL.len(),
                    KeyCode::Char(' ') => dialog.toggle_level(Level::ALL[self.level_cursor]),
                    _ => {}
                },
                DialogField::AutoPoll => {
                    if code == KeyCode::Char(' ') {
                        dialog.toggle_auto_poll();
                    }
                }
                _ => {
                    if let Some(input) = dialog.active_input_mut() {
                        edit(input, code);
                    }
                }
            },
        }
        dialog.error = None;
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) || !self.input_mode.is_modal() {
            return;
        }
        let clicked = Position::new(mouse.column, mouse.row);
        let inside = self.dialog_area.is_some_and(|area| area.contains(clicked));
        if !inside {
            self.close_modal();
        }
    }

    fn open_dialog(&mut self) {
        self.dialog = Some(FilterDialog::open(self.controller.filter()));
        self.level_cursor = 0;
        self.open_modal(InputMode::Dialog);
    }

    fn open_modal(&mut self, mode: InputMode) {
        if !self.input_mode.is_modal() {
            self.previous_mode = Some(self.input_mode);
        }
        self.input_mode = mode;
    }

    pub fn close_modal(&mut self) {
        self.dialog = None;
        self.dialog_area = None;
        self.input_mode = self.previous_mode.take().unwrap_or(InputMode::Normal);
    }

    pub fn export(&self) -> Result<PathBuf> {
        let html = self.controller.export_html();
        fs::write(&self.export_path, html)
            .with_context(|| format!("writing {}", self.export_path.display()))?;
        info!(path = %self.export_path.display(), rows = self.controller.table().visible_count(), "exported table");
        Ok(self.export_path.clone())
    }

    pub fn selected_row_id(&self) -> Option<u64> {
        let index = self.table_state.selected()?;
        self.controller
            .table()
            .visible_rows()
            .nth(index)
            .map(|row| row.id)
    }

    fn move_selection(&mut self, delta: isize) {
        let count = self.controller.table().visible_count();
        if count == 0 {
            self.table_state.select(None);
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, count as isize - 1);
        self.table_state.select(Some(next as usize));
    }

    fn clamp_selection(&mut self) {
        let count = self.controller.table().visible_count();
        match self.table_state.selected() {
            Some(_) if count == 0 => self.table_state.select(None),
            Some(index) if index >= count => self.table_state.select(Some(count - 1)),
            _ => {}
        }
    }
}

/// Apply an editing key to `input`. Returns `Some(true)` on Enter,
/// `Some(false)` on Escape and `None` while editing continues.
fn edit(input: &mut TextInput, code: KeyCode) -> Option<bool> {
    match code {
        KeyCode::Left => input.move_cursor_left(),
        KeyCode::Right => input.move_cursor_right(),
        KeyCode::Home => input.move_cursor_to_start(),
        KeyCode::End => input.move_cursor_to_end(),
        KeyCode::Char(c) => input.insert_char(c),
        KeyCode::Backspace => input.delete_char_before_cursor(),
        KeyCode::Delete => input.delete_char_at_cursor(),
        KeyCode::Enter => return Some(true),
        KeyCode::Esc => return Some(false),
        _ => {}
    }
    None
}
