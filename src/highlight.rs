use crate::controller::NoticeKind;
use crate::core::ConnectionStatus;
use crate::markup::{Highlighter, LevelBadge};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

pub fn keyword_style() -> Style {
    Style::default()
        .bg(Color::Yellow)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

pub fn level_style(level: &str) -> Style {
    match LevelBadge::for_level(level) {
        LevelBadge::Error => Style::default()
            .fg(Color::Red)
            .add_modifier(Modifier::BOLD),
        LevelBadge::Warning => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        LevelBadge::Normal => match level {
            "INFO" => Style::default().fg(Color::Green),
            "DEBUG" => Style::default().fg(Color::Cyan),
            _ => Style::default(),
        },
    }
}

pub fn status_style(status: ConnectionStatus) -> Style {
    match status {
        ConnectionStatus::Connected => Style::default().fg(Color::Black).bg(Color::Green),
        ConnectionStatus::Connecting => Style::default().fg(Color::Black).bg(Color::Yellow),
        ConnectionStatus::Disconnected => Style::default().fg(Color::White).bg(Color::Red),
    }
}

pub fn notice_style(kind: NoticeKind) -> Style {
    match kind {
        NoticeKind::Info => Style::default().fg(Color::White).bg(Color::Blue),
        NoticeKind::Error => Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD),
    }
}

pub fn apply_highlights(text: &str, highlighter: &Highlighter) -> Vec<(String, Style)> {
    let mut result = Vec::new();
    let mut pos = 0;
    for (start, end) in highlighter.ranges(text) {
        if start > pos {
            result.push((text[pos..start].to_string(), Style::default()));
        }
        result.push((text[start..end].to_string(), keyword_style()));
        pos = end;
    }
    if pos < text.len() || result.is_empty() {
        result.push((text[pos..].to_string(), Style::default()));
    }
    result
}

pub fn message_spans(text: &str, highlighter: &Highlighter) -> Vec<Span<'static>> {
    apply_highlights(text, highlighter)
        .into_iter()
        .map(|(segment, style)| Span::styled(segment, style))
        .collect()
}
