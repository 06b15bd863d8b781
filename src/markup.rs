use crate::core::{Level, LogRecord, LogRow};
use regex::{Regex, RegexBuilder};
use std::fmt::Write;

pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Highlighter {
    keyword: String,
    regex: Option<Regex>,
}

impl Highlighter {
    pub fn new(keyword: &str) -> Self {
        let regex = if keyword.is_empty() {
            None
        } else {
            RegexBuilder::new(&regex::escape(keyword))
                .case_insensitive(true)
                .build()
                .ok()
        };
        Self {
            keyword: keyword.to_string(),
            regex,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Byte ranges of every keyword occurrence in `text`.
    pub fn ranges(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => Vec::new(),
        }
    }

    pub fn message_html(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 16);
        let mut pos = 0;
        for (start, end) in self.ranges(text) {
            out.push_str(&escape_html(&text[pos..start]));
            out.push_str(HIGHLIGHT_OPEN);
            out.push_str(&escape_html(&text[start..end]));
            out.push_str(HIGHLIGHT_CLOSE);
            pos = end;
        }
        out.push_str(&escape_html(&text[pos..]));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelBadge {
    Error,
    Warning,
    Normal,
}

impl LevelBadge {
    pub fn for_level(level: &str) -> Self {
        match Level::parse(level) {
            Some(Level::Error) => LevelBadge::Error,
            Some(Level::Warning) => LevelBadge::Warning,
            _ => LevelBadge::Normal,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            LevelBadge::Error => "badge badge-error",
            LevelBadge::Warning => "badge badge-warning",
            LevelBadge::Normal => "badge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMarkup {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub badge: LevelBadge,
}

impl RowMarkup {
    pub fn render(record: &LogRecord, highlighter: Option<&Highlighter>) -> Self {
        let message = match highlighter {
            Some(h) => h.message_html(&record.message),
            None => escape_html(&record.message),
        };
        Self {
            timestamp: escape_html(&record.timestamp),
            level: escape_html(&record.level),
            message,
            badge: LevelBadge::for_level(&record.level),
        }
    }
}

pub fn row_html(row: &LogRow) -> String {
    let mut classes = Vec::new();
    if !row.visible {
        classes.push("hidden");
    }
    if row.expanded {
        classes.push("expanded");
    }
    format!(
        "<tr data-id=\"{}\" class=\"{}\"><td class=\"ts\">{}</td><td><span class=\"{}\">{}</span></td><td class=\"msg\">{}</td></tr>",
        row.id,
        classes.join(" "),
        row.markup.timestamp,
        row.markup.badge.css_class(),
        row.markup.level,
        row.markup.message,
    )
}

pub fn table_html<'a>(title: &str, rows: impl IntoIterator<Item = &'a LogRow>) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\" />\n");
    let _ = writeln!(out, "<title>{}</title>", escape_html(title));
    out.push_str(
        "<style>\ntable{width:100%;border-collapse:collapse;font-family:monospace}\n\
         td{padding:.3rem;vertical-align:top;border-bottom:1px solid #eee}\n\
         .hidden{display:none}\n.badge{padding:0 .4rem;border-radius:.3rem;background:#e5e7eb}\n\
         .badge-error{background:#fecaca}\n.badge-warning{background:#fed7aa}\n\
         .msg{white-space:pre-wrap}\nmark{background:#fde047}\n</style>\n</head>\n<body>\n",
    );
    out.push_str("<table>\n<thead><tr><th>Time</th><th>Level</th><th>Message</th></tr></thead>\n<tbody>\n");
    for row in rows {
        out.push_str(&row_html(row));
        out.push('\n');
    }
    out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    out
}
