use crate::app::{App, InputMode};
use crate::constants::{
    DIALOG_HEIGHT, DIALOG_WIDTH, HELP_POPUP_HEIGHT, HELP_POPUP_WIDTH, INPUT_FIELD_HEIGHT,
    LEVEL_COLUMN_WIDTH, STATUS_BAR_HEIGHT, TIMESTAMP_COLUMN_WIDTH,
};
use crate::core::{DialogField, FilterDialog, Level, LogRow, SortColumn, SortState};
use crate::highlight::{apply_highlights, level_style, message_spans, notice_style, status_style};
use crate::input::TextInput;
use crate::markup::Highlighter;
use crate::prefs::KeyValueStore;
use crate::transport::Transport;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Frame,
};
use unicode_width::UnicodeWidthChar;

pub fn draw<T: Transport, S: KeyValueStore>(frame: &mut Frame, app: &mut App<T, S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(INPUT_FIELD_HEIGHT),
            Constraint::Min(1),
            Constraint::Length(STATUS_BAR_HEIGHT),
        ])
        .split(frame.area());

    let inputs = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(30),
            Constraint::Percentage(25),
            Constraint::Percentage(15),
        ])
        .split(chunks[0]);

    draw_text_input(
        frame,
        &app.keyword_input,
        inputs[0],
        " Keyword (k) ",
        app.input_mode == InputMode::KeywordEdit,
        false,
    );
    draw_text_input(
        frame,
        &app.header_input,
        inputs[1],
        " Search (/) ",
        app.input_mode == InputMode::HeaderSearchEdit,
        false,
    );
    draw_text_input(
        frame,
        &app.file_input,
        inputs[2],
        " File (o) ",
        app.input_mode == InputMode::FileEdit,
        false,
    );
    draw_text_input(
        frame,
        &app.token_input,
        inputs[3],
        " Token (t) ",
        app.input_mode == InputMode::TokenEdit,
        true,
    );
    draw_log_table(frame, app, chunks[1]);
    draw_status_bar(frame, app, chunks[2]);

    app.dialog_area = match app.input_mode {
        InputMode::Dialog => app
            .dialog
            .as_ref()
            .map(|dialog| draw_filter_dialog(frame, dialog, app.level_cursor)),
        InputMode::Help => Some(draw_help_popup(frame)),
        _ => None,
    };
}

fn draw_text_input(
    frame: &mut Frame,
    input: &TextInput,
    area: Rect,
    label: &str,
    is_active: bool,
    masked: bool,
) {
    let style = if is_active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let text = if masked {
        "*".repeat(input.text.chars().count())
    } else {
        input.text.clone()
    };

    let widget = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(label.to_string())
                .border_style(style),
        )
        .style(style);
    frame.render_widget(widget, area);

    if is_active {
        frame.set_cursor_position((area.x + input.cursor as u16 + 1, area.y + 1));
    }
}

fn header_label(sort: &SortState, column: SortColumn) -> String {
    match sort.active() {
        Some((active, direction)) if active == column => {
            format!("{} {}", column.label(), direction.arrow())
        }
        _ => column.label().to_string(),
    }
}

// Width is in display columns; styles carry across line breaks.
fn wrap_segments(segments: Vec<(String, Style)>, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut column = 0;
    for (text, style) in segments {
        let mut pending = String::new();
        for c in text.chars() {
            if c == '\n' {
                if !pending.is_empty() {
                    spans.push(Span::styled(std::mem::take(&mut pending), style));
                }
                lines.push(Line::from(std::mem::take(&mut spans)));
                column = 0;
                continue;
            }
            let w = c.width().unwrap_or(0);
            if width > 0 && column > 0 && column + w > width {
                if !pending.is_empty() {
                    spans.push(Span::styled(std::mem::take(&mut pending), style));
                }
                lines.push(Line::from(std::mem::take(&mut spans)));
                column = 0;
            }
            pending.push(c);
            column += w;
        }
        if !pending.is_empty() {
            spans.push(Span::styled(pending, style));
        }
    }
    lines.push(Line::from(spans));
    lines
}

fn build_row(row: &LogRow, highlighter: &Highlighter, message_width: usize) -> Row<'static> {
    let record = &row.record;
    let message: Text<'static> = if row.expanded {
        wrap_segments(apply_highlights(&record.message, highlighter), message_width).into()
    } else {
        let first = record.message.lines().next().unwrap_or_default();
        Line::from(message_spans(first, highlighter)).into()
    };
    let height = message.height().max(1) as u16;
    Row::new(vec![
        Cell::from(record.timestamp.clone()).style(Style::default().fg(Color::DarkGray)),
        Cell::from(record.level.clone()).style(level_style(&record.level)),
        Cell::from(message),
    ])
    .height(height)
}

fn draw_log_table<T: Transport, S: KeyValueStore>(
    frame: &mut Frame,
    app: &mut App<T, S>,
    area: Rect,
) {
    let controller = &app.controller;
    let table = controller.table();
    let sort = controller.sort_state();
    let highlighter = Highlighter::new(controller.filter().active_keyword());
    let message_width = area
        .width
        .saturating_sub(TIMESTAMP_COLUMN_WIDTH + LEVEL_COLUMN_WIDTH + 4) as usize;

    let header = Row::new(
        SortColumn::ALL
            .iter()
            .map(|column| Cell::from(header_label(sort, *column))),
    )
    .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));

    let rows: Vec<Row> = table
        .visible_rows()
        .map(|row| build_row(row, &highlighter, message_width))
        .collect();

    let source = controller
        .filter()
        .selected_file
        .as_deref()
        .unwrap_or("latest");
    let title = format!(
        " Logs [{}/{}] {} ",
        table.visible_count(),
        table.total(),
        source
    );

    let widget = Table::new(
        rows,
        [
            Constraint::Length(TIMESTAMP_COLUMN_WIDTH),
            Constraint::Length(LEVEL_COLUMN_WIDTH),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(Color::Cyan)),
    )
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    frame.render_stateful_widget(widget, area, &mut app.table_state);
}

fn draw_status_bar<T: Transport, S: KeyValueStore>(frame: &mut Frame, app: &App<T, S>, area: Rect) {
    let controller = &app.controller;
    let filter = controller.filter();
    let mut spans = vec![Span::styled(
        format!(" {} ", controller.status()),
        status_style(controller.status()),
    )];
    if controller.is_paused() {
        spans.push(Span::styled(
            " PAUSED ",
            Style::default().fg(Color::Black).bg(Color::Magenta),
        ));
    }
    if controller.is_polling() {
        spans.push(Span::raw(format!(" polling {}ms", filter.poll_interval_ms)));
    }
    spans.push(Span::raw(format!(
        " | auto-poll:{} reconnect:{}",
        if filter.auto_poll { "on" } else { "off" },
        if filter.auto_reconnect { "on" } else { "off" },
    )));
    if let Some(time) = controller.table().last_update() {
        spans.push(Span::raw(format!(" | last {}", time.format("%H:%M:%S"))));
    }
    spans.push(Span::raw(" | "));

    if let Some(message) = &app.status_message {
        spans.push(Span::raw(message.clone()));
    } else if let Some(notice) = controller.notice() {
        spans.push(Span::styled(notice.text.clone(), notice_style(notice.kind)));
    } else {
        spans.push(Span::raw("q:Quit c:Connect x:Disconnect p:Pause f:Filters ?:Help"));
    }

    let paragraph =
        Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::White).bg(Color::Blue));
    frame.render_widget(paragraph, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn field_line(label: &str, value: String, active: bool) -> Line<'static> {
    let marker = if active { "> " } else { "  " };
    let style = if active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{}{:<14}", marker, label), style),
        Span::raw(value),
    ])
}

fn draw_filter_dialog(frame: &mut Frame, dialog: &FilterDialog, level_cursor: usize) -> Rect {
    let area = centered(frame.area(), DIALOG_WIDTH, DIALOG_HEIGHT);
    let is = |field: DialogField| dialog.field == field;

    let levels: Vec<Span> = Level::ALL
        .iter()
        .enumerate()
        .map(|(i, level)| {
            let mark = if dialog.levels.contains(level) { "x" } else { " " };
            let style = if is(DialogField::Levels) && i == level_cursor {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Span::styled(format!("[{}] {} ", mark, level), style)
        })
        .collect();
    let mut level_line = field_line("Levels", String::new(), is(DialogField::Levels));
    level_line.spans.extend(levels);

    let mut lines = vec![
        field_line("Keyword", dialog.keyword.text.clone(), is(DialogField::Keyword)),
        level_line,
        field_line("Start", dialog.start.text.clone(), is(DialogField::Start)),
        field_line("End", dialog.end.text.clone(), is(DialogField::End)),
        field_line("Lines", dialog.lines.text.clone(), is(DialogField::Lines)),
        field_line(
            "Poll (ms)",
            dialog.poll_interval.text.clone(),
            is(DialogField::PollInterval),
        ),
        field_line(
            "Auto poll",
            if dialog.auto_poll { "[x]" } else { "[ ]" }.to_string(),
            is(DialogField::AutoPoll),
        ),
        Line::from(""),
    ];
    match &dialog.error {
        Some(error) => lines.push(Line::from(Span::styled(
            format!("  {}", error),
            Style::default().fg(Color::Red),
        ))),
        None => lines.push(Line::from(Span::styled(
            "  Tab: next | Space: toggle | Enter: apply | Esc: cancel",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    let popup = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Filters ")
                .border_style(Style::default().fg(Color::Green)),
        )
        .style(Style::default().bg(Color::Black));
    frame.render_widget(Clear, area);
    frame.render_widget(popup, area);
    area
}

fn draw_help_popup(frame: &mut Frame) -> Rect {
    let area = centered(frame.area(), HELP_POPUP_WIDTH, HELP_POPUP_HEIGHT);

    let help_text = vec![
        Line::from("c: connect        x: disconnect"),
        Line::from("p: pause/resume   r: refetch"),
        Line::from("C: clear table    e: export HTML"),
        Line::from("a: auto-poll      R: auto-reconnect"),
        Line::from("f: filter dialog  ?: this help"),
        Line::from("k: keyword        /: search rows"),
        Line::from("o: log file       t: token"),
        Line::from("1/2/3: sort time/level/message"),
        Line::from("0: arrival order  E/W/I/D: level filter"),
        Line::from("Up/Down: select   Enter: expand row"),
        Line::from("Esc: close dialog or dismiss notice"),
        Line::from("q: quit"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .border_style(Style::default().fg(Color::Green)),
        )
        .style(Style::default().bg(Color::Black));

    frame.render_widget(Clear, area);
    frame.render_widget(help, area);
    area
}
