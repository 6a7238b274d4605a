//! Pure view/render functions for the TUI.
//!
//! Functions here take `&AppState`, draw to a ratatui `Frame`, and never
//! mutate state or return effects.

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Paragraph};
use unicode_width::UnicodeWidthChar;

use crate::state::AppState;

const PROMPT: &str = "| ";

const HELP: &str = "tab next • shift+tab prev • esc quit";

const TAB_WIDTH: usize = 8;

const FOCUSED_BORDER: Color = Color::Rgb(0x99, 0x99, 0x99);
const BLURRED_BORDER: Color = Color::Rgb(0x33, 0x33, 0x33);

/// Renders the entire TUI to the frame.
pub fn render(app: &AppState, frame: &mut Frame) {
    let [panes_area, prompt_area, status_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_panes(app, frame, panes_area);
    render_prompt(app, frame, prompt_area);
    render_status(app, frame, status_area);
}

/// Horizontal `(x, width)` of `count` side-by-side panes across `width`
/// columns. Leftover columns go to the rightmost panes.
pub fn pane_columns(width: u16, count: usize) -> Vec<(u16, u16)> {
    let count = count.max(1) as u16;
    let per = width / count;
    let extra = width % count;
    let mut x = 0;
    (0..count)
        .map(|i| {
            let w = if i >= count - extra { per + 1 } else { per };
            let column = (x, w);
            x += w;
            column
        })
        .collect()
}

fn render_panes(app: &AppState, frame: &mut Frame, area: Rect) {
    let pipeline = &app.pipeline;
    let visible = pipeline.max_visible() + 1 - pipeline.min_visible();
    let columns = pane_columns(area.width, visible);

    for ((x, width), (index, stage)) in columns.into_iter().zip(pipeline.visible()) {
        let Some(pane) = app.panes.get(index) else {
            continue;
        };
        let rect = Rect::new(area.x + x, area.y, width, area.height);

        let border = if index == pipeline.focused() {
            FOCUSED_BORDER
        } else {
            BLURRED_BORDER
        };
        let title = if index == 0 {
            "input".to_string()
        } else {
            stage.command().raw.trim().to_string()
        };
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(Line::from(title));

        let content_style = if stage.is_failed() {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        let mut lines: Vec<Line> = pane
            .visible_lines()
            .iter()
            .map(|l| Line::styled(expand_tabs(l), content_style))
            .collect();
        if let Some(error) = pane.error() {
            lines.push(Line::styled(
                format!("read error: {error}"),
                Style::default()
                    .fg(Color::Red)
                    .add_modifier(Modifier::ITALIC),
            ));
        }

        frame.render_widget(Paragraph::new(lines).block(block), rect);
    }
}

fn render_prompt(app: &AppState, frame: &mut Frame, area: Rect) {
    let [marker_area, text_area] =
        Layout::horizontal([Constraint::Length(PROMPT.len() as u16), Constraint::Min(1)])
            .areas(area);

    let column = app.prompt.cursor_column() as u16;
    let scroll = column.saturating_sub(text_area.width.saturating_sub(1));

    frame.render_widget(Paragraph::new(PROMPT), marker_area);
    frame.render_widget(
        Paragraph::new(app.prompt.text()).scroll((0, scroll)),
        text_area,
    );
    frame.set_cursor_position((text_area.x + column - scroll, text_area.y));
}

fn render_status(app: &AppState, frame: &mut Frame, area: Rect) {
    let line = match &app.error {
        Some(error) => Line::from(Span::styled(
            error.as_str(),
            Style::default().add_modifier(Modifier::ITALIC),
        )),
        None => Line::from(Span::styled(HELP, Style::default().fg(Color::DarkGray))),
    };
    frame.render_widget(Paragraph::new(line), area);
}

/// Replaces tabs with spaces up to the next tab stop.
fn expand_tabs(line: &str) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + TAB_WIDTH);
    let mut column = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let n = TAB_WIDTH - column % TAB_WIDTH;
            out.extend(std::iter::repeat_n(' ', n));
            column += n;
        } else {
            out.push(ch);
            column += ch.width().unwrap_or(0);
        }
    }
    out
}
