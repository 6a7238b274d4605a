//! TUI reducer (update function).
//!
//! All state mutations happen here. The runtime calls `update(app, event)`
//! and executes the returned effects.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};
use tracing::debug;

use crate::effects::UiEffect;
use crate::events::UiEvent;
use crate::render::pane_columns;
use crate::state::AppState;

/// The main reducer function.
///
/// Must be called from within a Tokio runtime: edits may launch stages.
pub fn update(app: &mut AppState, event: UiEvent) -> Vec<UiEffect> {
    let mut effects = match event {
        UiEvent::Tick => vec![],
        UiEvent::Frame { width, height } => {
            if (width, height) != (app.width, app.height) {
                app.set_size(width, height);
            }
            vec![]
        }
        UiEvent::Terminal(term_event) => handle_terminal_event(app, term_event),
        UiEvent::StageRead {
            stage,
            cursor,
            outcome,
        } => {
            match app.panes.iter_mut().find(|p| p.stage() == stage) {
                Some(pane) => pane.finish_read(cursor, outcome),
                None => debug!(%stage, "dropping read for torn-down stage"),
            }
            vec![]
        }
    };
    effects.extend(pump_reads(app));
    effects
}

/// Starts a read for every pane that wants more output and has its cursor.
fn pump_reads(app: &mut AppState) -> Vec<UiEffect> {
    let eof_poll = app.config.eof_poll();
    app.panes
        .iter_mut()
        .filter_map(|pane| {
            pane.begin_read(eof_poll)
                .map(|(cursor, delay)| UiEffect::ReadStage {
                    stage: pane.stage(),
                    cursor,
                    delay,
                })
        })
        .collect()
}

fn handle_terminal_event(app: &mut AppState, event: Event) -> Vec<UiEffect> {
    match event {
        Event::Key(key) => handle_key(app, key),
        Event::Paste(text) => {
            app.prompt.insert_str(&text);
            app.apply_edit();
            vec![]
        }
        Event::Mouse(mouse) if app.config.mouse_wheel => {
            let delta = usize::from(app.config.mouse_wheel_delta);
            if let Some(pane) = pane_at_column(app, mouse.column) {
                match mouse.kind {
                    MouseEventKind::ScrollUp => app.panes[pane].line_up(delta),
                    MouseEventKind::ScrollDown => app.panes[pane].line_down(delta),
                    _ => {}
                }
            }
            vec![]
        }
        _ => vec![],
    }
}

fn handle_key(app: &mut AppState, key: KeyEvent) -> Vec<UiEffect> {
    if matches!(key.kind, KeyEventKind::Release) {
        return vec![];
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => return vec![UiEffect::Quit],
        KeyCode::Char('c') if ctrl => return vec![UiEffect::Quit],
        KeyCode::Tab => {
            let stop = app
                .pipeline
                .next_stop(app.prompt.cursor(), app.prompt.text().len());
            move_cursor(app, stop);
        }
        KeyCode::BackTab => {
            let stop = app.pipeline.prev_stop(app.prompt.cursor());
            move_cursor(app, stop);
        }
        KeyCode::PageUp => with_focused(app, |pane| pane.page_up()),
        KeyCode::PageDown => with_focused(app, |pane| pane.page_down()),
        KeyCode::Up => with_focused(app, |pane| pane.line_up(1)),
        KeyCode::Down => with_focused(app, |pane| pane.line_down(1)),
        KeyCode::Home if ctrl => with_focused(app, |pane| pane.top()),
        KeyCode::End if ctrl => with_focused(app, |pane| pane.bottom()),
        _ => {
            let before = app.prompt.clone();
            if app.prompt.input(key) && app.prompt != before {
                app.apply_edit();
            }
        }
    }
    vec![]
}

fn move_cursor(app: &mut AppState, pos: usize) {
    if pos != app.prompt.cursor() {
        app.prompt.set_cursor(pos);
        app.apply_edit();
    }
}

fn with_focused(app: &mut AppState, f: impl FnOnce(&mut crate::pane::Pane)) {
    if let Some(pane) = app.focused_pane_mut() {
        f(pane);
    }
}

/// Index of the visible stage drawn under terminal `column`.
fn pane_at_column(app: &AppState, column: u16) -> Option<usize> {
    let pipeline = &app.pipeline;
    let visible = pipeline.max_visible() + 1 - pipeline.min_visible();
    pane_columns(app.width, visible)
        .into_iter()
        .position(|(x, w)| column >= x && column < x + w)
        .map(|offset| pipeline.min_visible() + offset)
}

#[cfg(test)]
mod tests {
    use crossterm::event::{MouseEvent, MouseEventKind};
    use pex_core::config::Config;
    use pex_core::stream::SharedSource;

    use super::*;

    /// 50 input rows in a 90x14 terminal, so panes show 10 rows.
    async fn app() -> AppState {
        let text: String = (0..50).map(|i| format!("row {i}\n")).collect();
        let mut app = AppState::new(Config::default(), SharedSource::from_text(text));
        let effects = update(
            &mut app,
            UiEvent::Frame {
                width: 90,
                height: 14,
            },
        );
        settle(&mut app, effects).await;
        app
    }

    fn key(app: &mut AppState, code: KeyCode, modifiers: KeyModifiers) -> Vec<UiEffect> {
        update(
            app,
            UiEvent::Terminal(Event::Key(KeyEvent::new(code, modifiers))),
        )
    }

    fn type_text(app: &mut AppState, text: &str) -> Vec<UiEffect> {
        text.chars()
            .flat_map(|ch| key(app, KeyCode::Char(ch), KeyModifiers::NONE))
            .collect()
    }

    /// Runs requested reads inline until no pane wants more.
    async fn settle(app: &mut AppState, mut effects: Vec<UiEffect>) {
        while let Some(effect) = effects.pop() {
            if let UiEffect::ReadStage {
                stage, mut cursor, ..
            } = effect
            {
                let mut buf = vec![0u8; pex_core::stream::PAGE_SIZE];
                let outcome = match cursor.read(&mut buf).await {
                    Ok(0) => crate::events::ReadOutcome::Eof,
                    Ok(n) => crate::events::ReadOutcome::Data(n),
                    Err(e) => crate::events::ReadOutcome::Failed(e.to_string()),
                };
                effects.extend(update(
                    app,
                    UiEvent::StageRead {
                        stage,
                        cursor,
                        outcome,
                    },
                ));
            }
        }
    }

    #[tokio::test]
    async fn test_frame_sizes_panes_and_starts_reading() {
        let mut app = AppState::new(Config::default(), SharedSource::from_text("a\n"));
        let effects = update(
            &mut app,
            UiEvent::Frame {
                width: 80,
                height: 10,
            },
        );
        assert_eq!(app.panes[0].height(), 6);
        assert!(matches!(
            effects.as_slice(),
            [UiEffect::ReadStage { .. }]
        ));
        assert!(app.panes[0].is_reading());
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let mut app = app().await;
        assert!(matches!(
            key(&mut app, KeyCode::Esc, KeyModifiers::NONE).as_slice(),
            [UiEffect::Quit]
        ));
        assert!(matches!(
            key(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL).as_slice(),
            [UiEffect::Quit]
        ));
    }

    #[tokio::test]
    async fn test_typing_builds_pipeline_and_reports_errors() {
        let mut app = app().await;
        type_text(&mut app, "gre");
        assert_eq!(
            app.error.as_deref(),
            Some(r#"to execute "gre" without args, press space"#)
        );
        assert_eq!(app.pipeline.stages().len(), 1);

        type_text(&mut app, "p row");
        assert_eq!(app.error, None);
        assert_eq!(app.pipeline.stages().len(), 2);
        assert_eq!(app.panes.len(), 2);
        assert_eq!(app.panes[1].stage(), app.pipeline.stages()[1].id());
    }

    #[tokio::test]
    async fn test_surviving_panes_keep_scroll_position() {
        let mut app = app().await;
        key(&mut app, KeyCode::Down, KeyModifiers::NONE);
        key(&mut app, KeyCode::Down, KeyModifiers::NONE);
        assert_eq!(app.panes[0].top_line(), 2);

        type_text(&mut app, "cat -n");
        assert_eq!(app.panes.len(), 2);
        assert_eq!(app.panes[0].top_line(), 2);
        assert_eq!(app.panes[1].top_line(), 0);
    }

    #[tokio::test]
    async fn test_stale_reads_are_dropped() {
        let mut app = app().await;
        let effects = type_text(&mut app, "cat -n ");
        let current = app.panes[1].stage();
        let (stage, cursor) = effects
            .into_iter()
            .find_map(|e| match e {
                UiEffect::ReadStage { stage, cursor, .. } if stage == current => {
                    Some((stage, cursor))
                }
                _ => None,
            })
            .expect("read for the cat pane");

        type_text(&mut app, "-b");
        assert_ne!(app.panes[1].stage(), stage);

        update(
            &mut app,
            UiEvent::StageRead {
                stage,
                cursor,
                outcome: crate::events::ReadOutcome::Data(4),
            },
        );
        assert!(app.panes.iter().all(|p| p.stage() != stage));
    }

    #[tokio::test]
    async fn test_tab_moves_between_segments_and_focus() {
        let mut app = app().await;
        type_text(&mut app, "cat -n | tr a b ");
        assert_eq!(app.pipeline.focused(), 2);

        key(&mut app, KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(app.prompt.cursor(), 7);
        assert_eq!(app.pipeline.focused(), 1);

        key(&mut app, KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(app.prompt.cursor(), 0);
        assert_eq!(app.pipeline.focused(), 0);

        key(&mut app, KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(app.prompt.cursor(), 7);
        key(&mut app, KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(app.prompt.cursor(), app.prompt.text().len());
        assert_eq!(app.pipeline.focused(), 2);
    }

    #[tokio::test]
    async fn test_paste_flattens_and_applies() {
        let mut app = app().await;
        update(
            &mut app,
            UiEvent::Terminal(Event::Paste("cat -n\n| tr a b".to_string())),
        );
        assert_eq!(app.prompt.text(), "cat -n | tr a b");
        assert_eq!(app.pipeline.stages().len(), 3);
    }

    #[tokio::test]
    async fn test_focused_pane_scroll_keys() {
        let mut app = app().await;
        key(&mut app, KeyCode::PageDown, KeyModifiers::NONE);
        assert_eq!(app.panes[0].top_line(), 10);

        key(&mut app, KeyCode::End, KeyModifiers::CONTROL);
        assert_eq!(app.panes[0].top_line(), 40);

        key(&mut app, KeyCode::PageUp, KeyModifiers::NONE);
        assert_eq!(app.panes[0].top_line(), 30);

        key(&mut app, KeyCode::Home, KeyModifiers::CONTROL);
        assert_eq!(app.panes[0].top_line(), 0);
        assert_eq!(app.prompt.text(), "");
    }

    #[tokio::test]
    async fn test_mouse_wheel_scrolls_pane_under_pointer() {
        let mut app = app().await;
        app.config.mouse_wheel = true;
        let mut effects = type_text(&mut app, "cat -n ");
        effects.extend(key(&mut app, KeyCode::Home, KeyModifiers::NONE));
        assert_eq!(app.pipeline.focused(), 0);
        assert_eq!((app.pipeline.min_visible(), app.pipeline.max_visible()), (0, 1));
        settle(&mut app, effects).await;

        let wheel = |column| {
            UiEvent::Terminal(Event::Mouse(MouseEvent {
                kind: MouseEventKind::ScrollDown,
                column,
                row: 3,
                modifiers: KeyModifiers::NONE,
            }))
        };
        update(&mut app, wheel(80));
        assert_eq!(app.panes[0].top_line(), 0);
        assert_eq!(app.panes[1].top_line(), 3);

        update(&mut app, wheel(5));
        assert_eq!(app.panes[0].top_line(), 3);
    }

    #[tokio::test]
    async fn test_mouse_ignored_when_disabled() {
        let mut app = app().await;
        update(
            &mut app,
            UiEvent::Terminal(Event::Mouse(MouseEvent {
                kind: MouseEventKind::ScrollDown,
                column: 1,
                row: 1,
                modifiers: KeyModifiers::NONE,
            })),
        );
        assert_eq!(app.panes[0].top_line(), 0);
    }
}
