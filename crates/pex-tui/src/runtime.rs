//! TUI runtime - owns terminal, runs event loop, executes effects.
//!
//! This is the "Elm runtime" boundary: all side effects happen here.
//! The reducer stays pure and produces effects; this module executes them.
//!
//! Spawned stage reads send their results to the inbox, which the loop
//! drains every iteration.

use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event;
use pex_core::config::Config;
use pex_core::pipeline::StageId;
use pex_core::stream::{PAGE_SIZE, SharedSource, StageCursor};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc;

use crate::effects::UiEffect;
use crate::events::{ReadOutcome, UiEvent};
use crate::state::AppState;
use crate::{render, terminal, update};

/// Target frame rate while output is streaming or the user is typing.
pub const FRAME_DURATION: Duration = Duration::from_millis(16);

/// Poll duration when idle.
pub const IDLE_POLL_DURATION: Duration = Duration::from_millis(100);

/// Full-screen TUI runtime.
///
/// Owns the terminal and state. Terminal state is restored on drop.
pub struct TuiRuntime {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    pub state: AppState,
    inbox_tx: mpsc::UnboundedSender<UiEvent>,
    inbox_rx: mpsc::UnboundedReceiver<UiEvent>,
    last_tick: Instant,
    last_terminal_event: Instant,
}

impl TuiRuntime {
    /// Enters the alternate screen and builds the initial state.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be set up.
    pub fn new(config: Config, input: Arc<SharedSource>) -> Result<Self> {
        // Before entering the alternate screen.
        terminal::install_panic_hook();

        let terminal = terminal::setup_terminal().context("Failed to setup terminal")?;
        let state = AppState::new(config, input);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let now = Instant::now();
        Ok(Self {
            terminal,
            state,
            inbox_tx,
            inbox_rx,
            last_tick: now,
            last_terminal_event: now,
        })
    }

    /// Runs the main event loop until the user quits.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if terminal I/O fails.
    pub fn run(&mut self) -> Result<()> {
        terminal::enable_input_features(self.state.config.mouse_wheel)?;
        let result = self.event_loop();
        self.state.pipeline.shutdown();
        result
    }

    fn event_loop(&mut self) -> Result<()> {
        let mut dirty = true;

        while !self.state.should_quit {
            let mut events = self.collect_events()?;

            // Layout updates happen before other events.
            let size = self.terminal.size()?;
            events.insert(
                0,
                UiEvent::Frame {
                    width: size.width,
                    height: size.height,
                },
            );

            for event in events {
                if matches!(&event, UiEvent::Terminal(_)) {
                    self.last_terminal_event = Instant::now();
                }
                // Only Tick triggers render, capping the frame rate.
                if matches!(&event, UiEvent::Tick) {
                    dirty = true;
                }
                let effects = update::update(&mut self.state, event);
                self.execute_effects(effects);
            }

            if dirty {
                self.terminal.draw(|frame| render::render(&self.state, frame))?;
                dirty = false;
            }
        }

        Ok(())
    }

    fn collect_events(&mut self) -> Result<Vec<UiEvent>> {
        let mut events = Vec::new();

        let recent_terminal_activity = self.last_terminal_event.elapsed() < IDLE_POLL_DURATION;
        let streaming = self.state.panes.iter().any(crate::pane::Pane::is_reading);
        let tick_interval = if streaming || recent_terminal_activity {
            FRAME_DURATION
        } else {
            IDLE_POLL_DURATION
        };

        while let Ok(ev) = self.inbox_rx.try_recv() {
            events.push(ev);
        }

        let poll_duration = if events.is_empty() {
            tick_interval.saturating_sub(self.last_tick.elapsed())
        } else {
            Duration::ZERO
        };

        if event::poll(poll_duration)? {
            events.push(UiEvent::Terminal(event::read()?));
            while event::poll(Duration::ZERO)? {
                events.push(UiEvent::Terminal(event::read()?));
            }
        }

        if self.last_tick.elapsed() >= tick_interval {
            events.push(UiEvent::Tick);
            self.last_tick = Instant::now();
        }

        Ok(events)
    }

    fn execute_effects(&mut self, effects: Vec<UiEffect>) {
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: UiEffect) {
        match effect {
            UiEffect::Quit => {
                self.state.should_quit = true;
            }
            UiEffect::ReadStage {
                stage,
                cursor,
                delay,
            } => {
                let tx = self.inbox_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(read_stage(stage, cursor, delay).await);
                });
            }
        }
    }
}

/// Reads one page from a stage and packages the result for the inbox.
async fn read_stage(stage: StageId, mut cursor: StageCursor, delay: Duration) -> UiEvent {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let mut buf = vec![0u8; PAGE_SIZE];
    let outcome = match cursor.read(&mut buf).await {
        Ok(0) => ReadOutcome::Eof,
        Ok(n) => ReadOutcome::Data(n),
        Err(e) => ReadOutcome::Failed(e.to_string()),
    };
    UiEvent::StageRead {
        stage,
        cursor,
        outcome,
    }
}

impl Drop for TuiRuntime {
    fn drop(&mut self) {
        let _ = terminal::restore_terminal();
    }
}
