//! Scrollable view of one stage's output.
//!
//! A pane owns a private cursor into its stage's source and asks for more
//! bytes only while its visible region has room. The cursor leaves the pane
//! while a read is in flight and comes back with the result.

use std::sync::Arc;
use std::time::Duration;

use pex_core::pipeline::{Stage, StageId};
use pex_core::stream::{SharedSource, StageCursor};
use tracing::debug;

use crate::events::ReadOutcome;

#[derive(Debug)]
pub struct Pane {
    stage: StageId,
    source: Arc<SharedSource>,
    /// `None` while a read is in flight.
    cursor: Option<StageCursor>,
    /// First line shown. May pass the last line, but one line stays visible.
    top_line: usize,
    /// Content rows, excluding borders.
    height: usize,
    /// The last read saw end of output. Cleared when scrolling down.
    at_eof: bool,
    /// The next read follows an end of output and should be delayed.
    after_eof: bool,
    error: Option<String>,
}

impl Pane {
    pub fn new(stage: &Stage) -> Self {
        Self {
            stage: stage.id(),
            source: Arc::clone(stage.source()),
            cursor: Some(stage.cursor()),
            top_line: 0,
            height: 0,
            at_eof: false,
            after_eof: false,
            error: None,
        }
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn top_line(&self) -> usize {
        self.top_line
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
    }

    /// The read error that stopped this pane, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_reading(&self) -> bool {
        self.cursor.is_none()
    }

    fn n_lines(&self) -> usize {
        self.source.buffer().n_lines()
    }

    /// Number of buffered lines inside the viewport.
    pub fn visible_line_count(&self) -> usize {
        self.n_lines().saturating_sub(self.top_line).min(self.height)
    }

    pub fn visible_lines(&self) -> Vec<String> {
        self.source.buffer().lines(self.top_line, self.height)
    }

    /// True while the viewport has room and the stream may have more.
    pub fn should_read_more(&self) -> bool {
        self.visible_line_count() < self.height && !self.at_eof && self.error.is_none()
    }

    /// Takes the cursor for a read if one is wanted, with the delay to wait first.
    pub fn begin_read(&mut self, eof_poll: Duration) -> Option<(StageCursor, Duration)> {
        if !self.should_read_more() {
            return None;
        }
        let cursor = self.cursor.take()?;
        let delay = if self.after_eof {
            eof_poll
        } else {
            Duration::ZERO
        };
        Some((cursor, delay))
    }

    /// Returns the cursor after a read and records its outcome.
    pub fn finish_read(&mut self, cursor: StageCursor, outcome: ReadOutcome) {
        self.cursor = Some(cursor);
        match outcome {
            ReadOutcome::Data(_) => self.after_eof = false,
            ReadOutcome::Eof => {
                self.at_eof = true;
                self.after_eof = true;
            }
            ReadOutcome::Failed(message) => {
                debug!(stage = %self.stage, error = %message, "pane read failed");
                self.error = Some(message);
            }
        }
    }

    pub fn line_up(&mut self, n: usize) {
        self.top_line = self.top_line.saturating_sub(n);
    }

    pub fn line_down(&mut self, n: usize) {
        let last = self.n_lines().saturating_sub(1);
        self.top_line = self.top_line.saturating_add(n).min(last).max(self.top_line);
        self.rearm();
    }

    pub fn page_up(&mut self) {
        self.line_up(self.height.max(1));
    }

    pub fn page_down(&mut self) {
        self.line_down(self.height.max(1));
    }

    pub fn top(&mut self) {
        self.top_line = 0;
    }

    /// Shows the last full page of buffered output.
    pub fn bottom(&mut self) {
        self.top_line = self.n_lines().saturating_sub(self.height);
        self.rearm();
    }

    /// Lets a pane that saw end of output poll again.
    fn rearm(&mut self) {
        self.at_eof = false;
    }
}
