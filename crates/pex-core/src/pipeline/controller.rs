//! The live pipeline: parsed commands mapped onto running stages.
//!
//! Every edit re-parses the whole text, finds the first stage whose command
//! changed and rebuilds from there to the end. Upstream stages keep running.

use std::sync::Arc;

use tracing::debug;

use super::{Stage, StageId};
use crate::shell::{self, Command, ParseError};
use crate::stream::SharedSource;

#[derive(Debug)]
pub struct Pipeline {
    /// Index 0 is the program input; index `i` runs `commands[i - 1]`.
    stages: Vec<Stage>,
    commands: Vec<Command>,
    /// Pipe offsets with an implicit 0 for the boundary before the first command.
    pipes: Vec<usize>,
    focused: usize,
    min_visible: usize,
    max_visible: usize,
    window_size: usize,
}

impl Pipeline {
    /// Creates a pipeline showing only `input`. `window_size` is clamped to at least 1.
    pub fn new(input: Arc<SharedSource>, window_size: usize) -> Self {
        Self {
            stages: vec![Stage::input(input)],
            commands: Vec::new(),
            pipes: vec![0],
            focused: 0,
            min_visible: 0,
            max_visible: 0,
            window_size: window_size.max(1),
        }
    }

    /// Applies edited pipeline `text` with the edit cursor at byte `cursor`.
    ///
    /// Returns the index of the first rebuilt stage, if any. A rejected edit
    /// keeps the running stages and the last good parse; focus and window are
    /// updated either way.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns a [`ParseError`] if `text` does not parse or ends in a bare
    /// command name that is still being typed.
    pub fn edit(&mut self, text: &str, cursor: usize) -> Result<Option<usize>, ParseError> {
        let result = self.apply(text);
        self.refocus(cursor);
        result
    }

    fn apply(&mut self, text: &str) -> Result<Option<usize>, ParseError> {
        let (commands, offsets) = shell::parse(text)?;
        check_bare_command(text, &commands)?;

        self.commands = commands;
        self.pipes = std::iter::once(0).chain(offsets).collect();
        Ok(self.rebuild())
    }

    /// Reconciles `stages` with `commands`, returning the diverge index.
    fn rebuild(&mut self) -> Option<usize> {
        let target = self.commands.len() + 1;
        while self.stages.len() < target {
            self.stages.push(Stage::empty());
        }
        // Dropping a stage cancels it.
        self.stages.truncate(target);

        let diverge = (1..self.stages.len())
            .find(|&i| !self.stages[i].command().same_argv(&self.commands[i - 1]))?;

        debug!(
            diverge,
            stages = self.stages.len(),
            "rebuilding pipeline suffix"
        );
        for i in diverge..self.stages.len() {
            self.stages[i].cancel();
            let upstream = Arc::clone(self.stages[i - 1].source());
            self.stages[i] = Stage::launch(&upstream, self.commands[i - 1].clone());
        }
        Some(diverge)
    }

    /// Focuses the stage whose segment holds `cursor` and slides the window to it.
    fn refocus(&mut self, cursor: usize) {
        let last = self.stages.len() - 1;
        self.focused = self.pipes.partition_point(|&p| p < cursor).min(last);

        let (min_before, max_before) = (self.min_visible, self.max_visible);
        self.max_visible = self.max_visible.min(last);
        if self.focused > self.max_visible {
            self.max_visible = self.focused;
            self.min_visible = self.max_visible.saturating_sub(self.window_size - 1);
        }
        if self.focused < self.min_visible {
            self.min_visible = self.focused;
            self.max_visible = (self.min_visible + self.window_size - 1).min(last);
        }
        self.min_visible = self.min_visible.min(self.max_visible);

        if (min_before, max_before) != (self.min_visible, self.max_visible) {
            debug!(
                focused = self.focused,
                min = self.min_visible,
                max = self.max_visible,
                "window moved"
            );
        }
    }

    /// Where Tab moves the edit cursor: the next pipe, or the end of the text.
    pub fn next_stop(&self, cursor: usize, text_len: usize) -> usize {
        let cur = self.pipes.partition_point(|&p| p < cursor);
        match self.pipes.get(cur) {
            Some(&pipe) if pipe != cursor => pipe,
            Some(_) => self.pipes.get(cur + 1).copied().unwrap_or(text_len),
            None => text_len,
        }
        .min(text_len)
    }

    /// Where Shift-Tab moves the edit cursor: the previous pipe, or the start.
    pub fn prev_stop(&self, cursor: usize) -> usize {
        let cur = self.pipes.partition_point(|&p| p < cursor);
        cur.checked_sub(1).map_or(0, |i| self.pipes[i])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Index of the stage with identity `id`.
    pub fn position(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|s| s.id() == id)
    }

    pub fn focused(&self) -> usize {
        self.focused
    }

    pub fn focused_stage(&self) -> &Stage {
        &self.stages[self.focused]
    }

    pub fn min_visible(&self) -> usize {
        self.min_visible
    }

    pub fn max_visible(&self) -> usize {
        self.max_visible
    }

    /// The stages currently inside the window, paired with their indices.
    pub fn visible(&self) -> impl Iterator<Item = (usize, &Stage)> {
        self.stages
            .iter()
            .enumerate()
            .skip(self.min_visible)
            .take(self.max_visible + 1 - self.min_visible)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Commands of the last successful parse.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Pipe offsets of the last successful parse, starting with the implicit 0.
    pub fn pipe_offsets(&self) -> &[usize] {
        &self.pipes
    }

    /// Cancels every running stage.
    pub fn shutdown(&mut self) {
        for stage in &self.stages {
            stage.cancel();
        }
    }
}

/// Rejects a trailing argument-less command unless it is followed by a space,
/// so partial program names are not launched while being typed.
fn check_bare_command(text: &str, commands: &[Command]) -> Result<(), ParseError> {
    match commands.last() {
        Some(last) if !last.is_empty() && last.args().is_empty() && !text.ends_with(' ') => Err(
            ParseError::new(format!("to execute {:?} without args, press space", last.name())),
        ),
        _ => Ok(()),
    }
}
