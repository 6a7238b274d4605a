//! Application state.
//!
//! ```text
//! AppState
//! ├── pipeline: Pipeline   (stages, focus, visible window)
//! ├── prompt: Prompt       (pipeline text being edited)
//! ├── panes: Vec<Pane>     (one per stage, same order)
//! └── error: Option<String> (rejected edit, shown instead of help)
//! ```

use std::sync::Arc;

use pex_core::config::Config;
use pex_core::pipeline::Pipeline;
use pex_core::stream::SharedSource;

use crate::pane::Pane;
use crate::prompt::Prompt;

/// Rows below the panes: prompt line and help/error line.
pub const BOTTOM_AREA_HEIGHT: u16 = 2;

/// Rows a pane border takes from its content.
pub const PANE_BORDER_HEIGHT: u16 = 2;

pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
    pub prompt: Prompt,
    pub panes: Vec<Pane>,
    pub error: Option<String>,
    pub should_quit: bool,
    pub width: u16,
    pub height: u16,
}

impl AppState {
    pub fn new(config: Config, input: Arc<SharedSource>) -> Self {
        let pipeline = Pipeline::new(input, config.max_panes);
        let mut state = Self {
            config,
            pipeline,
            prompt: Prompt::default(),
            panes: Vec::new(),
            error: None,
            should_quit: false,
            width: 0,
            height: 0,
        };
        state.sync_panes();
        state
    }

    /// Re-runs the pipeline against the current prompt text and cursor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn apply_edit(&mut self) {
        self.error = self
            .pipeline
            .edit(self.prompt.text(), self.prompt.cursor())
            .err()
            .map(|e| e.to_string());
        self.sync_panes();
    }

    /// Keeps one pane per stage. Panes of surviving stages keep their scroll
    /// position; panes of torn-down stages are dropped with their cursors.
    pub fn sync_panes(&mut self) {
        let mut old = std::mem::take(&mut self.panes);
        let height = self.pane_height();
        self.panes = self
            .pipeline
            .stages()
            .iter()
            .map(|stage| {
                old.iter()
                    .position(|p| p.stage() == stage.id())
                    .map(|i| old.swap_remove(i))
                    .unwrap_or_else(|| {
                        let mut pane = Pane::new(stage);
                        pane.set_height(height);
                        pane
                    })
            })
            .collect();
    }

    /// Content rows available to each pane.
    pub fn pane_height(&self) -> usize {
        self.height
            .saturating_sub(BOTTOM_AREA_HEIGHT + PANE_BORDER_HEIGHT)
            .into()
    }

    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        let pane_height = self.pane_height();
        for pane in &mut self.panes {
            pane.set_height(pane_height);
        }
    }

    pub fn focused_pane_mut(&mut self) -> Option<&mut Pane> {
        self.panes.get_mut(self.pipeline.focused())
    }
}
