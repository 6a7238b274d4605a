//! UI event types.
//!
//! Everything the reducer reacts to arrives as a `UiEvent`: terminal input,
//! frame timing, and results of reads spawned by the runtime.

use pex_core::pipeline::StageId;
use pex_core::stream::StageCursor;

/// Result of one read from a stage's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were appended to (or served from) the stage buffer.
    Data(usize),
    /// The stream reported end of output.
    Eof,
    Failed(String),
}

#[derive(Debug)]
pub enum UiEvent {
    /// Render cadence.
    Tick,
    /// Current terminal size, sent before other events each loop iteration.
    Frame { width: u16, height: u16 },
    Terminal(crossterm::event::Event),
    /// A spawned read finished; the cursor is handed back to its pane.
    StageRead {
        stage: StageId,
        cursor: StageCursor,
        outcome: ReadOutcome,
    },
}
