//! UI effect types.
//!
//! Effects are commands returned by the reducer that the runtime executes.
//! The reducer never performs I/O or spawns tasks directly.

use std::time::Duration;

use pex_core::pipeline::StageId;
use pex_core::stream::StageCursor;

#[derive(Debug)]
pub enum UiEffect {
    /// Quit the application.
    Quit,

    /// Read one page from a stage after `delay`, then report back with
    /// `UiEvent::StageRead`. The cursor travels with the read.
    ReadStage {
        stage: StageId,
        cursor: StageCursor,
        delay: Duration,
    },
}
