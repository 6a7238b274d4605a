//! Full-screen TUI for pex.

pub mod effects;
pub mod events;
pub mod pane;
pub mod prompt;
pub mod render;
pub mod runtime;
pub mod state;
pub mod terminal;
pub mod update;

use std::io::{IsTerminal, stdout};
use std::sync::Arc;

use anyhow::Result;
use pex_core::config::Config;
use pex_core::stream::SharedSource;
pub use runtime::TuiRuntime;

/// Runs the interactive pipeline editor over `input` until the user quits.
///
/// Returns the pipeline text as it was when the user quit. Must be called
/// from within a Tokio runtime.
///
/// # Errors
/// Returns an error if stdout is not a terminal or terminal I/O fails.
pub fn run(config: Config, input: Arc<SharedSource>) -> Result<String> {
    if !stdout().is_terminal() {
        anyhow::bail!("pex requires a terminal on stdout");
    }

    let mut runtime = TuiRuntime::new(config, input)?;
    runtime.run()?;
    let text = runtime.state.prompt.text().to_string();
    tracing::debug!(pipeline = %text, "exiting");
    Ok(text)
}
