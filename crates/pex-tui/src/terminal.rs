//! Terminal lifecycle management.
//!
//! Terminal state is restored on normal exit (via `TuiRuntime`'s Drop) and
//! on panic (via the hook installed by `install_panic_hook`).

use std::io::{self, Stdout};
use std::panic;

use anyhow::{Context, Result};
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

/// Enables raw mode, enters the alternate screen and creates the terminal.
///
/// Call `install_panic_hook()` before this to ensure terminal restore on panic.
///
/// # Errors
/// Returns an error if the terminal cannot be configured.
pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("Failed to create terminal")?;
    Ok(terminal)
}

/// Enables bracketed paste, and mouse capture when `mouse` is set.
///
/// # Errors
/// Returns an error if the escape sequences cannot be written.
pub fn enable_input_features(mouse: bool) -> Result<()> {
    execute!(io::stdout(), EnableBracketedPaste).context("Failed to enable bracketed paste")?;
    if mouse {
        execute!(io::stdout(), EnableMouseCapture).context("Failed to enable mouse capture")?;
    }
    Ok(())
}

/// Restores terminal state. Idempotent.
///
/// # Errors
/// Returns an error if the alternate screen or raw mode cannot be left.
pub fn restore_terminal() -> Result<()> {
    // Safe even if never enabled; must happen before leaving raw mode.
    let _ = execute!(io::stdout(), DisableMouseCapture, DisableBracketedPaste);

    execute!(io::stdout(), LeaveAlternateScreen).context("Failed to leave alternate screen")?;
    disable_raw_mode().context("Failed to disable raw mode")?;
    Ok(())
}

/// Installs a panic hook that restores the terminal before printing the panic.
///
/// Call this BEFORE `setup_terminal()`.
pub fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}
