//! Interactive pipeline editor over files or stdin.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pex_core::config::Config;
use pex_core::stream::{ByteStream, SharedSource};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub async fn run(files: &[PathBuf], config: Config) -> Result<()> {
    let input = open_input(files).await?;
    let text = pex_tui::run(config, SharedSource::new(input))?;
    if !text.is_empty() {
        println!("| {text}");
    }
    Ok(())
}

/// Concatenation of `files`, or stdin when there are none.
async fn open_input(files: &[PathBuf]) -> Result<ByteStream> {
    if files.is_empty() {
        if std::io::stdin().is_terminal() {
            anyhow::bail!("no input: pipe data into pex or pass one or more FILES");
        }
        return Ok(Box::new(tokio::io::stdin()));
    }

    let mut input: ByteStream = Box::new(tokio::io::empty());
    for path in files {
        let file = File::open(path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        input = Box::new(input.chain(file));
    }
    Ok(input)
}
