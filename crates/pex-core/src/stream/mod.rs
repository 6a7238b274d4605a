//! Shared, line-indexed byte streams.
//!
//! - `buffer`: append-only bytes plus an incremental line index
//! - `shared`: single-flight cache over an async reader, read via cursors

mod buffer;
mod shared;

pub use buffer::LineBuffer;
pub use shared::{ByteStream, PAGE_SIZE, SharedSource, StageCursor};
