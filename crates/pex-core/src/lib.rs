//! Core pex library (streams, shell parsing, pipeline stages, config).

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod shell;
pub mod stream;
