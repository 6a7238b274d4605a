//! Stages and the controller that keeps them in sync with the edited text.

mod controller;
mod stage;

pub use controller::Pipeline;
pub use stage::{Stage, StageId};
