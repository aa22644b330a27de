//! CLI command handlers.

mod grab;
mod serve;

pub use grab::run_grab;
pub use serve::run_serve;
