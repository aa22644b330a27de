pub mod config;
pub mod logging;

pub mod discovery;
pub mod encoder;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod storage;
pub mod subtitle;
pub mod task;
pub mod url_model;
pub mod ytdlp;
