//! Search arXiv, fetch PDFs, and summarize, translate or question a paper's
//! abstract through an OpenAI-compatible chat-completion endpoint.

pub mod config;
pub mod error;
pub mod layers;
pub mod shell;

pub use config::Settings;
pub use error::{AppError, AppResult, ErrorKind};
pub use layers::{ChatTurn, Paper};
