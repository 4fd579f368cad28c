//! CLI command handlers, one per file.

mod checksum;
mod completions;
mod config;
pub(crate) mod get;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use config::run_config;
pub use get::{run_get, GetArgs};
