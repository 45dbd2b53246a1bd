//! Status sources the exporter can read from.
//!
//! Both implement [`StatusSource`] and are chosen by the validated
//! [`StatusSourceConfig`].

mod command;
mod file;

pub use command::CommandSource;
pub use file::FileSource;

use std::sync::Arc;

use olicense_pipeline::StatusSource;

use crate::config::StatusSourceConfig;

/// Build the source described by `config`.
pub fn from_config(config: &StatusSourceConfig) -> Arc<dyn StatusSource> {
    match config {
        StatusSourceConfig::Command { program, args } => {
            Arc::new(CommandSource::new(program.clone(), args.clone()))
        }
        StatusSourceConfig::File(path) => Arc::new(FileSource::new(path)),
    }
}
