use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("could not load {path}: {reason}. Please check if it exists and is readable.")]
    EnvFile { path: PathBuf, reason: String },

    #[error(
        "Model type {0} is not supported. Please choose one of the following: LlamaCpp, GPT4All"
    )]
    UnsupportedModelType(String),
}
