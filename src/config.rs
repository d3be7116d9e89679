use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::GatewayError;

const DEFAULT_MODEL_N_BATCH: usize = 8;
const DEFAULT_TARGET_SOURCE_CHUNKS: usize = 4;

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub llama_cpp_base_url: String,
    pub gpt4all_base_url: String,
    pub embeddings_base_url: String,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    pub embeddings_model_name: Option<String>,
    pub persist_directory: Option<PathBuf>,
    pub collection_name: String,
    pub model_type: Option<String>,
    pub model_path: Option<String>,
    pub model_n_ctx: Option<usize>,
    pub model_n_batch: usize,
    pub model_max_tokens: usize,
    pub target_source_chunks: usize,
    pub max_concurrent_generations: usize,
    pub runtime: RuntimeConfig,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            bind_addr: string_or("GATEWAY_BIND", "0.0.0.0:5000"),
            embeddings_model_name: lookup("EMBEDDINGS_MODEL_NAME"),
            persist_directory: lookup("PERSIST_DIRECTORY").map(PathBuf::from),
            collection_name: string_or("COLLECTION_NAME", "langchain"),
            model_type: lookup("MODEL_TYPE"),
            model_path: lookup("MODEL_PATH"),
            model_n_ctx: parsed(&lookup, "MODEL_N_CTX"),
            model_n_batch: parsed(&lookup, "MODEL_N_BATCH").unwrap_or(DEFAULT_MODEL_N_BATCH),
            model_max_tokens: parsed(&lookup, "MODEL_MAX_TOKENS").unwrap_or(256),
            target_source_chunks: parsed(&lookup, "TARGET_SOURCE_CHUNKS")
                .unwrap_or(DEFAULT_TARGET_SOURCE_CHUNKS),
            max_concurrent_generations: parsed(&lookup, "MAX_CONCURRENT_GENERATIONS")
                .unwrap_or(1usize)
                .max(1),
            runtime: RuntimeConfig {
                llama_cpp_base_url: string_or("LLAMA_CPP_BASE_URL", "http://127.0.0.1:8080"),
                gpt4all_base_url: string_or("GPT4ALL_BASE_URL", "http://127.0.0.1:4891"),
                embeddings_base_url: string_or("EMBEDDINGS_BASE_URL", "http://127.0.0.1:11434"),
            },
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Loads `path` into the process environment without overriding variables
/// that are already set. A file that defines nothing counts as a failure.
pub fn load_env_file(path: &Path) -> Result<(), GatewayError> {
    for (key, value) in read_env_file(path)? {
        if env::var_os(&key).is_none() {
            env::set_var(&key, value);
        }
    }
    Ok(())
}

pub(crate) fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, GatewayError> {
    let env_file_error = |reason: String| GatewayError::EnvFile {
        path: path.to_path_buf(),
        reason,
    };

    let entries = dotenvy::from_path_iter(path)
        .map_err(|err| env_file_error(err.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| env_file_error(err.to_string()))?;

    if entries.is_empty() {
        return Err(env_file_error("file is empty".to_string()));
    }

    Ok(entries)
}
