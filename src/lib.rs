pub mod chain;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod models;
pub mod query;
pub mod retrieval;
pub mod server;
pub mod socket;
pub mod vector_store;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use query::QueryInterface;
pub use server::run_server;
