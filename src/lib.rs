//! schemadex - schema index and natural-language to SQL pipeline
//!
//! Crawls a relational database once into a local SQLite catalog, then turns
//! questions into SQL using compact per-query context and a GROUP BY repair
//! pass over the model output.

pub mod commands;
pub mod config;
pub mod context;
pub mod describe;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod progress;
pub mod prompt;
pub mod repair;
pub mod synth;

pub use config::Config;
pub use error::{Error, Result};
pub use index::SchemaIndex;
