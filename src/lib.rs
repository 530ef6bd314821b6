//! Semantic memory and contextual retrieval for personal thoughts.
//!
//! Sparkmind turns short user thoughts into searchable vectors, recalls related
//! earlier content during a conversation, keeps a rolling profile of each user,
//! and classifies new input into one of three escalating structures:
//!
//! | Type | Shape | Fields |
//! |------|-------|--------|
//! | **Insight** | A single observation or realization | summary, anchor, pulse |
//! | **Collection** | A goal with steps and a timeframe | heading, objectives, timeframe |
//! | **Principle** | A life-level purpose | heading, purpose, timeframe |
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   cosine scoring; every vector row is namespaced by owner
//! - **Embeddings and completions**: OpenAI-compatible HTTP services behind the
//!   [`embedding::EmbeddingProvider`] and [`llm::CompletionService`] traits
//! - **Failure policy**: one shared backoff utility ([`retry`]); dependency failures
//!   degrade at the component boundary instead of propagating
//! - **Transport**: MCP over stdio or streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: database initialization, schema, migrations, and health checks
//! - [`embedding`]: text-to-vector client with truncation and retry
//! - [`vector`]: namespaced vector store adapter
//! - [`llm`]: JSON-mode chat completion client
//! - [`memory`]: indexing, retrieval, profiles, and the behavior log
//! - [`classify`]: heuristic plus model classification
//! - [`conversation`]: the exploration state machine
//! - [`services`]: the process-wide component graph

pub mod classify;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod retry;
pub mod services;
pub mod vector;
