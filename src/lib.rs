//! # PDF Chat
//!
//! Ask questions about a set of PDF documents and get answers grounded in
//! their content.
//!
//! Uploaded PDFs are turned into plain text, split into overlapping chunks,
//! embedded, and stored in a persisted vector index. Each question is
//! answered by a chat model that sees the most relevant chunks and the
//! conversation so far.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Extract  │──▶│  Chunk  │──▶│ Embed+Index  │──▶│ Conversation │
//! │  (PDF)   │   │ 1000/200│   │   (SQLite)   │   │ condense/QA  │
//! └──────────┘   └─────────┘   └──────────────┘   └──────┬───────┘
//!                                                        │
//!                                  ┌─────────────────────┤
//!                                  ▼                     ▼
//!                            ┌──────────┐          ┌──────────┐
//!                            │   CLI    │          │  Web UI  │
//!                            │(pdfchat) │          │  (axum)  │
//!                            └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! pdfchat init                          # create the index store
//! pdfchat process report.pdf notes.pdf  # build a collection
//! pdfchat ask --collection <id> "What is the main finding?"
//! pdfchat serve                         # web UI on 127.0.0.1:8501
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error type |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index schema |
//! | [`index`] | Persisted vector index and similarity search |
//! | [`llm`] | Chat model abstraction |
//! | [`conversation`] | Conversational retrieval |
//! | [`session`] | Session state |
//! | [`templates`] | Chat page HTML |
//! | [`server`] | Web UI and JSON API |
//! | [`commands`] | CLI command implementations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod server;
pub mod session;
pub mod templates;
