//! # Ayla
//!
//! A retrieval-augmented chat companion service backed by the Gemini API.
//!
//! Ayla serves a small chat web app. Each message flows through a bounded
//! per-session history buffer, a keyword-gated retrieval step over a local
//! SQLite knowledge base, a prompt composer, and a generation client with
//! classified-error retry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌─────────┐   ┌─────────┐
//! │  HTTP    │──▶│ History │──▶│ Retrieval │──▶│ Prompt  │──▶│ Gemini  │
//! │  /chat   │   │ buffer  │   │ gate      │   │ compose │   │ + retry │
//! └──────────┘   └─────────┘   └─────┬─────┘   └─────────┘   └─────────┘
//!                                    │
//!                              ┌─────▼─────┐
//!                              │  SQLite   │
//!                              │ passages  │
//!                              └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! ayla reindex                  # build the knowledge base (optional)
//! ayla serve                    # start the chat service
//! ayla ask "bdt nedir"          # one-shot pipeline run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`history`] | Bounded per-session conversation buffers |
//! | [`retrieval`] | Keyword gate and context formatting |
//! | [`index`] | In-memory passage index over stored vectors |
//! | [`embedding`] | Embedding client and vector utilities |
//! | [`chunk`] | Passage splitting |
//! | [`extract`] | Document text extraction |
//! | [`ingest`] | Knowledge-base build pipeline |
//! | [`prompt`] | Persona and prompt assembly |
//! | [`genai`] | Generation client and retry policy |
//! | [`chat`] | The end-to-end chat pipeline |
//! | [`server`] | Chat HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod genai;
pub mod history;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod server;
