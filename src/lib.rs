//! Turnstile - admission-controlled proxy for local inference and vector search
//!
//! Calls to a single-tenant backend (Ollama, Qdrant) are admitted into a
//! tracked queue, let through a per-backend capacity gate, and recorded in a
//! bounded history. Every change is pushed to live subscribers as a snapshot.

pub mod api;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod gate;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod tracker;
