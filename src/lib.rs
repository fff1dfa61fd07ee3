//! Chatpilot — bot brain for a UI-scraped messaging surface.
//!
//! Turns noisy repeated screen reads into a new-message event stream,
//! fans each message out to exactly one plugin, and runs slow LLM
//! completions concurrently per conversation without losing per-sender
//! ordering.

pub mod bot;
pub mod cache;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod llm;
pub mod message;
pub mod plugins;
pub mod pool;
pub mod surface;
