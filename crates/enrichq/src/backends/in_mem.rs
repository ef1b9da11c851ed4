//! # Previously, on Enrichq...
//!
//! 🎬 The records were trapped in a cluster nobody could spin up in CI. Someone had
//! to write a sink so simple it lives entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`Sink`](crate::backends::Sink) for tests and local
//! development. It keeps its records behind an `Arc<Mutex<...>>`, logs every bulk
//! write so tests can count them, and can pretend a record hasn't materialized yet
//! for a few fetches, which is exactly the situation the retry path exists for.
//!
//! 🦆
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also
//! deploy a therapist.

mod in_mem_sink;

pub use in_mem_sink::InMemorySink;
