//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! *Previously, on Enrichq...*
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The index has forty million mail records. Every one of them has a subject, a
//! sender, a date. Not one of them has a body. "We'll backfill it," someone said
//! in a planning meeting. Nobody at that meeting is on call tonight.
//!
//! 🚀 This module fetches records with `_mget` and writes them back with `_bulk`.
//! Two endpoints. One index. Zero opinions about what the records contain.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

mod elasticsearch_sink;

pub use elasticsearch_sink::{ElasticsearchSink, ElasticsearchSinkConfig};
