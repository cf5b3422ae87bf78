//! WAF Sessionizer
//!
//! Rebuilds per-client sessions from WAF audit records, labels each session
//! and links its records to it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WAF SESSIONIZER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  raw_logs ──► Run loop ──► Windower ──► Guard ──┐           │
//! │  (unlinked,    (batches     (per-key      │      ▼          │
//! │   by id)        by id)      windows)      │  Classifier     │
//! │                                           ▼      │          │
//! │                               Session store ◄────┘          │
//! │                          (upsert + link, one tx)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logic;
pub mod models;

pub use error::{PipelineError, PipelineResult, StoreError, StoreResult};
