//! Logic Module - Sessionizing pipeline
//!
//! Run loop → windower → (guard → classifier) → store.

pub mod agent;
pub mod classifier;
pub mod guard;
pub mod policy;
pub mod run_loop;
pub mod signals;
pub mod store;
pub mod window;

#[cfg(test)]
pub mod testing;

pub use run_loop::{run_forever, RunReport, RunStatus, Sessionizer, SharedStatus};
pub use store::PgStore;
pub use window::SessionWindower;
