//! Domain model for the Quill content-production client.
//!
//! Pure logic only: no I/O, no async. Network access lives in
//! `quill-client`.

pub mod autonomy;
pub mod dependency;
pub mod error;
pub mod phase;
pub mod project;
pub mod references;
pub mod status;
pub mod tree;
pub mod types;
pub mod undo;
pub mod unit;
pub mod workspace;

pub use error::CoreError;
