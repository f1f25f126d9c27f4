//! Object engine for the Kestrel object server.
//!
//! Exposes a content-addressed, index-database-backed storage volume as a
//! uniform [`Object`] abstraction. An [`ObjectEngine`] owns one index
//! database per storage device and hands out short-lived object handles;
//! each handle lazily loads its record and drives the two-phase write:
//! stage a payload with [`Object::set_data`], then publish it with
//! [`Object::commit`] (or write a tombstone with [`Object::delete`]).
//!
//! # Modules
//!
//! - [`config`]: engine and storage-policy configuration
//! - [`traits`]: the [`Object`] and [`ObjectEngine`] capability traits
//! - [`engine`]: [`IndexDbEngine`], the device registry
//! - [`object`]: [`IndexDbObject`], the per-request handle
//! - [`registry`]: explicit name → constructor map for engine selection
//!
//! # Handle discipline
//!
//! Handles are not shared across threads and are not internally
//! synchronized. A handle holding a staged payload must be closed on every
//! exit path; [`Object::close`] discards anything never committed.

pub mod config;
pub mod copy;
pub mod engine;
pub mod error;
pub mod object;
pub mod registry;
pub mod traits;

pub use config::{EngineConfig, PolicyConfig};
pub use copy::PartialCopy;
pub use engine::IndexDbEngine;
pub use error::{EngineError, EngineResult};
pub use object::IndexDbObject;
pub use registry::{EngineConstructor, EngineRegistry, INDEX_DB_ENGINE};
pub use tokio_util::task::TaskTracker;
pub use traits::{Object, ObjectEngine};
