//! Tracklink ingestion service.
//!
//! Binds one TCP listener per configured port, runs the protocol decoder
//! bound to that port for every accepted connection and hands decoded
//! records to a single storage writer.
//!
//! ## Modules
//! - `config` - JSON service configuration and port bindings
//! - `server` - listeners, accept loops and the shutdown drain
//! - `connection` - per-connection read, decode and acknowledge loop
//! - `snapshot` - the `getinfo` registry reply
//! - `storage` - append-only file persistence and its writer task

#![deny(static_mut_refs)]

pub mod config;
pub mod connection;
pub mod server;
pub mod snapshot;
pub mod storage;

pub use config::{ListenerConfig, PortSpecError, ServiceConfig};
pub use connection::{CloseReason, ConnectionContext, handle_connection};
pub use server::Server;
pub use storage::{FileStore, StorageCommand, StorageHandle, spawn_writer};
