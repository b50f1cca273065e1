//! Shared last-known status per device name.
//!
//! One registry is built at server start and handed to every connection as an
//! `Arc`. The lock is held for a single map access only, never across decode
//! or I/O. Entries are never removed and the last writer wins.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::session::{DeviceSession, ProtocolKind};

/// Status copy of a [`DeviceSession`] as last seen through a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub name: String,
    pub protocol: ProtocolKind,
    pub port: u16,
    pub last_connect: Option<DateTime<Utc>>,
    pub last_info: String,
    pub last_error: String,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<String, SessionSnapshot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for the session's device. Sessions without a name
    /// are not recorded; returns whether an entry was written.
    pub fn upsert(&self, port: u16, session: &DeviceSession) -> bool {
        let Some(name) = session.name() else {
            return false;
        };
        let snapshot = SessionSnapshot {
            name: name.to_string(),
            protocol: session.protocol(),
            port,
            last_connect: session.last_connect,
            last_info: session.last_info.clone(),
            last_error: session.last_error.clone(),
        };
        self.entries.lock().insert(snapshot.name.clone(), snapshot);
        true
    }

    pub fn get(&self, name: &str) -> Option<SessionSnapshot> {
        self.entries.lock().get(name).cloned()
    }

    /// Entries last written through `port`, sorted by device name.
    pub fn entries_for_port(&self, port: u16) -> Vec<SessionSnapshot> {
        let mut entries: Vec<SessionSnapshot> = self
            .entries
            .lock()
            .values()
            .filter(|entry| entry.port == port)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
