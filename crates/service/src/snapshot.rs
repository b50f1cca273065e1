//! `getinfo` reply: registry entries last updated through one port.

use chrono::Local;
use serde::Serialize;
use tracklink_core::{SessionRegistry, SessionSnapshot};

/// Chunk prefix that asks for a snapshot instead of being decoded.
pub const GETINFO_COMMAND: &[u8] = b"getinfo";

#[derive(Debug, Serialize)]
struct PortSnapshot {
    name: String,
    gps: Vec<DeviceStatus>,
}

#[derive(Debug, Serialize)]
struct DeviceStatus {
    name: String,
    lastconnect: String,
    lastinfo: String,
    lasterror: String,
}

impl From<SessionSnapshot> for DeviceStatus {
    fn from(entry: SessionSnapshot) -> Self {
        Self {
            lastconnect: entry
                .last_connect
                .map(|at| at.with_timezone(&Local).format("%d.%m.%Y %H:%M:%S").to_string())
                .unwrap_or_default(),
            name: entry.name,
            lastinfo: entry.last_info,
            lasterror: entry.last_error,
        }
    }
}

pub fn is_getinfo(chunk: &[u8]) -> bool {
    chunk.starts_with(GETINFO_COMMAND)
}

pub fn render_port_snapshot(registry: &SessionRegistry, port: u16) -> serde_json::Result<String> {
    let snapshot = PortSnapshot {
        name: port.to_string(),
        gps: registry
            .entries_for_port(port)
            .into_iter()
            .map(DeviceStatus::from)
            .collect(),
    };
    serde_json::to_string(&snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracklink_core::{DeviceSession, ProtocolKind};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn named(name: &str) -> DeviceSession {
        let mut session = DeviceSession::new(ProtocolKind::Wialon);
        session.assign_name(name);
        session.last_info = format!("info {name}");
        session
    }

    #[test]
    fn test_getinfo_prefix() {
        assert!(is_getinfo(b"getinfo"));
        assert!(is_getinfo(b"getinfo\r\n"));
        assert!(!is_getinfo(b"GETINFO"));
        assert!(!is_getinfo(b"#L#getinfo"));
    }

    #[test]
    fn test_snapshot_lists_port_entries_sorted() -> TestResult {
        let registry = SessionRegistry::new();
        registry.upsert(20104, &named("beta"));
        registry.upsert(20104, &named("alpha"));
        registry.upsert(20100, &named("other"));

        let json = render_port_snapshot(&registry, 20104)?;
        insta::assert_snapshot!(
            json,
            @r#"{"name":"20104","gps":[{"name":"alpha","lastconnect":"","lastinfo":"info alpha","lasterror":""},{"name":"beta","lastconnect":"","lastinfo":"info beta","lasterror":""}]}"#
        );
        Ok(())
    }

    #[test]
    fn test_snapshot_of_idle_port_is_empty() -> TestResult {
        let registry = SessionRegistry::new();
        assert_eq!(
            render_port_snapshot(&registry, 1)?,
            r#"{"name":"1","gps":[]}"#
        );
        Ok(())
    }
}
