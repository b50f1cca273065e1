//! The registry is shared by every connection task.

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use tracklink_core::{DeviceSession, ProtocolKind, SessionRegistry};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn test_concurrent_upserts_keep_one_entry_per_name() -> TestResult {
    let registry = Arc::new(SessionRegistry::new());
    let mut handles = Vec::new();

    for worker in 0u16..8 {
        let registry = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            for device in 0..50 {
                let mut session = DeviceSession::new(ProtocolKind::Codec8Extended);
                session.assign_name(format!("device-{device}"));
                session.begin_exchange(Utc::now());
                registry.upsert(10000 + worker, &session);
            }
        }));
    }

    for handle in handles {
        handle.join().map_err(|_| "worker panicked")?;
    }

    assert_eq!(registry.len(), 50);
    let listed: usize = (0u16..8)
        .map(|worker| registry.entries_for_port(10000 + worker).len())
        .sum();
    assert_eq!(listed, 50);
    Ok(())
}
