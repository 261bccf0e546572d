//! Liveness services: heartbeats for local objects, timeouts for remote ones.
//!
//! Both are clock-driven by the caller (`tick(now)` on the federate), so
//! they run identically under the simulation harness and in production.
//!
//! ```text
//! local update ──► record_outbound ──► cache ──(interval elapsed)──► due_heartbeats
//! remote reflect ─► record_inbound ──► last_seen ──(silence > timeout)──► expired
//! ```

use crate::config::LivenessConfig;
use fedbridge_env::{AttributeValues, ObjectHandle};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Heartbeat {
    attributes: AttributeValues,
    last_sent: i64,
}

/// Heartbeat and timeout registrations keyed by object handle.
#[derive(Debug)]
pub struct LivenessMonitor {
    heartbeat_interval_ms: Option<i64>,
    timeout_ms: Option<i64>,
    heartbeats: HashMap<ObjectHandle, Heartbeat>,
    last_seen: HashMap<ObjectHandle, i64>,
}

impl LivenessMonitor {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            timeout_ms: config.timeout_ms,
            heartbeats: HashMap::new(),
            last_seen: HashMap::new(),
        }
    }

    /// Caches attribute values sent for a tracked local object.
    ///
    /// New values replace cached ones attribute by attribute.
    pub fn record_outbound(&mut self, handle: ObjectHandle, attributes: &AttributeValues, now: i64) {
        if self.heartbeat_interval_ms.is_none() {
            return;
        }
        let entry = self.heartbeats.entry(handle).or_insert_with(|| Heartbeat {
            attributes: AttributeValues::new(),
            last_sent: now,
        });
        entry
            .attributes
            .extend(attributes.iter().map(|(h, bytes)| (*h, bytes.clone())));
        entry.last_sent = now;
    }

    /// Notes that a remote object was heard from.
    pub fn record_inbound(&mut self, handle: ObjectHandle, now: i64) {
        if self.timeout_ms.is_none() {
            return;
        }
        self.last_seen.insert(handle, now);
    }

    /// Revokes both registrations of an object.
    pub fn forget(&mut self, handle: ObjectHandle) {
        self.heartbeats.remove(&handle);
        self.last_seen.remove(&handle);
    }

    /// Cached updates whose heartbeat interval elapsed; marks them sent.
    pub fn due_heartbeats(&mut self, now: i64) -> Vec<(ObjectHandle, AttributeValues)> {
        let Some(interval) = self.heartbeat_interval_ms else {
            return Vec::new();
        };
        let mut due: Vec<_> = self
            .heartbeats
            .iter_mut()
            .filter(|(_, hb)| now - hb.last_sent >= interval && !hb.attributes.is_empty())
            .map(|(handle, hb)| {
                hb.last_sent = now;
                (*handle, hb.attributes.clone())
            })
            .collect();
        due.sort_by_key(|(handle, _)| *handle);
        due
    }

    /// Remote objects silent for longer than the timeout; unregisters them.
    pub fn expired(&mut self, now: i64) -> Vec<ObjectHandle> {
        let Some(timeout) = self.timeout_ms else {
            return Vec::new();
        };
        let mut expired: Vec<_> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now - **seen > timeout)
            .map(|(handle, _)| *handle)
            .collect();
        expired.sort();
        for handle in &expired {
            self.last_seen.remove(handle);
        }
        expired
    }

    pub fn clear(&mut self) {
        self.heartbeats.clear();
        self.last_seen.clear();
    }

    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.len()
    }

    pub fn timeout_count(&self) -> usize {
        self.last_seen.len()
    }
}
