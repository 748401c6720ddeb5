use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

const DEFAULT_TRACE_CAPACITY: usize = 128;

/// Bounded per-call debug trace. Scoped by call id and passed by handle;
/// once full, the oldest entries are dropped.
#[derive(Debug)]
pub struct CallTrace {
    call_id: String,
    capacity: usize,
    entries: VecDeque<TraceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub tool: String,
    pub detail: String,
}

pub type CallTraceHandle = Arc<Mutex<CallTrace>>;

impl CallTrace {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self::with_capacity(call_id, DEFAULT_TRACE_CAPACITY)
    }

    pub fn with_capacity(call_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            call_id: call_id.into(),
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn into_handle(self) -> CallTraceHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn record(&mut self, tool: impl Into<String>, detail: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TraceEntry {
            at: Utc::now(),
            tool: tool.into(),
            detail: detail.into(),
        });
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const DEFAULT_REGISTRY_CAPACITY: usize = 256;

/// Registry of per-call traces, bounded by number of calls. A new call past
/// capacity evicts the call that started longest ago.
#[derive(Debug)]
pub struct TraceRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    traces: HashMap<String, CallTraceHandle>,
    order: VecDeque<String>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Handle for the given call, creating the trace on first use.
    pub fn handle_for(&self, call_id: &str) -> CallTraceHandle {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.traces.get(call_id) {
            return Arc::clone(handle);
        }

        if inner.order.len() == self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.traces.remove(&evicted);
            }
        }

        let handle = CallTrace::new(call_id).into_handle();
        inner.traces.insert(call_id.to_string(), Arc::clone(&handle));
        inner.order.push_back(call_id.to_string());
        handle
    }

    pub fn get(&self, call_id: &str) -> Option<CallTraceHandle> {
        self.inner.lock().unwrap().traces.get(call_id).map(Arc::clone)
    }

    pub fn record(&self, call_id: &str, tool: impl Into<String>, detail: impl Into<String>) {
        self.handle_for(call_id).lock().unwrap().record(tool, detail);
    }

    /// Owned copy of the entries for one call, oldest first.
    pub fn snapshot(&self, call_id: &str) -> Option<Vec<TraceEntry>> {
        let handle = self.get(call_id)?;
        let trace = handle.lock().ok()?;
        Some(trace.entries().cloned().collect())
    }
}

impl Default for TraceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_is_bounded_and_drops_oldest() {
        let mut trace = CallTrace::with_capacity("call-1", 3);
        for i in 0..5 {
            trace.record("check_availability", format!("entry {}", i));
        }

        assert_eq!(trace.len(), 3);
        let details: Vec<&str> = trace.entries().map(|e| e.detail.as_str()).collect();
        assert_eq!(details, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let mut trace = CallTrace::with_capacity("call-2", 0);
        trace.record("a", "1");
        trace.record("b", "2");
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn record_through_registry_appends_in_order() {
        let registry = TraceRegistry::new();
        registry.record("call-9", "identify_patient", "patient 7");
        registry.record("call-9", "book_appointment", "confirmed");

        let entries = registry.snapshot("call-9").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tool, "identify_patient");
        assert_eq!(entries[1].tool, "book_appointment");
    }

    #[test]
    fn registry_reuses_handles_and_evicts_oldest_call() {
        let registry = TraceRegistry::with_capacity(2);
        registry.record("call-1", "identify_patient", "patient 42");
        registry.record("call-1", "check_availability", "3 slots");
        registry.record("call-2", "identify_patient", "patient 43");

        assert_eq!(registry.snapshot("call-1").unwrap().len(), 2);

        // Third call evicts call-1.
        registry.record("call-3", "identify_patient", "patient 44");
        assert!(registry.snapshot("call-1").is_none());
        assert!(registry.snapshot("call-2").is_some());
        assert!(registry.snapshot("call-3").is_some());
    }
}
