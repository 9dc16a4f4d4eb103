use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Tracks which tabs have an export in flight.
#[derive(Debug, Default)]
pub struct ExportGuard {
    in_flight: Mutex<HashSet<String>>,
}

impl ExportGuard {
    /// Marks `tab_id` busy. Returns `None` when an export for it is already running.
    pub fn try_acquire(&self, tab_id: &str) -> Option<InFlight<'_>> {
        if self.lock().insert(tab_id.to_string()) {
            Some(InFlight {
                guard: self,
                tab_id: tab_id.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_busy(&self, tab_id: &str) -> bool {
        self.lock().contains(tab_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the tab when dropped.
#[derive(Debug)]
pub struct InFlight<'a> {
    guard: &'a ExportGuard,
    tab_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.tab_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_for_same_tab_fails() {
        let guard = ExportGuard::default();
        let first = guard.try_acquire("tab-1");
        assert!(first.is_some());
        assert!(guard.try_acquire("tab-1").is_none());
        assert!(guard.try_acquire("tab-2").is_some());
    }

    #[test]
    fn test_dropping_token_releases_tab() {
        let guard = ExportGuard::default();
        {
            let _token = guard.try_acquire("tab-1").unwrap();
            assert!(guard.is_busy("tab-1"));
        }
        assert!(!guard.is_busy("tab-1"));
        assert!(guard.try_acquire("tab-1").is_some());
    }
}
