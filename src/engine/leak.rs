//! Registry of currently active runners, kept in debug builds only

#[cfg(debug_assertions)]
use std::collections::BTreeMap;
#[cfg(debug_assertions)]
use std::sync::{Mutex, PoisonError};

#[cfg(debug_assertions)]
static ACTIVE: Mutex<BTreeMap<u64, String>> = Mutex::new(BTreeMap::new());

pub(crate) fn track(id: u64, name: &str) {
    #[cfg(debug_assertions)]
    ACTIVE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, name.to_string());
    #[cfg(not(debug_assertions))]
    let _ = (id, name);
}

pub(crate) fn untrack(id: u64) {
    #[cfg(debug_assertions)]
    ACTIVE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    #[cfg(not(debug_assertions))]
    let _ = id;
}

/// Names of runners that are currently active, oldest runner first.
///
/// Diagnostic aid for finding runners that were never deactivated; always empty in
/// release builds.
pub fn active_runners() -> Vec<String> {
    #[cfg(debug_assertions)]
    {
        ACTIVE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
    #[cfg(not(debug_assertions))]
    {
        Vec::new()
    }
}
