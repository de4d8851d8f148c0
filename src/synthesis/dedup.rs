//! Duplicate detection for generated tasks.
//!
//! Candidates are keyed by their normalized task text. A key is reserved
//! before any sandbox work starts so that concurrent tiers never validate the
//! same task twice; the reservation is released if the candidate is rejected.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::task::normalize_task_text;

/// Shared set of normalized task texts already accepted or in flight.
#[derive(Debug, Clone, Default)]
pub struct SeenTaskSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl SeenTaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark texts as seen, e.g. tasks persisted by an earlier run.
    pub fn seed<I, S>(&self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.lock();
        for text in texts {
            let key = normalize_task_text(text.as_ref());
            if !key.is_empty() {
                set.insert(key);
            }
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        self.lock().contains(&normalize_task_text(text))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Reserve `text`, or `None` if it is already seen or reserved.
    pub fn reserve(&self, text: &str) -> Option<Reservation> {
        let key = normalize_task_text(text);
        if !self.lock().insert(key.clone()) {
            return None;
        }
        Some(Reservation {
            set: self.clone(),
            key,
            committed: false,
        })
    }
}

/// A provisional claim on a task text. Dropping it without [`Reservation::commit`]
/// releases the text.
#[derive(Debug)]
pub struct Reservation {
    set: SeenTaskSet,
    key: String,
    committed: bool,
}

impl Reservation {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Keep the text reserved permanently.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.set.lock().remove(&self.key);
        }
    }
}
