use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

/// One alerted occurrence: the reminder plus the occurrence time it was due at.
type OccurrenceKey = (i32, Option<DateTime<Utc>>);

/// Occurrences already alerted during this session.
///
/// Entries are keyed by reminder id and occurrence time, so advancing a recurring
/// reminder makes its next occurrence eligible at once while an occurrence whose
/// write failed stays quiet. Each entry expires `retention` after it was marked;
/// once expired the occurrence is treated as never seen, so the cache cannot grow
/// without bound over a long session.
#[derive(Debug, Clone)]
pub struct NotifiedCache {
    expires_at: HashMap<OccurrenceKey, DateTime<Utc>>,
    retention: TimeDelta,
}

impl NotifiedCache {
    pub fn new(retention: TimeDelta) -> Self {
        Self {
            expires_at: HashMap::new(),
            retention,
        }
    }

    /// Records the occurrence as notified. Returns `false` when it was already
    /// marked and has not expired yet, in which case nothing changes.
    pub fn try_mark(
        &mut self,
        id: i32,
        occurrence: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.contains(id, occurrence, now) {
            return false;
        }
        let expiry = now
            .checked_add_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.expires_at.insert((id, occurrence), expiry);
        true
    }

    pub fn contains(&self, id: i32, occurrence: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.expires_at
            .get(&(id, occurrence))
            .is_some_and(|expiry| *expiry > now)
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.expires_at.len();
        self.expires_at.retain(|_, expiry| *expiry > now);
        before - self.expires_at.len()
    }

    pub fn clear(&mut self) {
        self.expires_at.clear();
    }

    pub fn len(&self) -> usize {
        self.expires_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expires_at.is_empty()
    }
}
