use dialer_core::domain::{AgentId, CallAttemptId, LeadId};
use serde::Serialize;
use std::collections::HashMap;

/// A call the dispatcher placed and has not yet seen resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InFlight {
    pub lead_id: LeadId,
    pub agent_id: AgentId,
    pub attempt_id: CallAttemptId,
    pub started_at: i64,
}

/// Bounded set of in-flight calls keyed by lead.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    limit: usize,
    entries: HashMap<LeadId, InFlight>,
}

impl WorkingSet {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: HashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.limit
    }

    pub fn contains(&self, lead_id: LeadId) -> bool {
        self.entries.contains_key(&lead_id)
    }

    /// Returns false when the set is full or the lead is already tracked.
    pub fn insert(&mut self, entry: InFlight) -> bool {
        if self.is_full() || self.contains(entry.lead_id) {
            return false;
        }
        self.entries.insert(entry.lead_id, entry);
        true
    }

    pub fn remove(&mut self, lead_id: LeadId) -> Option<InFlight> {
        self.entries.remove(&lead_id)
    }

    pub fn lead_ids(&self) -> Vec<LeadId> {
        self.entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{InFlight, WorkingSet};
    use dialer_core::domain::{AgentId, CallAttemptId, LeadId};

    fn entry() -> InFlight {
        InFlight {
            lead_id: LeadId::new(),
            agent_id: AgentId::new(),
            attempt_id: CallAttemptId::new(),
            started_at: 0,
        }
    }

    #[test]
    fn insert_respects_limit_and_uniqueness() {
        let mut set = WorkingSet::new(2);
        let first = entry();
        assert!(set.insert(first));
        assert!(!set.insert(first));
        assert!(set.insert(entry()));
        assert!(set.is_full());
        assert!(!set.insert(entry()));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_frees_capacity() {
        let mut set = WorkingSet::new(1);
        let first = entry();
        set.insert(first);
        assert_eq!(set.remove(first.lead_id), Some(first));
        assert!(set.is_empty());
        assert!(set.insert(entry()));
    }
}
