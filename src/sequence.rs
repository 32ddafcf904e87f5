//! Popup identity allocation
//!
//! Each popup in a generation pass gets a distinct id the renderer can use
//! as a DOM id. The sequence is owned by the caller and shared by reference.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct IdSequence {
    first: u64,
    next: AtomicU64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            first,
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed).saturating_sub(self.first)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequence_starts_at_one() {
        let ids = IdSequence::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
        assert_eq!(ids.issued(), 3);
    }

    #[test]
    fn test_sequence_resumes_from_offset() {
        let ids = IdSequence::starting_at(41);
        assert_eq!(ids.issued(), 0);
        assert_eq!(ids.next_id(), 41);
        assert_eq!(ids.next_id(), 42);
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_independent_sequences() {
        let first = IdSequence::new();
        let second = IdSequence::new();
        first.next_id();
        first.next_id();
        assert_eq!(second.next_id(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(IdSequence::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ids = ids.clone();
            handles.push(tokio::spawn(async move {
                (0..50).map(|_| ids.next_id()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(seen.iter().max(), Some(&800));
    }
}
