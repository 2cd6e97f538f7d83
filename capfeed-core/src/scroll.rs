use crate::store::FeedStore;

/// Requests the next page when the viewport gets close to the end of the
/// list. Proximity is measured in rows left below the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollTrigger {
    margin: usize,
    near_end: bool,
}

impl ScrollTrigger {
    pub fn new(margin: usize) -> Self {
        Self {
            margin,
            near_end: false,
        }
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Record how many rows remain below the viewport. Returns whether the
    /// sentinel is now within the prefetch margin.
    pub fn observe(&mut self, remaining: usize) -> bool {
        self.near_end = remaining <= self.margin;
        self.near_end
    }

    pub fn in_proximity(&self) -> bool {
        self.near_end
    }

    /// Page to fetch now, if any. Called after every state change so a
    /// sentinel that stays in view keeps pulling pages until `has_more` drops.
    pub fn evaluate(&self, store: &mut FeedStore) -> Option<u32> {
        if !self.in_proximity() || !store.has_more() || store.is_fetching() {
            return None;
        }
        store.request_next_page()
    }
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new(12)
    }
}
