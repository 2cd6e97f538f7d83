//! The feed store: single writable owner of the image sequence and of the
//! paging/fallback state machine.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::debug;

use crate::timestamp::CaptureStamp;
use crate::{FeedOrder, ImageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    #[default]
    Paged,
    /// The backend has no paging; one bulk fetch, no further pages.
    FallbackFull,
}

/// Result of offering a page to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Applied { added: usize },
    /// Not the next expected page, or the store is no longer paging.
    Stale,
}

#[derive(Debug)]
pub struct FeedStore {
    sequence: Vec<ImageRef>,
    members: HashSet<ImageRef>,
    cursor: u32,
    has_more: bool,
    mode: FetchMode,
    order: FeedOrder,
    in_flight: Option<u32>,
    generation: u64,
    version: u64,
}

impl FeedStore {
    pub fn new(order: FeedOrder) -> Self {
        Self {
            sequence: Vec::new(),
            members: HashSet::new(),
            cursor: 0,
            has_more: true,
            mode: FetchMode::Paged,
            order,
            in_flight: None,
            generation: 0,
            version: 0,
        }
    }

    /// Drop everything known so far. Arrival-ordered and capture-ordered pages
    /// cannot be merged, so this runs on every ordering change before any new
    /// fetch is issued.
    pub fn reset(&mut self, order: FeedOrder) {
        self.sequence.clear();
        self.members.clear();
        self.cursor = 0;
        self.has_more = true;
        self.mode = FetchMode::Paged;
        self.order = order;
        self.in_flight = None;
        self.generation += 1;
        self.version += 1;
        debug!(order = %order, generation = self.generation, "feed reset");
    }

    /// Next page to fetch, marking it in flight. `None` when in fallback mode,
    /// exhausted, or a fetch is already outstanding.
    pub fn request_next_page(&mut self) -> Option<u32> {
        if self.mode != FetchMode::Paged || !self.has_more || self.in_flight.is_some() {
            return None;
        }
        let page = self.cursor + 1;
        self.in_flight = Some(page);
        Some(page)
    }

    /// A fetch for `page` failed; the sequence stays as it was.
    pub fn fetch_failed(&mut self, page: u32) {
        if self.in_flight == Some(page) {
            self.in_flight = None;
        }
    }

    pub fn ingest_page(&mut self, refs: Vec<ImageRef>, page: u32, has_more: bool) -> Ingest {
        if self.in_flight == Some(page) {
            self.in_flight = None;
        }
        if self.mode != FetchMode::Paged || page != self.cursor + 1 {
            debug!(page, cursor = self.cursor, "ignoring out-of-order page");
            return Ingest::Stale;
        }

        let added = if page == 1 {
            // Only realtime arrivals can exist before page 1; they are newer
            // than anything the page holds, so they stay at the head.
            let incoming: HashSet<&ImageRef> = refs.iter().collect();
            let mut next: Vec<ImageRef> = self
                .sequence
                .drain(..)
                .filter(|r| !incoming.contains(r))
                .collect();
            let kept = next.len();
            let mut members: HashSet<ImageRef> = next.iter().cloned().collect();
            for r in refs {
                if members.insert(r.clone()) {
                    next.push(r);
                }
            }
            let added = next.len() - kept;
            self.sequence = next;
            self.members = members;
            added
        } else {
            let before = self.sequence.len();
            for r in refs {
                if self.members.insert(r.clone()) {
                    self.sequence.push(r);
                }
            }
            self.sequence.len() - before
        };

        self.cursor = page;
        self.has_more = has_more;
        self.version += 1;
        Ingest::Applied { added }
    }

    /// Install the full listing from a backend without paging support.
    ///
    /// Arrival order cannot be rebuilt from one bulk response, so entries are
    /// sorted by capture time, newest first. References without a stamp go
    /// last and keep their relative order.
    pub fn ingest_fallback(&mut self, all: Vec<ImageRef>) {
        let mut seen = HashSet::with_capacity(all.len());
        let mut unique: Vec<ImageRef> = all.into_iter().filter(|r| seen.insert(r.clone())).collect();
        unique.sort_by_cached_key(|r| Reverse(CaptureStamp::parse(r)));
        self.members = seen;
        self.sequence = unique;
        self.mode = FetchMode::FallbackFull;
        self.has_more = false;
        self.in_flight = None;
        self.version += 1;
    }

    /// Prepend one pushed reference. Returns whether it was inserted.
    ///
    /// Capture-ordered and fully fetched views cannot take an arbitrary
    /// insertion without breaking their sort, so only the paged arrival view
    /// accepts pushes.
    pub fn ingest_realtime(&mut self, image: ImageRef) -> bool {
        if self.order != FeedOrder::Arrival || self.mode != FetchMode::Paged {
            return false;
        }
        if self.members.contains(&image) {
            return false;
        }
        self.members.insert(image.clone());
        self.sequence.insert(0, image);
        self.version += 1;
        true
    }

    /// Prepend the unseen references of a freshly fetched head page, keeping
    /// their relative order. Used by the silent refresh.
    pub fn ingest_head(&mut self, refs: Vec<ImageRef>) -> usize {
        let fresh: Vec<ImageRef> = refs
            .into_iter()
            .filter(|r| self.members.insert(r.clone()))
            .collect();
        let added = fresh.len();
        if added > 0 {
            self.sequence.splice(0..0, fresh);
            self.version += 1;
        }
        added
    }

    pub fn sequence(&self) -> &[ImageRef] {
        &self.sequence
    }

    pub fn get(&self, index: usize) -> Option<&ImageRef> {
        self.sequence.get(index)
    }

    pub fn contains(&self, image: &str) -> bool {
        self.members.contains(image)
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    pub fn order(&self) -> FeedOrder {
        self.order
    }

    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bumped on every change to the sequence, across resets too.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new(FeedOrder::default())
    }
}
