//! Date-grouped projection of the feed sequence.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::store::FeedStore;
use crate::timestamp::{self, GroupKey};
use crate::ImageRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub image: ImageRef,
    /// Absolute position in the feed sequence, used to address the lightbox.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateGroup {
    pub key: GroupKey,
    pub members: Vec<GroupMember>,
}

impl DateGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Partition `sequence` by capture date, most recent date first. Members keep
/// sequence order; references without a stamp land in a trailing "Unknown"
/// group.
pub fn group_by_date(sequence: &[ImageRef]) -> Vec<DateGroup> {
    let mut buckets: BTreeMap<GroupKey, Vec<GroupMember>> = BTreeMap::new();
    for (index, image) in sequence.iter().enumerate() {
        buckets
            .entry(timestamp::group_key(image))
            .or_default()
            .push(GroupMember {
                image: image.clone(),
                index,
            });
    }
    buckets
        .into_iter()
        .rev()
        .map(|(key, members)| DateGroup { key, members })
        .collect()
}

/// Memoized [`group_by_date`], recomputed only when the store's sequence
/// version changes.
#[derive(Debug, Default)]
pub struct GroupingView {
    version: Option<u64>,
    groups: Vec<DateGroup>,
}

impl GroupingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&mut self, store: &FeedStore) -> &[DateGroup] {
        if self.version != Some(store.version()) {
            self.groups = group_by_date(store.sequence());
            self.version = Some(store.version());
        }
        &self.groups
    }

    pub fn is_current(&self, store: &FeedStore) -> bool {
        self.version == Some(store.version())
    }
}
