//! Single-image "latest capture" watch with an online/offline watchdog.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::client::FeedBackend;
use crate::error::FetchError;
use crate::timestamp;
use crate::ImageRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatestUpdate {
    /// A different image than the last poll reported.
    Changed { image: ImageRef, captured: String },
    Unchanged,
    /// The device has not uploaded anything yet.
    Empty,
}

/// Polls `/latest-image`. One watch per invocation; it carries its own state
/// so several watches never share a poll loop.
pub struct LatestWatch {
    backend: Arc<dyn FeedBackend>,
    stale_after: Duration,
    last: Option<ImageRef>,
    last_success: Option<Instant>,
}

impl LatestWatch {
    pub fn new(backend: Arc<dyn FeedBackend>, stale_after: Duration) -> Self {
        Self {
            backend,
            stale_after,
            last: None,
            last_success: None,
        }
    }

    pub fn poll(&mut self, now: Instant) -> Result<LatestUpdate, FetchError> {
        let latest = self.backend.fetch_latest()?;
        self.last_success = Some(now);
        let Some(image) = latest else {
            return Ok(LatestUpdate::Empty);
        };
        if self.last.as_deref() == Some(image.as_str()) {
            return Ok(LatestUpdate::Unchanged);
        }
        debug!(%image, "latest capture changed");
        self.last = Some(image.clone());
        Ok(LatestUpdate::Changed {
            captured: timestamp::display_stamp(&image),
            image,
        })
    }

    /// Online while the last successful poll is younger than `stale_after`.
    pub fn is_online(&self, now: Instant) -> bool {
        self.last_success
            .map(|t| now.saturating_duration_since(t) < self.stale_after)
            .unwrap_or(false)
    }

    pub fn last(&self) -> Option<&ImageRef> {
        self.last.as_ref()
    }
}
