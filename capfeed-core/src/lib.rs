//! capfeed-core: feed synchronization for a remote capture device.
//!
//! A paginated REST history and a live push channel are merged into one
//! de-duplicated sequence of image references, owned by [`FeedStore`] and
//! driven by [`FeedSession`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod client;
pub mod error;
pub mod grouping;
pub mod latest;
pub mod lightbox;
pub mod realtime;
pub mod scroll;
pub mod session;
pub mod store;
pub mod timestamp;

pub use client::{FeedBackend, HttpBackend, PageOutcome, PageResponse, PaginationClient};
pub use error::{FetchError, MalformedMessage};
pub use grouping::{group_by_date, DateGroup, GroupMember, GroupingView};
pub use latest::{LatestUpdate, LatestWatch};
pub use lightbox::Lightbox;
pub use realtime::{ConnectionState, RealtimeEvent, RealtimeHandle, RealtimeListener};
pub use scroll::ScrollTrigger;
pub use session::{FeedConfig, FeedEvent, FeedSession, RefreshPolicy, SessionStatus};
pub use store::{FeedStore, FetchMode, Ingest};
pub use timestamp::{CaptureStamp, GroupKey};

/// Relative path of one captured image as reported by the backend.
pub type ImageRef = String;

/// User-selectable ordering of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedOrder {
    /// Order in which the backend reports or pushes references.
    #[default]
    Arrival,
    /// Order derived from the timestamp embedded in the filename.
    Capture,
}

impl FeedOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedOrder::Arrival => "arrival",
            FeedOrder::Capture => "capture",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            FeedOrder::Arrival => FeedOrder::Capture,
            FeedOrder::Capture => FeedOrder::Arrival,
        }
    }
}

impl fmt::Display for FeedOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrival" => Ok(FeedOrder::Arrival),
            "capture" => Ok(FeedOrder::Capture),
            other => Err(format!("unknown order '{other}' (expected arrival|capture)")),
        }
    }
}
