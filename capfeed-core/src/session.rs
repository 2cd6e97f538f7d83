//! The feed session: one owned object that holds the store and serializes
//! every mutation through a single event queue.
//!
//! Page fetches and the realtime listener run on worker threads and only
//! send [`FeedEvent`]s; the thread that owns the session applies them in
//! delivery order via [`FeedSession::pump`] / [`FeedSession::wait`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::client::{PageOutcome, PaginationClient};
use crate::error::FetchError;
use crate::grouping::{DateGroup, GroupingView};
use crate::lightbox::Lightbox;
use crate::realtime::{ConnectionState, RealtimeEvent, RealtimeHandle, RealtimeListener};
use crate::scroll::ScrollTrigger;
use crate::store::{FeedStore, FetchMode, Ingest};
use crate::{FeedOrder, ImageRef};

/// Silent re-fetch for views that ignore realtime inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    #[default]
    Off,
    Every(Duration),
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub per_page: u32,
    pub order: FeedOrder,
    pub reconnect_delay: Duration,
    pub prefetch_margin: usize,
    pub refresh: RefreshPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            per_page: 30,
            order: FeedOrder::Arrival,
            reconnect_delay: Duration::from_secs(3),
            prefetch_margin: 12,
            refresh: RefreshPolicy::Off,
        }
    }
}

#[derive(Debug)]
pub enum FeedEvent {
    Page {
        generation: u64,
        page: u32,
        result: Result<PageOutcome, FetchError>,
    },
    Refresh {
        generation: u64,
        result: Result<PageOutcome, FetchError>,
    },
    Realtime(RealtimeEvent),
}

impl From<RealtimeEvent> for FeedEvent {
    fn from(ev: RealtimeEvent) -> Self {
        FeedEvent::Realtime(ev)
    }
}

/// Snapshot for status lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub order: FeedOrder,
    pub mode: FetchMode,
    pub len: usize,
    pub pages: u32,
    pub has_more: bool,
    pub fetching: bool,
    pub connection: Option<ConnectionState>,
    pub last_error: Option<String>,
}

pub struct FeedSession {
    store: FeedStore,
    client: PaginationClient,
    scroll: ScrollTrigger,
    grouping: GroupingView,
    lightbox: Lightbox,
    tx: Sender<FeedEvent>,
    rx: Receiver<FeedEvent>,
    realtime: Option<RealtimeHandle>,
    connection: Option<ConnectionState>,
    last_error: Option<String>,
    reconnect_delay: Duration,
    refresh: RefreshPolicy,
    last_refresh: Instant,
    refresh_in_flight: bool,
}

impl FeedSession {
    pub fn new(client: PaginationClient, config: &FeedConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            store: FeedStore::new(config.order),
            client,
            scroll: ScrollTrigger::new(config.prefetch_margin),
            grouping: GroupingView::new(),
            lightbox: Lightbox::default(),
            tx,
            rx,
            realtime: None,
            connection: None,
            last_error: None,
            reconnect_delay: config.reconnect_delay,
            refresh: config.refresh,
            last_refresh: Instant::now(),
            refresh_in_flight: false,
        }
    }

    /// Reset the feed and request the first page.
    pub fn start(&mut self) {
        let order = self.store.order();
        self.reload(order);
    }

    /// Start the realtime listener. A session owns at most one listener;
    /// later calls are no-ops.
    pub fn connect_realtime(&mut self, url: impl Into<String>) {
        if self.realtime.is_some() {
            return;
        }
        let listener = RealtimeListener::new(url, self.reconnect_delay);
        self.realtime = Some(listener.spawn(self.tx.clone()));
    }

    pub fn disconnect_realtime(&mut self) {
        if let Some(handle) = self.realtime.take() {
            handle.stop();
        }
        self.connection = None;
    }

    /// Switch ordering. The previous sequence is discarded before the first
    /// page in the new order is requested.
    pub fn set_order(&mut self, order: FeedOrder) {
        if order == self.store.order() {
            return;
        }
        self.reload(order);
    }

    fn reload(&mut self, order: FeedOrder) {
        self.store.reset(order);
        // proximity was measured against the old sequence
        self.scroll = ScrollTrigger::new(self.scroll.margin());
        self.lightbox.close();
        self.last_error = None;
        self.refresh_in_flight = false;
        self.last_refresh = Instant::now();
        self.load_next();
    }

    /// Request the next page regardless of scroll position. Returns whether a
    /// fetch was started.
    pub fn load_next(&mut self) -> bool {
        match self.store.request_next_page() {
            Some(page) => {
                self.spawn_fetch(page);
                true
            }
            None => false,
        }
    }

    /// Retry after a failed page. The cursor did not move, so this asks for
    /// the same page again.
    ///
    /// A page failure parks the scroll trigger. Short of a reload, only this
    /// and [`FeedSession::observe_scroll`] clear the error and let it fire
    /// again.
    pub fn retry(&mut self) -> bool {
        self.last_error = None;
        self.load_next()
    }

    /// Report how many rows remain below the viewport.
    /// A fresh scroll observation also retries a page that failed earlier.
    /// Apart from [`FeedSession::retry`] and a reload, it is the only way out
    /// of the error state.
    pub fn observe_scroll(&mut self, remaining: usize) -> bool {
        self.scroll.observe(remaining);
        self.trigger_scroll()
    }

    fn trigger_scroll(&mut self) -> bool {
        match self.scroll.evaluate(&mut self.store) {
            Some(page) => {
                self.last_error = None;
                self.spawn_fetch(page);
                true
            }
            None => false,
        }
    }

    // After a failure, wait for the next scroll or an explicit retry instead
    // of re-requesting the page in a loop.
    fn evaluate_scroll(&mut self) {
        if self.last_error.is_none() {
            self.trigger_scroll();
        }
    }

    fn spawn_fetch(&self, page: u32) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        let generation = self.store.generation();
        let order = self.store.order();
        debug!(page, %order, generation, "fetching page");
        thread::spawn(move || {
            let result = client.fetch(page, order);
            let _ = tx.send(FeedEvent::Page {
                generation,
                page,
                result,
            });
        });
    }

    /// Queue handle for producers outside the session (tests, embedders).
    pub fn sender(&self) -> Sender<FeedEvent> {
        self.tx.clone()
    }

    /// Apply every queued event without blocking. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(ev) = self.rx.try_recv() {
            self.apply(ev);
            applied += 1;
        }
        applied
    }

    /// Block up to `timeout` for one event, then drain the rest.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => {
                self.apply(ev);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Apply events until no fetch is outstanding or `timeout` passes.
    /// Returns whether the session went idle.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.pump();
        while self.store.is_fetching() || self.refresh_in_flight {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait(deadline - now);
        }
        true
    }

    pub fn apply(&mut self, ev: FeedEvent) {
        match ev {
            FeedEvent::Page {
                generation,
                page,
                result,
            } => {
                if generation != self.store.generation() {
                    debug!(page, generation, "dropping page from before reset");
                    return;
                }
                match result {
                    Ok(PageOutcome::Page {
                        images,
                        page,
                        has_more,
                    }) => {
                        if let Ingest::Applied { added } =
                            self.store.ingest_page(images, page, has_more)
                        {
                            debug!(page, added, has_more, "page applied");
                        }
                    }
                    Ok(PageOutcome::Fallback { images }) => {
                        debug!(count = images.len(), "full listing applied");
                        self.store.ingest_fallback(images);
                    }
                    Err(e) => {
                        warn!(page, error = %e, "page fetch failed");
                        self.store.fetch_failed(page);
                        self.last_error = Some(e.to_string());
                    }
                }
            }
            FeedEvent::Refresh { generation, result } => {
                if generation != self.store.generation() {
                    return;
                }
                self.refresh_in_flight = false;
                match result {
                    Ok(PageOutcome::Page { images, .. }) => {
                        let added = self.store.ingest_head(images);
                        debug!(added, "refresh merged");
                    }
                    Ok(PageOutcome::Fallback { images }) => {
                        if self.store.mode() == FetchMode::FallbackFull {
                            self.store.ingest_fallback(images);
                        }
                    }
                    Err(e) => debug!(error = %e, "refresh failed"),
                }
            }
            FeedEvent::Realtime(RealtimeEvent::State(state)) => {
                self.connection = Some(state);
            }
            FeedEvent::Realtime(RealtimeEvent::NewImage(image)) => {
                if !self.store.ingest_realtime(image) {
                    debug!(order = %self.store.order(), "realtime insert not applied");
                }
            }
        }
        self.evaluate_scroll();
    }

    /// Drive time-based work. Only the refresh policy is time based.
    pub fn tick(&mut self, now: Instant) {
        let RefreshPolicy::Every(every) = self.refresh else {
            return;
        };
        let ignores_realtime =
            self.store.order() == FeedOrder::Capture || self.store.mode() == FetchMode::FallbackFull;
        if !ignores_realtime
            || self.refresh_in_flight
            || self.store.is_fetching()
            || (self.store.cursor() == 0 && self.store.mode() == FetchMode::Paged)
            || now.duration_since(self.last_refresh) < every
        {
            return;
        }
        self.last_refresh = now;
        self.refresh_in_flight = true;
        let client = self.client.clone();
        let tx = self.tx.clone();
        let generation = self.store.generation();
        let order = self.store.order();
        thread::spawn(move || {
            let result = client.fetch(1, order);
            let _ = tx.send(FeedEvent::Refresh { generation, result });
        });
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn client(&self) -> &PaginationClient {
        &self.client
    }

    pub fn order(&self) -> FeedOrder {
        self.store.order()
    }

    pub fn groups(&mut self) -> &[DateGroup] {
        self.grouping.groups(&self.store)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn connection(&self) -> Option<ConnectionState> {
        self.connection
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            order: self.store.order(),
            mode: self.store.mode(),
            len: self.store.len(),
            pages: self.store.cursor(),
            has_more: self.store.has_more(),
            fetching: self.store.is_fetching(),
            connection: self.connection,
            last_error: self.last_error.clone(),
        }
    }

    pub fn open_lightbox(&mut self, index: usize) {
        self.lightbox.open_at(index, self.store.len());
    }

    pub fn close_lightbox(&mut self) {
        self.lightbox.close();
    }

    pub fn lightbox_prev(&mut self) {
        self.lightbox.prev(self.store.len());
    }

    pub fn lightbox_next(&mut self) {
        self.lightbox.next(self.store.len());
    }

    pub fn lightbox(&self) -> &Lightbox {
        &self.lightbox
    }

    pub fn focused(&self) -> Option<(usize, &ImageRef)> {
        let i = self.lightbox.focused(self.store.len())?;
        self.lightbox.current(self.store.sequence()).map(|r| (i, r))
    }
}
