//! Pagination client and the HTTP backend it talks to.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::FetchError;
use crate::{FeedOrder, ImageRef};

pub const UPDATES_PATH: &str = "/ws/updates";

/// One page of `GET /images`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub images: Vec<ImageRef>,
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub total: Option<u64>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
struct AllImages {
    images: Vec<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct LatestImage {
    url: Option<ImageRef>,
}

/// Endpoints of the capture backend the feed depends on.
pub trait FeedBackend: Send + Sync {
    fn fetch_page(&self, page: u32, per_page: u32, order: FeedOrder)
        -> Result<PageResponse, FetchError>;
    /// Full, unpaged listing.
    fn fetch_all(&self) -> Result<Vec<ImageRef>, FetchError>;
    /// Most recent capture, `None` when the device has not uploaded anything.
    fn fetch_latest(&self) -> Result<Option<ImageRef>, FetchError>;
    fn fetch_image(&self, image: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base = Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// WebSocket address of the update channel (`ws`/`wss` by base scheme).
    pub fn updates_url(&self) -> Result<Url, FetchError> {
        updates_url(&self.base)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T, FetchError> {
        debug!(%url, "GET");
        let resp = self.client.get(url).query(query).send()?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound),
            s if !s.is_success() => Err(FetchError::Status(s.as_u16())),
            _ => resp.json::<T>().map_err(|e| FetchError::Decode(e.to_string())),
        }
    }
}

impl FeedBackend for HttpBackend {
    fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        order: FeedOrder,
    ) -> Result<PageResponse, FetchError> {
        let url = self.base.join("/images")?;
        self.get_json(
            url,
            &[
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
                ("order", order.as_str().to_string()),
            ],
        )
    }

    fn fetch_all(&self) -> Result<Vec<ImageRef>, FetchError> {
        let url = self.base.join("/all-images")?;
        let all: AllImages = self.get_json(url, &[])?;
        Ok(all.images)
    }

    fn fetch_latest(&self) -> Result<Option<ImageRef>, FetchError> {
        let url = self.base.join("/latest-image")?;
        match self.get_json::<LatestImage>(url, &[]) {
            Ok(latest) => Ok(latest.url.filter(|u| !u.is_empty())),
            Err(FetchError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn fetch_image(&self, image: &str) -> Result<Vec<u8>, FetchError> {
        let url = resolve_image_url(&self.base, image, None)?;
        let resp = self.client.get(url).send()?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound),
            s if !s.is_success() => Err(FetchError::Status(s.as_u16())),
            _ => Ok(resp.bytes()?.to_vec()),
        }
    }
}

/// Absolute address of an image. `cache_bust` appends `t=<value>` so a
/// replaced image at the same path is fetched again.
pub fn resolve_image_url(base: &Url, image: &str, cache_bust: Option<u64>) -> Result<Url, url::ParseError> {
    let mut url = base.join(image)?;
    if let Some(t) = cache_bust {
        url.query_pairs_mut().append_pair("t", &t.to_string());
    }
    Ok(url)
}

pub fn updates_url(base: &Url) -> Result<Url, FetchError> {
    let mut url = base.join(UPDATES_PATH)?;
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| FetchError::Decode(format!("cannot derive websocket url from {base}")))?;
    Ok(url)
}

/// What a page request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Page {
        images: Vec<ImageRef>,
        page: u32,
        has_more: bool,
    },
    /// The backend has no paging; this is the complete listing.
    Fallback { images: Vec<ImageRef> },
}

/// Fetches feed pages and degrades to the full listing once the backend
/// signals that it cannot page. Clones share the fallback flag.
#[derive(Clone)]
pub struct PaginationClient {
    backend: Arc<dyn FeedBackend>,
    per_page: u32,
    fallback: Arc<AtomicBool>,
}

impl PaginationClient {
    pub fn new(backend: Arc<dyn FeedBackend>, per_page: u32) -> Self {
        Self {
            backend,
            per_page: per_page.max(1),
            fallback: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn backend(&self) -> &Arc<dyn FeedBackend> {
        &self.backend
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Whether paging was found unsupported. Sticky for the client's lifetime.
    pub fn is_fallback(&self) -> bool {
        self.fallback.load(Ordering::SeqCst)
    }

    pub fn fetch(&self, page: u32, order: FeedOrder) -> Result<PageOutcome, FetchError> {
        if self.is_fallback() {
            return self.fetch_full();
        }
        match self.backend.fetch_page(page, self.per_page, order) {
            Ok(resp) => Ok(PageOutcome::Page {
                images: resp.images,
                page,
                has_more: resp.has_more,
            }),
            Err(e) if e.is_not_found() && page == 1 => {
                info!("backend has no paging support; switching to full listing");
                self.fallback.store(true, Ordering::SeqCst);
                self.fetch_full()
            }
            Err(e) => Err(e),
        }
    }

    fn fetch_full(&self) -> Result<PageOutcome, FetchError> {
        let images = self.backend.fetch_all()?;
        debug!(count = images.len(), "full listing fetched");
        Ok(PageOutcome::Fallback { images })
    }
}
