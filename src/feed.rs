//! Post feed: keeps one page of listings in sync with the filter selection.
//!
//! Requests may overlap. Each issued request takes the next sequence number
//! and only the response carrying the latest number is allowed to touch the
//! published state.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ApiError;
use crate::filter::FilterSelection;
use crate::models::{PageResult, Post};

#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts(&self, selection: &FilterSelection) -> Result<PageResult, ApiError>;
}

/// Everything a fetch depends on. `refresh` is bumped after bookmark changes
/// to force a re-fetch of an otherwise unchanged page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedRequest {
    pub selection: FilterSelection,
    pub refresh: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// The credential was rejected; the caller must clear it and log in again.
    AuthExpired,
    Request,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    pub kind: FeedErrorKind,
    pub message: String,
}

impl From<&ApiError> for FeedError {
    fn from(err: &ApiError) -> Self {
        let kind = match err {
            ApiError::Unauthorized => FeedErrorKind::AuthExpired,
            _ => FeedErrorKind::Request,
        };
        Self {
            kind,
            message: format!("Failed to load posts: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub posts: Vec<Post>,
    pub last_page: u32,
    pub is_loading: bool,
    pub error: Option<FeedError>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            posts: Vec::new(),
            last_page: 1,
            is_loading: false,
            error: None,
        }
    }
}

/// Bookmark refresh counter shared between the bookmark toggle and the feed.
#[derive(Clone)]
pub struct RefreshKey {
    tx: Arc<watch::Sender<u64>>,
}

impl RefreshKey {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn bump(&self) {
        self.tx.send_modify(|n| *n += 1);
    }

    #[cfg(test)]
    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for RefreshKey {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct PostFeed {
    source: Arc<dyn PostSource>,
    latest: Arc<AtomicU64>,
    last_request: Arc<Mutex<Option<FeedRequest>>>,
    state: Arc<watch::Sender<FeedState>>,
}

impl PostFeed {
    pub fn new(source: Arc<dyn PostSource>) -> Self {
        let (state, _) = watch::channel(FeedState::default());
        Self {
            source,
            latest: Arc::new(AtomicU64::new(0)),
            last_request: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    /// Issues a fetch for `request` unless it equals the last one issued.
    /// Returns the spawned task so callers (and tests) can await it.
    pub fn request(&self, request: FeedRequest) -> Option<JoinHandle<()>> {
        {
            let mut last = match self.last_request.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.as_ref() == Some(&request) {
                tracing::trace!("request unchanged, not re-fetching");
                return None;
            }
            *last = Some(request.clone());
        }

        let mut seq = 0;
        self.state.send_modify(|s| {
            seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
            s.is_loading = true;
            s.error = None;
        });
        tracing::debug!(seq, page = request.selection.page, "issuing post fetch");

        let source = self.source.clone();
        let latest = self.latest.clone();
        let state = self.state.clone();
        Some(tokio::spawn(async move {
            let result = source.fetch_posts(&request.selection).await;
            state.send_if_modified(|s| {
                if latest.load(Ordering::SeqCst) != seq {
                    tracing::debug!(seq, "discarding stale post response");
                    return false;
                }
                match result {
                    Ok(page) => {
                        s.posts = page.posts;
                        s.last_page = page.paginator.last_page;
                        s.error = None;
                    }
                    Err(ref e) => {
                        tracing::warn!("post fetch failed: {e}");
                        // previous posts stay visible under the error
                        s.error = Some(FeedError::from(e));
                    }
                }
                s.is_loading = false;
                true
            });
        }))
    }

    /// Re-fetches whenever the filter selection or the refresh counter
    /// changes. Returns when either sender is dropped.
    pub async fn run(
        self,
        mut filters: watch::Receiver<FilterSelection>,
        mut refresh: watch::Receiver<u64>,
    ) {
        loop {
            let request = FeedRequest {
                selection: filters.borrow_and_update().clone(),
                refresh: *refresh.borrow_and_update(),
            };
            self.request(request);

            tokio::select! {
                changed = filters.changed() => if changed.is_err() { break },
                changed = refresh.changed() => if changed.is_err() { break },
            }
        }
    }
}
