//! In-memory asset source for testing.

use super::AssetSource;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Script {
    failures: VecDeque<ErrorKind>,
    data: Option<Bytes>,
    permanent: Option<ErrorKind>,
}

/// Serves scripted responses per URL and records how it was used.
///
/// Each URL first returns its queued failures (one per call), then either its
/// permanent failure or its data. Unknown URLs are
/// [`NotFound`](ErrorKind::NotFound). Every call takes `latency` (tokio time,
/// so paused-clock tests stay fast) and is counted, along with the highest
/// number of calls observed in flight at once.
pub struct MockAssetSource {
    name: String,
    latency: Duration,
    scripts: Mutex<HashMap<String, Script>>,
    fetches: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAssetSource {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            latency: Duration::ZERO,
            scripts: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Pre-populate successful assets.
    pub fn with_assets(self, assets: impl IntoIterator<Item = (impl Into<String>, impl Into<Bytes>)>) -> Self {
        for (url, data) in assets {
            let data = data.into();
            self.edit(url.into(), |script| script.data = Some(data));
        }
        self
    }

    /// Make every fetch of `url` fail with `kind`.
    pub fn with_failure(self, url: impl Into<String>, kind: ErrorKind) -> Self {
        self.edit(url.into(), |script| script.permanent = Some(kind));
        self
    }

    /// Fail the next fetches of `url` with `kinds`, in order, before serving
    /// whatever else is scripted for it.
    pub fn with_transient_failures(self, url: impl Into<String>, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.edit(url.into(), |script| script.failures.extend(kinds));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of fetches made for `url`.
    pub fn fetches(&self, url: &str) -> usize {
        lock(&self.fetches).get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        lock(&self.fetches).values().sum()
    }

    /// Highest number of fetches that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn edit(&self, url: String, change: impl FnOnce(&mut Script)) {
        change(lock(&self.scripts).entry(url).or_default());
    }

    fn respond(&self, url: &str, max_bytes: u64) -> Result<Bytes> {
        let mut scripts = lock(&self.scripts);
        let Some(script) = scripts.get_mut(url) else {
            exn::bail!(ErrorKind::NotFound);
        };
        if let Some(kind) = script.failures.pop_front().or_else(|| script.permanent.clone()) {
            exn::bail!(kind);
        }
        match &script.data {
            Some(data) if u64::try_from(data.len()).unwrap_or(u64::MAX) > max_bytes => {
                exn::bail!(ErrorKind::TooLarge(max_bytes))
            },
            // A fresh buffer per response, as a network read would give.
            Some(data) => Ok(Bytes::copy_from_slice(data)),
            None => exn::bail!(ErrorKind::NotFound),
        }
    }
}
impl Default for MockAssetSource {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl AssetSource for MockAssetSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Bytes> {
        *lock(&self.fetches).entry(url.to_string()).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.respond(url, max_bytes)
    }
}
