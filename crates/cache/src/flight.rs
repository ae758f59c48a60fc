use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;

type Flight<V, E> = Shared<BoxFuture<'static, Result<Arc<V>, E>>>;

struct Entry<V> {
    value: Arc<V>,
    inserted: Instant,
}

struct State<K, V, E> {
    entries: HashMap<K, Entry<V>>,
    in_flight: HashMap<K, (u64, Flight<V, E>)>,
    next_flight: u64,
}
impl<K: Eq + Hash + Clone, V, E> State<K, V, E> {
    fn insert(&mut self, key: K, value: Arc<V>, ttl: Option<Duration>, capacity: Option<NonZeroUsize>) {
        let now = Instant::now();
        if let Some(ttl) = ttl {
            self.entries.retain(|_, entry| now.duration_since(entry.inserted) < ttl);
        }
        self.entries.insert(key, Entry { value, inserted: now });
        let Some(capacity) = capacity else {
            return;
        };
        while self.entries.len() > capacity.get() {
            let Some(oldest) =
                self.entries.iter().min_by_key(|(_, entry)| entry.inserted).map(|(key, _)| key.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key/value cache where at most one computation per key is ever in flight.
///
/// Values are handed out as [`Arc`]s and shared read-only between callers.
/// A failed computation is reported to every caller that was waiting on it
/// and is never cached, so the next call for that key starts afresh.
///
/// The internal lock is only held for bookkeeping, never across an `.await`;
/// a slow computation for one key doesn't hold up lookups for any other.
///
/// # Examples
///
/// ```
/// use figpack_cache::SingleFlightCache;
/// use std::num::NonZeroUsize;
/// use std::time::Duration;
///
/// # #[derive(Debug, Clone)]
/// # struct Never;
/// # impl std::fmt::Display for Never {
/// #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("never") }
/// # }
/// # impl std::error::Error for Never {}
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), exn::Exn<Never>> {
/// let cache: SingleFlightCache<String, u64, Never> = SingleFlightCache::new()
///     .with_ttl(Duration::from_secs(600))
///     .with_capacity(NonZeroUsize::new(50).unwrap());
///
/// let value = cache.get_or_compute("answer".to_string(), || async { Ok(42) }).await?;
/// assert_eq!(*value, 42);
/// # Ok(())
/// # }
/// ```
pub struct SingleFlightCache<K, V, E> {
    state: Arc<Mutex<State<K, V, E>>>,
    ttl: Option<Duration>,
    capacity: Option<NonZeroUsize>,
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: StdError + Clone + Send + Sync + 'static,
{
    /// An unbounded cache whose entries never expire.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_flight: 0,
            })),
            ttl: None,
            capacity: None,
        }
    }

    /// Expire entries `ttl` after they were inserted.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keep at most `capacity` entries, evicting the least-recently-inserted.
    pub fn with_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Return the cached value for `key`, or compute it.
    ///
    /// If a computation for `key` is already running, this waits for that
    /// computation instead of calling `compute`. Only a successful result is
    /// cached; an error is cloned out to every waiter.
    ///
    /// `compute` is called on the first poll of the computation, after the
    /// internal lock is released, so it may use this cache itself.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<Arc<V>, exn::Exn<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, exn::Exn<E>>> + Send + 'static,
    {
        let flight = {
            let mut state = lock(&self.state);
            if let Some(entry) = state.entries.get(&key) {
                if self.is_fresh(entry) {
                    tracing::debug!(key = ?key, "Cache hit");
                    return Ok(entry.value.clone());
                }
                tracing::debug!(key = ?key, "Cache entry expired");
                state.entries.remove(&key);
            }
            match state.in_flight.get(&key) {
                Some((_, flight)) => {
                    tracing::debug!(key = ?key, "Joining in-flight computation");
                    flight.clone()
                },
                None => {
                    let id = state.next_flight;
                    state.next_flight += 1;
                    let flight = self.launch(id, key.clone(), compute);
                    state.in_flight.insert(key, (id, flight.clone()));
                    flight
                },
            }
        };
        flight.await.map_err(exn::Exn::from)
    }

    fn launch<F, Fut>(&self, id: u64, key: K, compute: F) -> Flight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, exn::Exn<E>>> + Send + 'static,
    {
        let state: Weak<Mutex<State<K, V, E>>> = Arc::downgrade(&self.state);
        let (ttl, capacity) = (self.ttl, self.capacity);
        async move {
            let outcome = match compute().await {
                Ok(value) => Ok(Arc::new(value)),
                Err(err) => {
                    let kind = (*err).clone();
                    tracing::warn!(key = ?key, error = %kind, "Computation failed, result not cached");
                    Err(kind)
                },
            };
            if let Some(state) = state.upgrade() {
                let mut state = lock(&state);
                // An eviction while in flight replaces or removes our slot;
                // in that case the result must not be stored.
                if state.in_flight.get(&key).is_some_and(|(current, _)| *current == id) {
                    state.in_flight.remove(&key);
                    if let Ok(value) = &outcome {
                        state.insert(key, value.clone(), ttl, capacity);
                    }
                }
            }
            outcome
        }
        .boxed()
        .shared()
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        self.ttl.is_none_or(|ttl| entry.inserted.elapsed() < ttl)
    }

    /// The cached value for `key`, if present and unexpired. Never computes.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let state = lock(&self.state);
        state.entries.get(key).filter(|entry| self.is_fresh(entry)).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored entries, including any that have expired but not yet
    /// been purged.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `key`, including any computation currently in flight for it.
    /// Callers already waiting on that computation still receive its result.
    pub fn evict(&self, key: &K) {
        let mut state = lock(&self.state);
        state.entries.remove(key);
        state.in_flight.remove(key);
    }

    /// Drop every entry and forget every in-flight computation.
    pub fn evict_all(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.in_flight.clear();
    }
}

impl<K, V, E> Default for SingleFlightCache<K, V, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: StdError + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
