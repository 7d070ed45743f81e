//! Time-bounded memoization of read-mostly API responses.
//!
//! A [`TtlCache`] is constructed explicitly and handed to whoever needs it; there is no process-wide
//! instance. Entries expire by time only: there is no size or count based eviction and nothing is
//! persisted. Expired entries are dropped lazily on read and by [`spawn_sweeper`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::utils::task::AbortOnDrop;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.offset_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Structured cache key: `<kind>|drive:<id>|parent:<id>`.
///
/// Every call site builds keys through this type so equivalent requests always share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: &'static str,
    drive_id: Option<String>,
    parent_id: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl CacheKey {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            drive_id: None,
            parent_id: None,
            extra: Vec::new(),
        }
    }

    pub fn drive(mut self, drive_id: impl Into<String>) -> Self {
        self.drive_id = Some(drive_id.into());
        self
    }

    /// A missing parent is recorded as `root`.
    pub fn parent(mut self, parent_id: Option<&str>) -> Self {
        let parent = parent_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or("root");
        self.parent_id = Some(parent.to_string());
        self
    }

    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra.push((name, value.into()));
        self
    }

    /// Pattern matching every key of this kind for one drive, for use with
    /// [`TtlCache::invalidate_by_pattern`]. Only keys that carry a segment after the drive match, so
    /// `d1` never matches `d10`.
    pub fn drive_pattern(kind: &'static str, drive_id: &str) -> String {
        format!("{kind}|drive:{drive_id}|")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind)?;
        if let Some(drive) = &self.drive_id {
            write!(f, "|drive:{drive}")?;
        }
        if let Some(parent) = &self.parent_id {
            write!(f, "|parent:{parent}")?;
        }
        for (name, value) in &self.extra {
            write!(f, "|{name}:{value}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Longest TTL or sweep period honoured; larger values are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub struct TtlCache<V> {
    namespace: String,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.default_ttl)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(namespace: impl Into<String>, default_ttl: Duration) -> Self {
        Self::with_clock(namespace, default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        namespace: impl Into<String>,
        default_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            default_ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Full storage key for a structured key, prefixed with this cache's namespace.
    pub fn scoped_key(&self, key: &CacheKey) -> String {
        format!("{}:{key}", self.namespace)
    }

    pub fn set(&mut self, key: impl Into<String>, data: V, ttl: Duration) {
        let created_at = self.clock.now();
        // expires_at must stay strictly after created_at.
        let ttl = ttl.clamp(Duration::from_millis(1), MAX_TTL);
        let expires_at = created_at
            .checked_add(ttl)
            .unwrap_or_else(|| created_at + Duration::from_millis(1));
        self.entries.insert(
            key.into(),
            CacheEntry {
                data,
                created_at,
                expires_at,
            },
        );
    }

    pub fn set_default(&mut self, key: impl Into<String>, data: V) {
        let ttl = self.default_ttl;
        self.set(key, data, ttl);
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            self.entries.remove(key);
            return None;
        }
        Some(entry.data.clone())
    }

    /// Age of a live entry.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| now.saturating_duration_since(entry.created_at))
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.data)
    }

    /// Deletes every key containing `pattern`. Returns how many entries went away.
    pub fn invalidate_by_pattern(&mut self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(pattern));
        before - self.entries.len()
    }

    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until they are swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

pub type SharedCache<V> = Arc<Mutex<TtlCache<V>>>;

pub fn shared<V>(cache: TtlCache<V>) -> SharedCache<V> {
    Arc::new(Mutex::new(cache))
}

/// Keeps the background sweep alive; the task stops when this is dropped.
#[derive(Debug)]
pub struct SweeperGuard {
    _task: AbortOnDrop,
}

/// Periodically removes expired entries whether or not anyone reads them.
pub fn spawn_sweeper<V>(cache: SharedCache<V>, every: Duration) -> SweeperGuard
where
    V: Clone + Send + 'static,
{
    let every = every.clamp(Duration::from_millis(1), MAX_TTL);
    let task = AbortOnDrop::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut cache = cache.lock().await;
            let removed = cache.sweep_expired();
            if removed > 0 {
                tracing::debug!(
                    namespace = cache.namespace(),
                    removed,
                    remaining = cache.len(),
                    "swept expired cache entries"
                );
            }
        }
    });
    SweeperGuard { _task: task }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_clock() -> (TtlCache<i32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock("test", Duration::from_secs(60), clock.clone());
        (cache, clock)
    }

    #[test]
    fn ttl_round_trip_and_lazy_delete() {
        let (mut cache, clock) = cache_with_clock();
        cache.set("libraries", 7, Duration::from_millis(1000));
        assert_eq!(cache.get("libraries"), Some(7));

        clock.advance(Duration::from_millis(1000));
        assert_eq!(cache.get("libraries"), Some(7), "exactly at expiry is still live");

        clock.advance(Duration::from_millis(1));
        assert!(cache.contains_key("libraries"));
        assert_eq!(cache.get("libraries"), None);
        assert!(!cache.contains_key("libraries"));
    }

    #[test]
    fn zero_ttl_still_expires_after_creation() {
        let (mut cache, clock) = cache_with_clock();
        cache.set("k", 1, Duration::ZERO);
        assert_eq!(cache.get("k"), Some(1));
        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn huge_ttl_is_clamped_instead_of_overflowing() {
        let (mut cache, clock) = cache_with_clock();
        cache.set("forever", 1, Duration::MAX);
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert_eq!(cache.get("forever"), Some(1));

        let mut huge_default =
            TtlCache::with_clock("huge", Duration::from_secs(i64::MAX as u64), clock.clone());
        huge_default.set_default("k", 2);
        assert_eq!(huge_default.get("k"), Some(2));
    }

    #[test]
    fn invalidate_by_pattern_removes_only_matches() {
        let (mut cache, _clock) = cache_with_clock();
        cache.set_default("a|b", 1);
        cache.set_default("a|c", 2);
        cache.set_default("x|y", 3);

        assert_eq!(cache.invalidate_by_pattern("a|"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("x|y"), Some(3));
        assert_eq!(cache.get("a|b"), None);
    }

    #[test]
    fn sweep_drops_expired_entries_without_reads() {
        let (mut cache, clock) = cache_with_clock();
        cache.set("short", 1, Duration::from_secs(1));
        cache.set("long", 2, Duration::from_secs(120));
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.age("long"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn cache_keys_render_consistently() {
        let (cache, _clock) = cache_with_clock();
        let key = CacheKey::new("folders").drive("d1").parent(None);
        assert_eq!(key.to_string(), "folders|drive:d1|parent:root");
        assert_eq!(
            CacheKey::new("folders").drive("d1").parent(Some(" ")),
            key
        );
        assert_eq!(cache.scoped_key(&key), "test:folders|drive:d1|parent:root");
        assert!(
            cache
                .scoped_key(&key)
                .contains(&CacheKey::drive_pattern("folders", "d1"))
        );
        let other_drive = CacheKey::new("folders").drive("d10").parent(None);
        assert!(
            !cache
                .scoped_key(&other_drive)
                .contains(&CacheKey::drive_pattern("folders", "d1"))
        );
        assert_eq!(
            CacheKey::new("recursive")
                .drive("d1")
                .parent(Some("f2"))
                .with("type", "pdf")
                .to_string(),
            "recursive|drive:d1|parent:f2|type:pdf"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_its_interval() {
        let clock = Arc::new(ManualClock::new());
        let cache = shared(TtlCache::with_clock(
            "sweep",
            Duration::from_secs(1),
            clock.clone(),
        ));
        cache.lock().await.set_default("k", 1);
        clock.advance(Duration::from_secs(2));

        let guard = spawn_sweeper(cache.clone(), Duration::from_secs(600));
        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(cache.lock().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.lock().await.is_empty());
        drop(guard);
    }
}
