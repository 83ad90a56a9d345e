//! The on-demand user info cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use userinfo_config::constants::{DEFAULT_FETCH_TIMEOUT, DEFAULT_SENTINEL_NAME};

use crate::compositor::CompositorBank;
use crate::directory::UserDirectory;
use crate::error::{Result, UserInfoError};
use crate::link::RecompositionLink;
use crate::model::{ThumbnailSize, UserId, UserProfile};
use crate::record::{ProfileOrigin, UserRecord};
use crate::resource::ObjectUrlStore;

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cached records, excluding the sentinel.
    pub records: usize,
    /// Lookups that started a server fetch.
    pub fetches_started: u64,
    /// Fetches whose profile was written to the record.
    pub fetches_applied: u64,
    /// Fetches that errored or timed out.
    pub fetches_failed: u64,
    /// Fetches whose record was removed or overwritten before completion.
    pub fetches_discarded: u64,
    /// Thumbnails stored on a record.
    pub composites_applied: u64,
    /// Thumbnails released because their picture or record was gone.
    pub composites_discarded: u64,
    /// Composites that failed to load, decode or encode.
    pub composites_failed: u64,
}

#[derive(Debug, Default)]
struct FetchCounters {
    started: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Debug)]
struct CacheInner {
    records: DashMap<UserId, Arc<UserRecord>>,
    sentinel: Arc<UserRecord>,
    directory: Arc<dyn UserDirectory>,
    link: Arc<RecompositionLink>,
    object_urls: ObjectUrlStore,
    runtime: Handle,
    fetch_timeout: Duration,
    fetches: FetchCounters,
}

/// Process-wide cache of user profiles and their avatar thumbnails.
///
/// Lookups never block and never fail: a miss returns a placeholder record
/// at once and fills it in place when the server answers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UserInfoCache {
    inner: Arc<CacheInner>,
}

impl UserInfoCache {
    /// Start configuring a cache.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::default()
    }

    /// Record for `id`, fetching it from the server on first access.
    ///
    /// The same `Arc` is returned for every call until the id is removed.
    /// At most one fetch is ever started per cached record.
    pub fn get_user_info(&self, id: UserId) -> Arc<UserRecord> {
        if id.is_sentinel() {
            return Arc::clone(&self.inner.sentinel);
        }

        let record = match self.inner.records.entry(id) {
            Entry::Occupied(entry) => return Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let record = UserRecord::new(id, UserProfile::default());
                self.inner.link.attach(&record);
                entry.insert(Arc::clone(&record));
                record
            }
        };

        self.spawn_fetch(&record);
        record
    }

    /// Insert or overwrite `id` with known-fresh data, without a fetch.
    ///
    /// Existing records are updated in place so holders observe the change.
    /// An in-flight fetch for the record is discarded when it completes.
    pub fn set_user_info(
        &self,
        id: UserId,
        name: impl Into<String>,
        picture: impl Into<String>,
    ) {
        if id.is_sentinel() {
            log::warn!("Ignoring attempt to overwrite the deleted-user record");
            return;
        }

        let name = name.into();
        let picture = picture.into();

        let existing = match self.inner.records.entry(id) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let record =
                    UserRecord::pushed(id, UserProfile { name, picture });
                self.inner.link.attach(&record);
                entry.insert(record);
                return;
            }
        };

        existing.apply_profile(&name, &picture, ProfileOrigin::Push);
    }

    /// Evict `id` and release its thumbnails.
    ///
    /// Holders keep their `Arc` but it is retired and receives no further
    /// updates. A later lookup creates a fresh record and fetch.
    pub fn remove_user_info(&self, id: UserId) {
        if id.is_sentinel() {
            log::warn!("Ignoring attempt to remove the deleted-user record");
            return;
        }

        if let Some((_, record)) = self.inner.records.remove(&id) {
            let released = record.retire();
            log::debug!("Removed user {id}, released {released} thumbnails");
        }
    }

    /// Cached record for `id` without triggering a fetch.
    pub fn peek(&self, id: UserId) -> Option<Arc<UserRecord>> {
        if id.is_sentinel() {
            return Some(Arc::clone(&self.inner.sentinel));
        }
        self.inner.records.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Whether `id` has a record. Always true for the sentinel.
    pub fn contains(&self, id: UserId) -> bool {
        id.is_sentinel() || self.inner.records.contains_key(&id)
    }

    /// Number of cached records, excluding the sentinel.
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    /// Whether no records besides the sentinel are cached.
    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Remove and retire every record except the sentinel.
    pub fn clear(&self) {
        let ids: Vec<UserId> =
            self.inner.records.iter().map(|r| *r.key()).collect();
        for id in ids {
            self.remove_user_info(id);
        }
    }

    /// The pre-populated "deleted user" record.
    pub fn sentinel(&self) -> &Arc<UserRecord> {
        &self.inner.sentinel
    }

    /// Sizes every record with a picture is composited at, ascending.
    pub fn thumbnail_sizes(&self) -> Vec<ThumbnailSize> {
        self.inner.link.bank().sizes()
    }

    /// Registry backing object-URL thumbnails.
    pub fn object_urls(&self) -> &ObjectUrlStore {
        &self.inner.object_urls
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let fetches = &self.inner.fetches;
        let composites = self.inner.link.counters();
        CacheStats {
            records: self.inner.records.len(),
            fetches_started: fetches.started.load(Ordering::Relaxed),
            fetches_applied: fetches.applied.load(Ordering::Relaxed),
            fetches_failed: fetches.failed.load(Ordering::Relaxed),
            fetches_discarded: fetches.discarded.load(Ordering::Relaxed),
            composites_applied: composites.applied.load(Ordering::Relaxed),
            composites_discarded: composites.discarded.load(Ordering::Relaxed),
            composites_failed: composites.failed.load(Ordering::Relaxed),
        }
    }

    fn spawn_fetch(&self, record: &Arc<UserRecord>) {
        self.inner.fetches.started.fetch_add(1, Ordering::Relaxed);
        self.inner.runtime.spawn(fetch_into(
            Arc::downgrade(&self.inner),
            Arc::downgrade(record),
        ));
    }
}

async fn fetch_into(cache: Weak<CacheInner>, record: Weak<UserRecord>) {
    let (directory, timeout, id) = {
        let (Some(inner), Some(record)) = (cache.upgrade(), record.upgrade())
        else {
            return;
        };
        (Arc::clone(&inner.directory), inner.fetch_timeout, record.id())
    };

    let result = tokio::time::timeout(timeout, directory.fetch_user(id))
        .await
        .unwrap_or(Err(UserInfoError::Timeout(timeout)));

    let Some(inner) = cache.upgrade() else {
        return;
    };
    let counters = &inner.fetches;

    let profile = match result {
        Ok(profile) => profile,
        Err(e) => {
            log::warn!("Failed to fetch user {id}: {e}");
            counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let current = record.upgrade().filter(|record| {
        inner
            .records
            .get(&id)
            .is_some_and(|cached| Arc::ptr_eq(cached.value(), record))
    });
    let applied = current.is_some_and(|record| {
        record.apply_profile(
            &profile.name,
            &profile.picture,
            ProfileOrigin::Fetch,
        )
    });

    if applied {
        log::debug!("Loaded user {id} ({})", profile.name);
        counters.applied.fetch_add(1, Ordering::Relaxed);
    } else {
        log::debug!("Discarding stale fetch result for user {id}");
        counters.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Assembles a [`UserInfoCache`] from its collaborators.
#[derive(Debug)]
pub struct CacheBuilder {
    directory: Option<Arc<dyn UserDirectory>>,
    compositors: Option<CompositorBank>,
    object_urls: Option<ObjectUrlStore>,
    sentinel: UserProfile,
    fetch_timeout: Duration,
    runtime: Option<Handle>,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self {
            directory: None,
            compositors: None,
            object_urls: None,
            sentinel: UserProfile::new(DEFAULT_SENTINEL_NAME, ""),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            runtime: None,
        }
    }
}

impl CacheBuilder {
    /// Where profiles are fetched from. Required.
    pub fn directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Thumbnail sizes to maintain. Without a bank no thumbnails are made.
    pub fn compositors(mut self, bank: CompositorBank) -> Self {
        self.compositors = Some(bank);
        self
    }

    /// Store the bank's output writes object URLs into, if it uses them.
    pub fn object_urls(mut self, store: ObjectUrlStore) -> Self {
        self.object_urls = Some(store);
        self
    }

    /// Profile of the pre-populated id-0 record.
    pub fn sentinel(mut self, profile: UserProfile) -> Self {
        self.sentinel = profile;
        self
    }

    /// Upper bound for one profile fetch.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Runtime for fetch and composite tasks. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Fails without a directory or outside a tokio runtime.
    pub fn build(self) -> Result<UserInfoCache> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => {
                Handle::try_current().map_err(|_| UserInfoError::NoRuntime)?
            }
        };
        let directory = self
            .directory
            .ok_or(UserInfoError::MissingComponent("directory"))?;
        let bank = self.compositors.unwrap_or_else(CompositorBank::empty);
        let link = RecompositionLink::new(bank, runtime.clone());

        let sentinel = UserRecord::pushed(UserId::DELETED, self.sentinel);
        link.attach(&sentinel);

        Ok(UserInfoCache {
            inner: Arc::new(CacheInner {
                records: DashMap::new(),
                sentinel,
                directory,
                link,
                object_urls: self.object_urls.unwrap_or_default(),
                runtime,
                fetch_timeout: self.fetch_timeout,
                fetches: FetchCounters::default(),
            }),
        })
    }
}
