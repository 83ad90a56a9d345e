//! Per-user cached state and its change notifications.
//!
//! A [`UserRecord`] is created once per id and then mutated in place for its
//! whole lifetime, so an `Arc<UserRecord>` held by the UI stays valid across
//! profile loads, picture changes and thumbnail updates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::model::{ThumbnailSize, UserId, UserProfile};
use crate::resource::{DerivedImage, ThumbnailResource};

/// What changed on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    /// The display name changed.
    Name,
    /// The source picture changed; `generation` identifies this value.
    Picture {
        /// New source URL; empty when cleared.
        picture: String,
        /// Generation a thumbnail must be composited from to be stored.
        generation: u64,
    },
    /// A derived thumbnail was stored or released.
    Derived(ThumbnailSize),
    /// The record was removed from the cache.
    Retired,
}

/// Synchronous observer of record mutations.
///
/// Called after the mutation is applied and with no record lock held, in
/// registration order. Implementations should hand long work to a task.
pub trait RecordListener: Send + Sync {
    /// Called once per change.
    fn on_change(&self, record: &Arc<UserRecord>, change: &RecordChange);
}

/// Where a profile update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProfileOrigin {
    /// Completion of the on-demand `GET /api/user/{id}`.
    Fetch,
    /// Explicit upsert with data known to be fresh.
    Push,
}

/// Result of offering a composited thumbnail to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The thumbnail replaced the one held for its size.
    Stored,
    /// The picture changed while compositing; the result was released.
    Stale,
    /// The record was removed; the result was released.
    Retired,
}

/// Immutable copy of a record's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    /// Id the record is cached under.
    pub id: UserId,
    /// Display name; empty until loaded.
    pub name: String,
    /// Source picture URL.
    pub picture: String,
    /// Thumbnails by size.
    pub derived: BTreeMap<ThumbnailSize, DerivedImage>,
    /// Whether the record was removed.
    pub retired: bool,
}

#[derive(Default)]
struct RecordState {
    name: String,
    picture: String,
    generation: u64,
    derived: BTreeMap<ThumbnailSize, ThumbnailResource>,
    pushed: bool,
    retired: bool,
}

/// Cached, observable state of one user.
pub struct UserRecord {
    id: UserId,
    state: RwLock<RecordState>,
    listeners: RwLock<Vec<Arc<dyn RecordListener>>>,
    revision: watch::Sender<u64>,
}

impl UserRecord {
    pub(crate) fn new(id: UserId, profile: UserProfile) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: RwLock::new(RecordState {
                name: profile.name,
                picture: profile.picture,
                ..RecordState::default()
            }),
            listeners: RwLock::new(Vec::new()),
            revision: watch::Sender::new(0),
        })
    }

    /// Record created from an upsert rather than a cache miss.
    pub(crate) fn pushed(id: UserId, profile: UserProfile) -> Arc<Self> {
        let record = Self::new(id, profile);
        record.state.write().pushed = true;
        record
    }

    /// Id the record is cached under.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Display name; empty until loaded.
    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    /// Source picture URL; empty when the user has no avatar.
    pub fn picture(&self) -> String {
        self.state.read().picture.clone()
    }

    /// Whether a name has arrived, by fetch or upsert.
    pub fn is_loaded(&self) -> bool {
        !self.state.read().name.is_empty()
    }

    /// Whether the record was removed from the cache.
    pub fn is_retired(&self) -> bool {
        self.state.read().retired
    }

    /// Current thumbnail at `size`, if composited.
    pub fn derived(&self, size: ThumbnailSize) -> Option<DerivedImage> {
        self.state
            .read()
            .derived
            .get(&size)
            .map(|resource| resource.image().clone())
    }

    /// Every current thumbnail by size.
    pub fn derived_images(&self) -> BTreeMap<ThumbnailSize, DerivedImage> {
        self.state
            .read()
            .derived
            .iter()
            .map(|(size, resource)| (*size, resource.image().clone()))
            .collect()
    }

    /// Consistent copy of every field, taken under one lock.
    pub fn snapshot(&self) -> UserSnapshot {
        let state = self.state.read();
        UserSnapshot {
            id: self.id,
            name: state.name.clone(),
            picture: state.picture.clone(),
            derived: state
                .derived
                .iter()
                .map(|(size, resource)| (*size, resource.image().clone()))
                .collect(),
            retired: state.retired,
        }
    }

    /// Receiver whose value is bumped on every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Number of changes applied so far.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Register `listener` for every later change. Retiring drops it.
    pub fn add_listener(&self, listener: Arc<dyn RecordListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn current_picture(&self) -> (String, u64) {
        let state = self.state.read();
        (state.picture.clone(), state.generation)
    }

    /// Apply `name` and `picture` in place. Returns `false` if the update was
    /// rejected (retired record, or a fetch result arriving after a push).
    pub(crate) fn apply_profile(
        self: &Arc<Self>,
        name: &str,
        picture: &str,
        origin: ProfileOrigin,
    ) -> bool {
        let mut changes = Vec::with_capacity(2);
        {
            let mut state = self.state.write();
            if state.retired {
                return false;
            }
            match origin {
                ProfileOrigin::Fetch if state.pushed => return false,
                ProfileOrigin::Push => state.pushed = true,
                ProfileOrigin::Fetch => {}
            }

            if state.name != name {
                state.name = name.to_string();
                changes.push(RecordChange::Name);
            }
            if state.picture != picture {
                state.picture = picture.to_string();
                state.generation += 1;
                changes.push(RecordChange::Picture {
                    picture: state.picture.clone(),
                    generation: state.generation,
                });
            }
        }

        self.notify(&changes);
        true
    }

    /// Store a thumbnail composited from picture `generation`, releasing the
    /// one it replaces.
    pub(crate) fn store_derived(
        self: &Arc<Self>,
        size: ThumbnailSize,
        resource: ThumbnailResource,
        generation: u64,
    ) -> StoreOutcome {
        {
            let mut state = self.state.write();
            if state.retired {
                return StoreOutcome::Retired;
            }
            if state.generation != generation {
                return StoreOutcome::Stale;
            }
            // Release the previous thumbnail before the new one takes its slot.
            drop(state.derived.remove(&size));
            state.derived.insert(size, resource);
        }

        self.notify(&[RecordChange::Derived(size)]);
        StoreOutcome::Stored
    }

    /// Release every thumbnail if `generation` is still current.
    pub(crate) fn clear_derived(self: &Arc<Self>, generation: u64) -> usize {
        let released = {
            let mut state = self.state.write();
            if state.retired || state.generation != generation {
                return 0;
            }
            std::mem::take(&mut state.derived)
        };

        let changes: Vec<_> =
            released.keys().map(|size| RecordChange::Derived(*size)).collect();
        let count = released.len();
        drop(released);

        self.notify(&changes);
        count
    }

    /// Mark removed and release every thumbnail. Idempotent.
    pub(crate) fn retire(self: &Arc<Self>) -> usize {
        let released = {
            let mut state = self.state.write();
            if state.retired {
                return 0;
            }
            state.retired = true;
            std::mem::take(&mut state.derived)
        };
        let count = released.len();
        drop(released);

        self.notify(&[RecordChange::Retired]);
        self.listeners.write().clear();
        count
    }

    fn notify(self: &Arc<Self>, changes: &[RecordChange]) {
        if changes.is_empty() {
            return;
        }
        self.revision.send_modify(|revision| *revision += 1);

        let listeners = self.listeners.read().clone();
        for change in changes {
            for listener in &listeners {
                listener.on_change(self, change);
            }
        }
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("name", &state.name)
            .field("picture", &state.picture)
            .field("generation", &state.generation)
            .field("derived", &state.derived.keys().collect::<Vec<_>>())
            .field("retired", &state.retired)
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ObjectUrlStore, ThumbnailOutput};
    use parking_lot::Mutex;
    use userinfo_config::ThumbnailEncoding;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RecordChange>>);

    impl RecordListener for Recorder {
        fn on_change(&self, _record: &Arc<UserRecord>, change: &RecordChange) {
            self.0.lock().push(change.clone());
        }
    }

    fn size(px: u32) -> ThumbnailSize {
        ThumbnailSize::new(px).unwrap()
    }

    fn object_output() -> ThumbnailOutput {
        ThumbnailOutput::new(
            ThumbnailEncoding::ObjectUrl,
            ObjectUrlStore::new(),
        )
    }

    #[test]
    fn picture_change_bumps_generation_and_notifies() {
        let record = UserRecord::new(UserId(1), UserProfile::default());
        let recorder = Arc::new(Recorder::default());
        record.add_listener(recorder.clone());

        let fetch = ProfileOrigin::Fetch;
        assert!(record.apply_profile("Ann", "http://x/a.png", fetch));
        assert!(record.apply_profile("Ann", "http://x/a.png", fetch));
        assert!(record.apply_profile("Annie", "http://x/a.png", fetch));

        assert_eq!(
            *recorder.0.lock(),
            vec![
                RecordChange::Name,
                RecordChange::Picture {
                    picture: "http://x/a.png".into(),
                    generation: 1
                },
                RecordChange::Name,
            ]
        );
        assert_eq!(record.revision(), 2);
    }

    #[test]
    fn fetch_results_do_not_override_pushed_data() {
        let record = UserRecord::new(UserId(2), UserProfile::default());
        assert!(record.apply_profile("Pushed", "p.png", ProfileOrigin::Push));
        assert!(
            !record.apply_profile("Fetched", "f.png", ProfileOrigin::Fetch)
        );
        assert_eq!(record.name(), "Pushed");
        assert_eq!(record.picture(), "p.png");
    }

    #[test]
    fn replacing_a_thumbnail_releases_the_previous_one() {
        let output = object_output();
        let record = UserRecord::new(UserId(3), UserProfile::new("C", "a.png"));

        let first = output.materialize(vec![1]);
        let first_view = first.image().clone();
        assert_eq!(
            record.store_derived(size(32), first, 0),
            StoreOutcome::Stored
        );
        assert_eq!(output.store().live_count(), 1);

        let second = output.materialize(vec![2]);
        assert_eq!(
            record.store_derived(size(32), second, 0),
            StoreOutcome::Stored
        );

        assert_eq!(output.store().live_count(), 1);
        assert_eq!(output.store().created_count(), 2);
        assert_eq!(output.store().revoked_count(), 1);
        assert!(output.store().read(&first_view).is_none());
        assert_ne!(record.derived(size(32)), Some(first_view));
    }

    #[test]
    fn stale_generation_is_released_not_stored() {
        let output = object_output();
        let record = UserRecord::new(UserId(4), UserProfile::default());
        record.apply_profile("D", "new.png", ProfileOrigin::Fetch);

        let outcome =
            record.store_derived(size(48), output.materialize(vec![7]), 0);

        assert_eq!(outcome, StoreOutcome::Stale);
        assert!(record.derived(size(48)).is_none());
        assert_eq!(output.store().live_count(), 0);
    }

    #[test]
    fn retire_releases_and_rejects_further_writes() {
        let output = object_output();
        let record = UserRecord::new(UserId(5), UserProfile::new("E", "e.png"));
        record.store_derived(size(32), output.materialize(vec![1]), 0);
        record.store_derived(size(48), output.materialize(vec![2]), 0);

        let recorder = Arc::new(Recorder::default());
        record.add_listener(recorder.clone());

        assert_eq!(record.retire(), 2);
        assert_eq!(record.retire(), 0);
        assert_eq!(output.store().live_count(), 0);
        assert_eq!(*recorder.0.lock(), vec![RecordChange::Retired]);

        assert!(!record.apply_profile("E2", "e2.png", ProfileOrigin::Push));
        assert_eq!(
            record.store_derived(size(32), output.materialize(vec![3]), 0),
            StoreOutcome::Retired
        );
        assert_eq!(output.store().live_count(), 0);
        assert!(record.snapshot().retired);
    }

    #[test]
    fn clear_derived_only_applies_to_current_generation() {
        let output = object_output();
        let record = UserRecord::new(UserId(6), UserProfile::new("F", "f.png"));
        record.store_derived(size(32), output.materialize(vec![1]), 0);

        assert_eq!(record.clear_derived(5), 0);
        assert_eq!(output.store().live_count(), 1);
        assert_eq!(record.clear_derived(0), 1);
        assert_eq!(output.store().live_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let record = UserRecord::new(UserId(7), UserProfile::default());
        let mut rx = record.subscribe();

        record.apply_profile("G", "", ProfileOrigin::Fetch);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(record.name(), "G");
    }
}
