//! Keeps a record's derived thumbnails in step with its picture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;

use crate::compositor::{Compositor, CompositorBank};
use crate::record::{RecordChange, RecordListener, StoreOutcome, UserRecord};

#[derive(Debug, Default)]
pub(crate) struct LinkCounters {
    pub(crate) applied: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) failed: AtomicU64,
}

/// Listener that recomposites every size when a record's picture changes.
///
/// Each composite holds only a weak reference to its record. Results for a
/// record that was dropped, removed or given a newer picture are released
/// instead of stored.
#[derive(Debug)]
pub struct RecompositionLink {
    bank: CompositorBank,
    runtime: Handle,
    counters: Arc<LinkCounters>,
}

impl RecompositionLink {
    /// Link spawning composites on `runtime`.
    pub fn new(bank: CompositorBank, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            bank,
            runtime,
            counters: Arc::default(),
        })
    }

    /// Compositors run on every picture change.
    pub fn bank(&self) -> &CompositorBank {
        &self.bank
    }

    pub(crate) fn counters(&self) -> &LinkCounters {
        &self.counters
    }

    /// Start following `record`, compositing its current picture if any.
    pub fn attach(self: &Arc<Self>, record: &Arc<UserRecord>) {
        record.add_listener(Arc::clone(self) as Arc<dyn RecordListener>);

        let (picture, generation) = record.current_picture();
        if !picture.trim().is_empty() {
            self.schedule(record, &picture, generation);
        }
    }

    fn schedule(
        &self,
        record: &Arc<UserRecord>,
        picture: &str,
        generation: u64,
    ) {
        if picture.trim().is_empty() {
            let released = record.clear_derived(generation);
            if released > 0 {
                log::debug!(
                    "User {} cleared picture, released {released} thumbnails",
                    record.id()
                );
            }
            return;
        }

        for compositor in self.bank.iter() {
            self.runtime.spawn(recomposite(
                Arc::clone(compositor),
                Arc::downgrade(record),
                picture.to_string(),
                generation,
                Arc::clone(&self.counters),
            ));
        }
    }
}

impl RecordListener for RecompositionLink {
    fn on_change(&self, record: &Arc<UserRecord>, change: &RecordChange) {
        if let RecordChange::Picture {
            picture,
            generation,
        } = change
        {
            self.schedule(record, picture, *generation);
        }
    }
}

async fn recomposite(
    compositor: Arc<Compositor>,
    record: Weak<UserRecord>,
    picture: String,
    generation: u64,
    counters: Arc<LinkCounters>,
) {
    let result = compositor.composite(&picture).await;

    let Some(record) = record.upgrade() else {
        counters.discarded.fetch_add(1, Ordering::Relaxed);
        return;
    };

    match result {
        Ok(resource) => {
            let size = compositor.size();
            match record.store_derived(size, resource, generation) {
                StoreOutcome::Stored => {
                    counters.applied.fetch_add(1, Ordering::Relaxed);
                }
                outcome => {
                    log::debug!(
                        "Discarding {size} thumbnail for user {}: {outcome:?}",
                        record.id()
                    );
                    counters.discarded.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Err(e) => {
            log::warn!(
                "Failed to composite {} avatar for user {} from {picture}: {e}",
                compositor.size(),
                record.id()
            );
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::CompositorContext;
    use crate::model::{ThumbnailSize, UserId, UserProfile};
    use crate::record::ProfileOrigin;
    use crate::resource::{ObjectUrlStore, ThumbnailOutput};
    use crate::testing::{
        Gate, MemoryImageLoader, RecordingSurface, SolidDecoder,
    };
    use std::time::Duration;
    use userinfo_config::{BackgroundColor, ThumbnailEncoding};

    fn bank(
        loader: MemoryImageLoader,
        store: ObjectUrlStore,
    ) -> CompositorBank {
        let context = CompositorContext {
            loader: Arc::new(loader),
            decoder: Arc::new(SolidDecoder),
            output: ThumbnailOutput::new(ThumbnailEncoding::ObjectUrl, store),
            load_timeout: Duration::from_secs(5),
        };
        CompositorBank::with_surfaces(
            &[32, 48],
            BackgroundColor::default(),
            context,
            |size| Box::new(RecordingSurface::new(size).0),
        )
        .unwrap()
    }

    async fn wait_for_sizes(record: &Arc<UserRecord>, count: usize) {
        let mut rx = record.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while record.derived_images().len() != count {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn attach_composites_existing_picture() {
        let store = ObjectUrlStore::new();
        let loader =
            MemoryImageLoader::default().with_image("a.png", [1, 1, 1, 255]);
        let link = RecompositionLink::new(
            bank(loader, store.clone()),
            Handle::current(),
        );
        let record = UserRecord::new(UserId(1), UserProfile::new("A", "a.png"));

        link.attach(&record);
        wait_for_sizes(&record, 2).await;

        assert_eq!(store.live_count(), 2);
        assert_eq!(link.counters().applied.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn clearing_the_picture_releases_thumbnails() {
        let store = ObjectUrlStore::new();
        let loader =
            MemoryImageLoader::default().with_image("a.png", [1, 1, 1, 255]);
        let link = RecompositionLink::new(
            bank(loader, store.clone()),
            Handle::current(),
        );
        let record = UserRecord::new(UserId(2), UserProfile::default());
        link.attach(&record);

        record.apply_profile("B", "a.png", ProfileOrigin::Push);
        wait_for_sizes(&record, 2).await;

        record.apply_profile("B", "", ProfileOrigin::Push);
        assert!(record.derived_images().is_empty());
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn superseded_picture_results_are_released() {
        let store = ObjectUrlStore::new();
        let slow = Gate::closed();
        let loader = MemoryImageLoader::default()
            .with_image("old.png", [1, 0, 0, 255])
            .with_image("new.png", [2, 0, 0, 255])
            .gated("old.png", slow.clone());
        let link = RecompositionLink::new(
            bank(loader, store.clone()),
            Handle::current(),
        );
        let record = UserRecord::new(UserId(3), UserProfile::default());
        link.attach(&record);

        record.apply_profile("C", "old.png", ProfileOrigin::Push);
        record.apply_profile("C", "new.png", ProfileOrigin::Push);
        wait_for_sizes(&record, 2).await;

        slow.release();
        tokio::time::timeout(Duration::from_secs(5), async {
            while link.counters().discarded.load(Ordering::Relaxed) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let size = ThumbnailSize::new(32).unwrap();
        let png = store.read(&record.derived(size).unwrap()).unwrap();
        assert_eq!(png, RecordingSurface::expected_output(32, [2, 0, 0, 255]));
        assert_eq!(store.live_count(), 2);
    }

    #[tokio::test]
    async fn dropped_record_discards_results() {
        let store = ObjectUrlStore::new();
        let gate = Gate::closed();
        let loader = MemoryImageLoader::default()
            .with_image("a.png", [1, 1, 1, 255])
            .gated("a.png", gate.clone());
        let link = RecompositionLink::new(
            bank(loader, store.clone()),
            Handle::current(),
        );
        let record = UserRecord::new(UserId(4), UserProfile::new("D", "a.png"));
        link.attach(&record);
        drop(record);

        gate.release();
        tokio::time::timeout(Duration::from_secs(5), async {
            while link.counters().discarded.load(Ordering::Relaxed) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(store.live_count(), 0);
    }
}
