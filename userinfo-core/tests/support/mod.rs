#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use userinfo_config::{BackgroundColor, ThumbnailEncoding};
use userinfo_core::testing::{
    MemoryImageLoader, RecordingSurface, SolidDecoder, StaticDirectory,
};
use userinfo_core::{
    CompositorBank, CompositorContext, ObjectUrlStore, ThumbnailOutput,
    UserInfoCache, UserRecord,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Cache over in-memory doubles with recording surfaces at 32 and 48 px and
/// object-URL output.
pub struct Harness {
    pub cache: UserInfoCache,
    pub directory: Arc<StaticDirectory>,
    pub loader: Arc<MemoryImageLoader>,
    pub store: ObjectUrlStore,
}

impl Harness {
    pub fn new(
        directory: StaticDirectory,
        loader: MemoryImageLoader,
    ) -> Result<Self> {
        Self::with_fetch_timeout(directory, loader, WAIT)
    }

    pub fn with_fetch_timeout(
        directory: StaticDirectory,
        loader: MemoryImageLoader,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        let directory = Arc::new(directory);
        let loader = Arc::new(loader);
        let store = ObjectUrlStore::new();

        let context = CompositorContext {
            loader: loader.clone(),
            decoder: Arc::new(SolidDecoder),
            output: ThumbnailOutput::new(
                ThumbnailEncoding::ObjectUrl,
                store.clone(),
            ),
            load_timeout: WAIT,
        };
        let bank = CompositorBank::with_surfaces(
            &[32, 48],
            BackgroundColor::default(),
            context,
            |size| Box::new(RecordingSurface::new(size).0),
        )?;

        let cache = UserInfoCache::builder()
            .directory(directory.clone())
            .compositors(bank)
            .object_urls(store.clone())
            .fetch_timeout(fetch_timeout)
            .build()?;

        Ok(Self {
            cache,
            directory,
            loader,
            store,
        })
    }
}

/// Wait until `check` holds for `record`, re-checking on every change.
pub async fn wait_until<F>(record: &Arc<UserRecord>, mut check: F) -> Result<()>
where
    F: FnMut(&UserRecord) -> bool,
{
    let mut changes = record.subscribe();
    tokio::time::timeout(WAIT, async {
        while !check(record.as_ref()) {
            changes.changed().await?;
        }
        anyhow::Ok(())
    })
    .await
    .context("record never reached the expected state")?
}

/// Poll `check` until it holds; for state not reflected on a record.
pub async fn eventually<F>(mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("condition never became true")
}

/// A real PNG of one solid colour.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Result<Vec<u8>> {
    let image = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}
