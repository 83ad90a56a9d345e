//! Avatar compositing: draw a source picture over a solid background onto a
//! fixed-size square and hand the result out as a displayable resource.

use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use userinfo_config::BackgroundColor;

use crate::error::{Result, UserInfoError};
use crate::loader::ImageLoader;
use crate::model::ThumbnailSize;
use crate::raster::{ImageDecoder, PixelSurface, RasterSurface};
use crate::resource::{ThumbnailOutput, ThumbnailResource};

/// Collaborators shared by every compositor of a bank.
#[derive(Debug, Clone)]
pub struct CompositorContext {
    /// Fetches source bytes.
    pub loader: Arc<dyn ImageLoader>,
    /// Turns source bytes into pixels.
    pub decoder: Arc<dyn ImageDecoder>,
    /// Encoding of the finished thumbnails.
    pub output: ThumbnailOutput,
    /// Upper bound for loading one source image.
    pub load_timeout: Duration,
}

/// One fixed-size compositing surface.
///
/// Loads and decodes may overlap. The surface is locked from fill to
/// extract, so draws on one instance never interleave; they run in the
/// order their sources finish decoding.
#[derive(Debug)]
pub struct Compositor {
    size: ThumbnailSize,
    background: Rgba<u8>,
    surface: Arc<Mutex<Box<dyn RasterSurface>>>,
    context: CompositorContext,
}

impl Compositor {
    /// Compositor at the surface's size.
    pub fn new(
        surface: Box<dyn RasterSurface>,
        background: BackgroundColor,
        context: CompositorContext,
    ) -> Result<Self> {
        let size = ThumbnailSize::new(surface.size()).ok_or_else(|| {
            UserInfoError::Processing("zero-sized surface".to_string())
        })?;

        Ok(Self {
            size,
            background: Rgba(background.rgba()),
            surface: Arc::new(Mutex::new(surface)),
            context,
        })
    }

    /// Edge length of the thumbnails produced.
    pub fn size(&self) -> ThumbnailSize {
        self.size
    }

    /// Composite `source_url` into a thumbnail.
    ///
    /// An empty URL is rejected with [`UserInfoError::EmptySource`] before the
    /// surface is touched.
    pub async fn composite(
        &self,
        source_url: &str,
    ) -> Result<ThumbnailResource> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(UserInfoError::EmptySource);
        }

        let timeout = self.context.load_timeout;
        let bytes =
            tokio::time::timeout(timeout, self.context.loader.load(source_url))
                .await
                .map_err(|_| UserInfoError::Timeout(timeout))??;

        let decoder = Arc::clone(&self.context.decoder);
        let image = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| UserInfoError::Processing(e.to_string()))??;

        let mut surface = Arc::clone(&self.surface).lock_owned().await;
        let background = self.background;
        let png = tokio::task::spawn_blocking(move || {
            surface.fill(background);
            surface.draw_scaled(&image);
            surface.extract()
        })
        .await
        .map_err(|e| UserInfoError::Processing(e.to_string()))??;

        Ok(self.context.output.materialize(png))
    }

    /// Spawn a composite and call `on_ready` only if it succeeds.
    ///
    /// Returns `None` without spawning for an empty URL. Must be called from
    /// within a tokio runtime.
    pub fn composite_then<F>(
        self: &Arc<Self>,
        source_url: impl Into<String>,
        on_ready: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(ThumbnailResource) + Send + 'static,
    {
        let source_url = source_url.into();
        if source_url.trim().is_empty() {
            return None;
        }

        let compositor = Arc::clone(self);
        Some(tokio::spawn(async move {
            match compositor.composite(&source_url).await {
                Ok(resource) => on_ready(resource),
                Err(e) => log::debug!(
                    "Composite of {source_url} at {} dropped: {e}",
                    compositor.size
                ),
            }
        }))
    }
}

/// One compositor per configured thumbnail size.
#[derive(Debug, Clone)]
pub struct CompositorBank {
    compositors: Arc<[Arc<Compositor>]>,
}

impl CompositorBank {
    /// Bank that produces no thumbnails.
    pub fn empty() -> Self {
        Self {
            compositors: Arc::from(Vec::new()),
        }
    }

    /// Bank of CPU [`PixelSurface`]s.
    pub fn new(
        sizes: &[u32],
        background: BackgroundColor,
        context: CompositorContext,
    ) -> Result<Self> {
        Self::with_surfaces(sizes, background, context, |size| {
            Box::new(PixelSurface::new(size))
        })
    }

    /// Bank with one compositor per distinct size, surfaces built by
    /// `make_surface`.
    pub fn with_surfaces<F>(
        sizes: &[u32],
        background: BackgroundColor,
        context: CompositorContext,
        mut make_surface: F,
    ) -> Result<Self>
    where
        F: FnMut(u32) -> Box<dyn RasterSurface>,
    {
        let mut sizes = sizes.to_vec();
        sizes.sort_unstable();
        sizes.dedup();

        let compositors = sizes
            .into_iter()
            .map(|size| {
                Compositor::new(make_surface(size), background, context.clone())
                    .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            compositors: compositors.into(),
        })
    }

    /// Compositor for `size`, if the bank has one.
    pub fn get(&self, size: ThumbnailSize) -> Option<&Arc<Compositor>> {
        self.compositors.iter().find(|c| c.size() == size)
    }

    /// Compositors in ascending size order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Compositor>> {
        self.compositors.iter()
    }

    /// Maintained sizes, ascending.
    pub fn sizes(&self) -> Vec<ThumbnailSize> {
        self.compositors.iter().map(|c| c.size()).collect()
    }

    /// Whether the bank maintains no sizes.
    pub fn is_empty(&self) -> bool {
        self.compositors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        Gate, MemoryImageLoader, RecordingSurface, SolidDecoder, SurfaceOp,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BG: BackgroundColor = BackgroundColor([0xe9, 0xec, 0xef]);

    fn context(loader: Arc<MemoryImageLoader>) -> CompositorContext {
        CompositorContext {
            loader,
            decoder: Arc::new(SolidDecoder),
            output: ThumbnailOutput::data_url(),
            load_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn empty_source_never_touches_the_surface() {
        let loader = Arc::new(MemoryImageLoader::default());
        let (surface, log) = RecordingSurface::new(32);
        let compositor = Arc::new(
            Compositor::new(Box::new(surface), BG, context(loader.clone()))
                .unwrap(),
        );

        assert!(matches!(
            compositor.composite("   ").await,
            Err(UserInfoError::EmptySource)
        ));

        let called = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&called);
        let handle = compositor.composite_then("", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.is_none());
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert!(log.ops().is_empty());
        assert_eq!(loader.total_calls(), 0);
    }

    #[tokio::test]
    async fn composite_fills_then_draws_then_extracts() {
        let loader = Arc::new(
            MemoryImageLoader::default()
                .with_image("http://x/a.png", [1, 2, 3, 255]),
        );
        let (surface, log) = RecordingSurface::new(48);
        let compositor =
            Compositor::new(Box::new(surface), BG, context(loader)).unwrap();

        let resource = compositor.composite("http://x/a.png").await.unwrap();

        assert_eq!(
            log.ops(),
            vec![
                SurfaceOp::Fill([0xe9, 0xec, 0xef, 0xff]),
                SurfaceOp::Draw([1, 2, 3, 255]),
                SurfaceOp::Extract,
            ]
        );
        let png = ThumbnailOutput::data_url()
            .store()
            .read(resource.image())
            .unwrap();
        assert_eq!(png, RecordingSurface::expected_output(48, [1, 2, 3, 255]));
    }

    #[tokio::test]
    async fn load_failure_skips_callback() {
        let loader = Arc::new(MemoryImageLoader::default());
        let (surface, log) = RecordingSurface::new(32);
        let compositor = Arc::new(
            Compositor::new(Box::new(surface), BG, context(loader)).unwrap(),
        );

        let called = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&called);
        compositor
            .composite_then("http://x/missing.png", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
            .await
            .unwrap();

        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert!(log.ops().is_empty());
    }

    #[tokio::test]
    async fn slow_load_times_out() {
        let gate = Gate::closed();
        let loader = Arc::new(
            MemoryImageLoader::default()
                .with_image("http://x/slow.png", [9, 9, 9, 255])
                .gated("http://x/slow.png", gate),
        );
        let (surface, _log) = RecordingSurface::new(32);
        let mut ctx = context(loader);
        ctx.load_timeout = Duration::from_millis(20);
        let compositor = Compositor::new(Box::new(surface), BG, ctx).unwrap();

        assert!(matches!(
            compositor.composite("http://x/slow.png").await,
            Err(UserInfoError::Timeout(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_composites_never_interleave_on_one_surface() {
        let mut loader = MemoryImageLoader::default();
        for i in 0..16u8 {
            loader =
                loader.with_image(&format!("http://x/{i}.png"), [i, 0, 0, 255]);
        }
        let (surface, log) = RecordingSurface::new(32);
        let compositor = Arc::new(
            Compositor::new(Box::new(surface), BG, context(Arc::new(loader)))
                .unwrap(),
        );

        let tasks = (0..16u8).map(|i| {
            let compositor = Arc::clone(&compositor);
            async move {
                compositor.composite(&format!("http://x/{i}.png")).await
            }
        });
        let results = futures::future::join_all(tasks).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let ops = log.ops();
        assert_eq!(ops.len(), 48);
        for chunk in ops.chunks(3) {
            assert!(matches!(chunk[0], SurfaceOp::Fill(_)));
            assert!(matches!(chunk[1], SurfaceOp::Draw(_)));
            assert_eq!(chunk[2], SurfaceOp::Extract);
        }
    }

    #[tokio::test]
    async fn draws_follow_load_completion_not_request_order() {
        let gate = Gate::closed();
        let loader = Arc::new(
            MemoryImageLoader::default()
                .with_image("http://x/slow.png", [1, 0, 0, 255])
                .with_image("http://x/fast.png", [2, 0, 0, 255])
                .gated("http://x/slow.png", gate.clone()),
        );
        let (surface, log) = RecordingSurface::new(32);
        let compositor = Arc::new(
            Compositor::new(Box::new(surface), BG, context(loader)).unwrap(),
        );

        let slow =
            compositor.composite_then("http://x/slow.png", |_| {}).unwrap();
        compositor
            .composite_then("http://x/fast.png", |_| {})
            .unwrap()
            .await
            .unwrap();
        gate.release();
        slow.await.unwrap();

        let draws: Vec<_> = log
            .ops()
            .into_iter()
            .filter(|op| matches!(op, SurfaceOp::Draw(_)))
            .collect();
        assert_eq!(
            draws,
            vec![
                SurfaceOp::Draw([2, 0, 0, 255]),
                SurfaceOp::Draw([1, 0, 0, 255])
            ]
        );
    }

    #[test]
    fn bank_sorts_and_dedups_sizes() {
        let bank = CompositorBank::new(
            &[64, 32, 48, 32],
            BG,
            context(Arc::new(MemoryImageLoader::default())),
        )
        .unwrap();

        let sizes: Vec<u32> = bank.sizes().iter().map(|s| s.pixels()).collect();
        assert_eq!(sizes, vec![32, 48, 64]);
        assert!(bank.get(ThumbnailSize::new(48).unwrap()).is_some());
        assert!(bank.get(ThumbnailSize::new(16).unwrap()).is_none());
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        assert!(
            CompositorBank::new(
                &[0],
                BG,
                context(Arc::new(MemoryImageLoader::default()))
            )
            .is_err()
        );
    }
}
