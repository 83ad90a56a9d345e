//! In-memory test doubles for the cache's collaborators.
//!
//! Used by this crate's unit and integration tests, and usable by consumers
//! that want to exercise UI code against a cache without a server.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::watch;

use crate::directory::UserDirectory;
use crate::error::{Result, UserInfoError};
use crate::loader::ImageLoader;
use crate::model::{UserId, UserProfile};
use crate::raster::{ImageDecoder, RasterSurface};

/// A latch that holds async work until released.
#[derive(Debug, Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Gate {
    /// Gate that holds waiters until [`release`](Self::release).
    pub fn closed() -> Self {
        Self {
            open: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Open the gate for current and future waiters.
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// Resolve once the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Directory answering from a fixed table. Unknown ids answer `404`.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    profiles: Mutex<HashMap<UserId, UserProfile>>,
    calls: DashMap<UserId, usize>,
    total: AtomicUsize,
    gate: Mutex<Option<Gate>>,
}

impl StaticDirectory {
    /// Answer `profile` for `id`.
    pub fn with_profile(
        self,
        id: impl Into<UserId>,
        profile: UserProfile,
    ) -> Self {
        self.profiles.lock().insert(id.into(), profile);
        self
    }

    /// Hold every fetch until `gate` is released.
    pub fn gated(self, gate: Gate) -> Self {
        *self.gate.lock() = Some(gate);
        self
    }

    /// Change the answer for `id` after construction.
    pub fn set_profile(&self, id: impl Into<UserId>, profile: UserProfile) {
        self.profiles.lock().insert(id.into(), profile);
    }

    /// Fetches made for `id`.
    pub fn calls_for(&self, id: impl Into<UserId>) -> usize {
        let id: UserId = id.into();
        self.calls.get(&id).map(|c| *c).unwrap_or(0)
    }

    /// Calls made for any key.
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn fetch_user(&self, id: UserId) -> Result<UserProfile> {
        *self.calls.entry(id).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }

        self.profiles
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| UserInfoError::Status {
                status: StatusCode::NOT_FOUND,
                url: format!("/api/user/{id}"),
            })
    }
}

/// Loader serving fixed bytes per URL. Unknown URLs answer `404`.
#[derive(Debug, Default)]
pub struct MemoryImageLoader {
    images: HashMap<String, Vec<u8>>,
    gates: HashMap<String, Gate>,
    calls: DashMap<String, usize>,
    total: AtomicUsize,
}

impl MemoryImageLoader {
    /// Serve four bytes that [`SolidDecoder`] turns into one `rgba` pixel.
    pub fn with_image(self, url: &str, rgba: [u8; 4]) -> Self {
        self.with_bytes(url, rgba.to_vec())
    }

    /// Serve `bytes` verbatim for `url`.
    pub fn with_bytes(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }

    /// Hold loads of `url` until `gate` is released.
    pub fn gated(mut self, url: &str, gate: Gate) -> Self {
        self.gates.insert(url.to_string(), gate);
        self
    }

    /// Loads made for `url`.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.get(url).map(|c| *c).unwrap_or(0)
    }

    /// Calls made for any key.
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageLoader for MemoryImageLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>> {
        *self.calls.entry(url.to_string()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = self.gates.get(url) {
            gate.wait().await;
        }

        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| UserInfoError::Status {
                status: StatusCode::NOT_FOUND,
                url: url.to_string(),
            })
    }
}

/// Decodes exactly four bytes into a single RGBA pixel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolidDecoder;

impl ImageDecoder for SolidDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage> {
        let rgba: [u8; 4] = bytes.try_into().map_err(|_| {
            UserInfoError::Decode(format!(
                "expected 4 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(RgbaImage::from_pixel(1, 1, Rgba(rgba)))
    }
}

/// One call made on a [`RecordingSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceOp {
    /// Background colour filled.
    Fill([u8; 4]),
    /// Top-left pixel of the drawn source.
    Draw([u8; 4]),
    /// Contents encoded.
    Extract,
}

/// Shared view of the operations applied to a [`RecordingSurface`].
#[derive(Debug, Clone, Default)]
pub struct SurfaceLog(Arc<Mutex<Vec<SurfaceOp>>>);

impl SurfaceLog {
    /// Operations so far, oldest first.
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.0.lock().clone()
    }
}

/// Surface that records operations instead of rasterizing. `extract` yields
/// a short description of the last drawn pixel rather than a PNG.
#[derive(Debug)]
pub struct RecordingSurface {
    size: u32,
    log: SurfaceLog,
    last_draw: Option<[u8; 4]>,
}

impl RecordingSurface {
    /// Surface plus a log that outlives it once boxed.
    pub fn new(size: u32) -> (Self, SurfaceLog) {
        let log = SurfaceLog::default();
        (
            Self {
                size,
                log: log.clone(),
                last_draw: None,
            },
            log,
        )
    }

    /// Bytes `extract` returns after drawing a source of colour `rgba`.
    pub fn expected_output(size: u32, rgba: [u8; 4]) -> Vec<u8> {
        format!("{size}:{rgba:?}").into_bytes()
    }
}

impl RasterSurface for RecordingSurface {
    fn size(&self) -> u32 {
        self.size
    }

    fn fill(&mut self, color: Rgba<u8>) {
        self.last_draw = None;
        self.log.0.lock().push(SurfaceOp::Fill(color.0));
    }

    fn draw_scaled(&mut self, image: &RgbaImage) {
        let pixel =
            image.get_pixel_checked(0, 0).map(|p| p.0).unwrap_or([0; 4]);
        self.last_draw = Some(pixel);
        self.log.0.lock().push(SurfaceOp::Draw(pixel));
    }

    fn extract(&mut self) -> Result<Vec<u8>> {
        self.log.0.lock().push(SurfaceOp::Extract);
        let drawn = self.last_draw.unwrap_or([0; 4]);
        Ok(Self::expected_output(self.size, drawn))
    }
}
