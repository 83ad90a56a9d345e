//! Displayable image resources produced by the compositor.
//!
//! A thumbnail is handed to the UI either as a self-contained data URL or as
//! a `blob:` object URL whose bytes live in an [`ObjectUrlStore`]. Object URLs
//! are allocations: the record slot that owns the [`ThumbnailResource`] is
//! responsible for them, and dropping the resource revokes the URL.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use userinfo_config::ThumbnailEncoding;

const OBJECT_URL_PREFIX: &str = "blob:userinfo/";
const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Cheap, cloneable view of a thumbnail for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DerivedImage {
    /// `data:image/png;base64,...`
    DataUrl(Arc<str>),
    /// `blob:userinfo/<uuid>`; only resolvable until revoked.
    ObjectUrl(Arc<str>),
}

impl DerivedImage {
    /// URL to hand to a renderer.
    pub fn url(&self) -> &str {
        match self {
            DerivedImage::DataUrl(url) | DerivedImage::ObjectUrl(url) => url,
        }
    }

    /// Whether the image must be released after use.
    pub fn is_object_url(&self) -> bool {
        matches!(self, DerivedImage::ObjectUrl(_))
    }
}

impl fmt::Display for DerivedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Data URLs are long; keep log lines readable.
            DerivedImage::DataUrl(url) => {
                write!(f, "data-url({} bytes)", url.len())
            }
            DerivedImage::ObjectUrl(url) => f.write_str(url),
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    blobs: DashMap<Arc<str>, Arc<[u8]>>,
    created: AtomicU64,
    revoked: AtomicU64,
}

/// Registry of allocated object URLs.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlStore {
    inner: Arc<StoreInner>,
}

impl ObjectUrlStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new object URL for `bytes`.
    pub fn create(&self, bytes: Vec<u8>) -> Arc<str> {
        let url: Arc<str> =
            Arc::from(format!("{OBJECT_URL_PREFIX}{}", uuid::Uuid::new_v4()));
        self.inner.blobs.insert(url.clone(), Arc::from(bytes));
        self.inner.created.fetch_add(1, Ordering::Relaxed);
        url
    }

    /// Bytes behind `url` unless it was revoked.
    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.inner.blobs.get(url).map(|entry| entry.value().clone())
    }

    /// Release an object URL. Returns `false` if it was unknown or already
    /// revoked.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.inner.blobs.remove(url).is_some();
        if removed {
            self.inner.revoked.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Number of object URLs currently allocated.
    pub fn live_count(&self) -> usize {
        self.inner.blobs.len()
    }

    /// Object URLs released so far.
    pub fn revoked_count(&self) -> u64 {
        self.inner.revoked.load(Ordering::Relaxed)
    }

    /// Object URLs allocated so far.
    pub fn created_count(&self) -> u64 {
        self.inner.created.load(Ordering::Relaxed)
    }

    /// PNG bytes behind a derived image, if it is still valid.
    pub fn read(&self, image: &DerivedImage) -> Option<Vec<u8>> {
        match image {
            DerivedImage::ObjectUrl(url) => {
                self.resolve(url).map(|bytes| bytes.to_vec())
            }
            DerivedImage::DataUrl(url) => url
                .strip_prefix(PNG_DATA_URL_PREFIX)
                .and_then(|payload| BASE64.decode(payload).ok()),
        }
    }
}

/// Owning handle for a composited thumbnail.
///
/// Dropping it releases the underlying allocation.
pub struct ThumbnailResource {
    image: DerivedImage,
    store: Option<ObjectUrlStore>,
}

impl ThumbnailResource {
    /// Borrow the displayable image.
    pub fn image(&self) -> &DerivedImage {
        &self.image
    }
}

impl fmt::Debug for ThumbnailResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailResource")
            .field("image", &format_args!("{}", self.image))
            .finish()
    }
}

impl Drop for ThumbnailResource {
    fn drop(&mut self) {
        if let (Some(store), DerivedImage::ObjectUrl(url)) =
            (&self.store, &self.image)
        {
            store.revoke(url);
        }
    }
}

/// Turns extracted PNG bytes into a displayable resource.
#[derive(Debug, Clone)]
pub struct ThumbnailOutput {
    encoding: ThumbnailEncoding,
    store: ObjectUrlStore,
}

impl ThumbnailOutput {
    /// Output in `encoding`; object URLs are allocated from `store`.
    pub fn new(encoding: ThumbnailEncoding, store: ObjectUrlStore) -> Self {
        Self { encoding, store }
    }

    /// Data URL output; nothing to release.
    pub fn data_url() -> Self {
        Self::new(ThumbnailEncoding::DataUrl, ObjectUrlStore::new())
    }

    /// Encoding applied by [`materialize`](Self::materialize).
    pub fn encoding(&self) -> ThumbnailEncoding {
        self.encoding
    }

    /// Store object URLs are allocated from.
    pub fn store(&self) -> &ObjectUrlStore {
        &self.store
    }

    /// Wrap PNG bytes in the configured encoding.
    pub fn materialize(&self, png: Vec<u8>) -> ThumbnailResource {
        match self.encoding {
            ThumbnailEncoding::DataUrl => ThumbnailResource {
                image: DerivedImage::DataUrl(Arc::from(format!(
                    "{PNG_DATA_URL_PREFIX}{}",
                    BASE64.encode(&png)
                ))),
                store: None,
            },
            ThumbnailEncoding::ObjectUrl => ThumbnailResource {
                image: DerivedImage::ObjectUrl(self.store.create(png)),
                store: Some(self.store.clone()),
            },
        }
    }
}
