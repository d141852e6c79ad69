//! Content-addressed asset cache on limited onboard flash.
//!
//! Entries are named, fixed-size pixel blobs. An entry is either fully
//! present with exactly the expected byte length, or it does not exist;
//! short or oversized data is deleted, never served.
//!
//! Eviction is uniform random among existing entries. Deliberately not
//! LRU: the entry count strictly decreases every loop iteration, so the
//! space search always terminates.

use crate::config::{CACHE_SAFETY_MARGIN, IMAGE_BYTES, MAX_ASSET_NAME_LEN};
use crate::error::Error;
use crate::render::AssetProvider;
use heapless::String;
use rand_core::RngCore;

/// Named-blob storage with byte-addressable read/write semantics.
///
/// A `write` is all-or-nothing from the cache's point of view: after a
/// failed write the implementation may leave a partial entry behind,
/// which the cache immediately removes.
pub trait AssetStore {
    fn entry_count(&self) -> usize;
    /// Name of the entry at `index` (0..entry_count), unstable across
    /// mutations.
    fn entry_name(&self, index: usize) -> Option<&str>;
    fn free_space(&self) -> usize;
    /// Stored byte length of the named entry.
    fn size_of(&self, name: &str) -> Option<usize>;
    /// Copy the entry into `buf`, returning the byte count.
    fn read(&self, name: &str, buf: &mut [u8]) -> Result<usize, Error>;
    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), Error>;
    fn remove(&mut self, name: &str) -> Result<(), Error>;
}

/// Bounded network fetch of one asset from the peer's companion
/// download surface. Implementations enforce the download timeout.
pub trait AssetSource {
    fn download(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, Error>;
}

pub struct AssetCache<S: AssetStore> {
    store: S,
}

impl<S: AssetStore> AssetCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// A valid, complete entry exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.store.size_of(name) == Some(IMAGE_BYTES)
    }

    /// Read the asset into `buf`. A stored entry with the wrong length
    /// is deleted and reported as a miss.
    pub fn fetch(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, Error> {
        match self.store.size_of(name) {
            None => Err(Error::Storage),
            Some(IMAGE_BYTES) => {
                let n = self.store.read(name, buf)?;
                if n != IMAGE_BYTES {
                    let _ = self.store.remove(name);
                    return Err(Error::Storage);
                }
                Ok(n)
            }
            Some(_) => {
                // Corruption cleanup: a partial download that survived
                // a reset, or a geometry change.
                let _ = self.store.remove(name);
                Err(Error::Storage)
            }
        }
    }

    /// Free space until at least `required` bytes fit, evicting one
    /// random entry per iteration. Fails with `InsufficientSpace` once
    /// no entries remain and the request still does not fit.
    pub fn ensure_space(&mut self, required: usize, rng: &mut impl RngCore) -> Result<(), Error> {
        while self.store.free_space() < required {
            let count = self.store.entry_count();
            if count == 0 {
                return Err(Error::InsufficientSpace);
            }
            let index = (rng.next_u32() as usize) % count;
            let victim: String<MAX_ASSET_NAME_LEN> = match self.store.entry_name(index) {
                Some(name) => crate::proto::bounded(name),
                None => return Err(Error::Storage),
            };
            // Must strictly reduce the entry count, or the loop above
            // could spin forever.
            self.store.remove(victim.as_str())?;
        }
        Ok(())
    }

    /// Download-on-miss. After success the asset is served by `fetch`.
    pub fn ensure_and_download(
        &mut self,
        name: &str,
        source: &mut impl AssetSource,
        rng: &mut impl RngCore,
        buf: &mut [u8],
    ) -> Result<(), Error> {
        if self.contains(name) {
            return Ok(());
        }

        self.ensure_space(IMAGE_BYTES + CACHE_SAFETY_MARGIN, rng)?;

        let n = source.download(name, buf).map_err(|e| match e {
            Error::InsufficientSpace => Error::InsufficientSpace,
            _ => Error::DownloadFailed,
        })?;
        if n != IMAGE_BYTES {
            // Wrong-size body: nothing was persisted, reject outright.
            return Err(Error::DownloadFailed);
        }

        if let Err(e) = self.store.write(name, &buf[..n]) {
            // Never keep a partial entry.
            let _ = self.store.remove(name);
            return Err(e);
        }
        Ok(())
    }

    /// Direct push from an `image` message, bypassing the network
    /// fetch. Same exact-size rule as downloads.
    pub fn insert(&mut self, name: &str, data: &[u8], rng: &mut impl RngCore) -> Result<(), Error> {
        if data.len() != IMAGE_BYTES {
            return Err(Error::Storage);
        }
        if self.contains(name) {
            self.store.remove(name)?;
        }
        self.ensure_space(IMAGE_BYTES + CACHE_SAFETY_MARGIN, rng)?;
        if let Err(e) = self.store.write(name, data) {
            let _ = self.store.remove(name);
            return Err(e);
        }
        Ok(())
    }
}

/// Glue that gives the renderer its download-on-miss view of the
/// cache: fetch, and on a miss run one download then retry once.
pub struct CachedAssets<'a, S: AssetStore, F: AssetSource, R: RngCore> {
    pub cache: &'a mut AssetCache<S>,
    pub source: &'a mut F,
    pub rng: &'a mut R,
}

impl<S: AssetStore, F: AssetSource, R: RngCore> AssetProvider for CachedAssets<'_, S, F, R> {
    fn load(&mut self, name: &str, buf: &mut [u8]) -> Option<usize> {
        if let Ok(n) = self.cache.fetch(name, buf) {
            return Some(n);
        }
        self.cache
            .ensure_and_download(name, self.source, self.rng, buf)
            .ok()?;
        self.cache.fetch(name, buf).ok()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
