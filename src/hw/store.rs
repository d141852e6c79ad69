//! Flash-backed asset store.
//!
//! A fixed flash region is divided into equal slots, one asset each.
//! Every slot starts with a small header (magic, payload length, name)
//! followed by the pixel payload. The directory is rebuilt from the
//! headers at boot, so a reset never loses committed entries; a write
//! interrupted by a reset leaves a slot without a valid magic and the
//! boot scan treats it as free.

use crate::cache::AssetStore;
use crate::config::{CACHE_SAFETY_MARGIN, IMAGE_BYTES, MAX_ASSET_NAME_LEN, MAX_CACHE_ENTRIES};
use crate::error::Error;
use embedded_storage::{ReadStorage, Storage};
use esp_storage::FlashStorage;
use heapless::{String, Vec};

/// Base of the asset region, above settings, clear of the app image.
const REGION_OFFSET: u32 = 0x0031_0000;

const SLOT_MAGIC: u32 = 0x5144_4153; // "QDAS"

/// magic + len + name_len + name, padded to a round header.
const HEADER_LEN: usize = 64;

/// Whole slot: header plus payload, kept slot-aligned so one free slot
/// always satisfies one `ensure_space(IMAGE_BYTES + margin)` request.
const SLOT_BYTES: usize = HEADER_LEN + IMAGE_BYTES + CACHE_SAFETY_MARGIN;

struct DirEntry {
    name: String<MAX_ASSET_NAME_LEN>,
    slot: usize,
    len: usize,
}

pub struct FlashStore {
    flash: FlashStorage,
    dir: Vec<DirEntry, MAX_CACHE_ENTRIES>,
}

impl FlashStore {
    /// Mount the region, scanning every slot header.
    pub fn mount(mut flash: FlashStorage) -> Self {
        let mut dir = Vec::new();
        for slot in 0..MAX_CACHE_ENTRIES {
            if let Some(entry) = read_header(&mut flash, slot) {
                defmt::debug!("store: slot {} holds {}", slot, entry.name.as_str());
                // Region capacity equals the loop bound; push cannot fail.
                let _ = dir.push(entry);
            }
        }
        defmt::info!("store: mounted, {} assets", dir.len());
        Self { flash, dir }
    }

    fn slot_offset(slot: usize) -> u32 {
        REGION_OFFSET + (slot * SLOT_BYTES) as u32
    }

    fn free_slot(&self) -> Option<usize> {
        (0..MAX_CACHE_ENTRIES).find(|s| !self.dir.iter().any(|e| e.slot == *s))
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.dir.iter().position(|e| e.name.as_str() == name)
    }
}

fn read_header(flash: &mut FlashStorage, slot: usize) -> Option<DirEntry> {
    let mut raw = [0u8; HEADER_LEN];
    flash.read(FlashStore::slot_offset(slot), &mut raw).ok()?;

    if u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) != SLOT_MAGIC {
        return None;
    }
    let len = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
    let name_len = raw[8] as usize;
    if len > IMAGE_BYTES + CACHE_SAFETY_MARGIN || name_len > MAX_ASSET_NAME_LEN {
        return None;
    }
    let text = core::str::from_utf8(&raw[9..9 + name_len]).ok()?;
    let mut name: String<MAX_ASSET_NAME_LEN> = String::new();
    name.push_str(text).ok()?;
    Some(DirEntry { name, slot, len })
}

impl AssetStore for FlashStore {
    fn entry_count(&self) -> usize {
        self.dir.len()
    }

    fn entry_name(&self, index: usize) -> Option<&str> {
        self.dir.get(index).map(|e| e.name.as_str())
    }

    fn free_space(&self) -> usize {
        (MAX_CACHE_ENTRIES - self.dir.len()) * SLOT_BYTES
    }

    fn size_of(&self, name: &str) -> Option<usize> {
        self.index_of(name).map(|i| self.dir[i].len)
    }

    fn read(&self, name: &str, buf: &mut [u8]) -> Result<usize, Error> {
        let entry = self
            .index_of(name)
            .map(|i| &self.dir[i])
            .ok_or(Error::Storage)?;
        if buf.len() < entry.len {
            return Err(Error::BufferOverflow);
        }
        // esp-storage read needs &mut; the directory itself is untouched.
        let mut flash = FlashStorage::new();
        flash
            .read(
                Self::slot_offset(entry.slot) + HEADER_LEN as u32,
                &mut buf[..entry.len],
            )
            .map_err(|_| Error::Storage)?;
        Ok(entry.len)
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        if name.len() > MAX_ASSET_NAME_LEN || data.len() > IMAGE_BYTES + CACHE_SAFETY_MARGIN {
            return Err(Error::Storage);
        }
        let slot = self.free_slot().ok_or(Error::InsufficientSpace)?;
        let offset = Self::slot_offset(slot);

        // Payload first, header last: the magic commits the entry, so
        // a reset mid-write leaves the slot invalid rather than short.
        self.flash
            .write(offset + HEADER_LEN as u32, data)
            .map_err(|_| Error::Storage)?;

        let mut header = [0xFFu8; HEADER_LEN];
        header[..4].copy_from_slice(&SLOT_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&(data.len() as u32).to_le_bytes());
        header[8] = name.len() as u8;
        header[9..9 + name.len()].copy_from_slice(name.as_bytes());
        self.flash
            .write(offset, &header)
            .map_err(|_| Error::Storage)?;

        let mut bounded: String<MAX_ASSET_NAME_LEN> = String::new();
        bounded.push_str(name).map_err(|_| Error::Storage)?;
        self.dir
            .push(DirEntry {
                name: bounded,
                slot,
                len: data.len(),
            })
            .map_err(|_| Error::Storage)?;
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), Error> {
        let index = self.index_of(name).ok_or(Error::Storage)?;
        let slot = self.dir[index].slot;

        // Clearing the magic is enough to free the slot.
        let blank = [0u8; 4];
        self.flash
            .write(Self::slot_offset(slot), &blank)
            .map_err(|_| Error::Storage)?;
        self.dir.swap_remove(index);
        Ok(())
    }
}
