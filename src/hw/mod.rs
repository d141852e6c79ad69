//! ESP32 hardware glue (feature `embedded`).
//!
//! Everything here implements one of the library's trait seams on top
//! of esp-hal, esp-wifi and embassy-net. No session or cache logic
//! lives in this tree.

pub mod net;
pub mod panels;
pub mod settings;
pub mod store;
pub mod strip;
pub mod watchdog;
pub mod wifi;

use rand_core::RngCore;

/// SoC hardware RNG behind the `rand_core` seam the cache evicts with.
pub struct HwRng(esp_hal::rng::Rng);

impl HwRng {
    pub fn new(rng: esp_hal::rng::Rng) -> Self {
        Self(rng)
    }
}

impl RngCore for HwRng {
    fn next_u32(&mut self) -> u32 {
        self.0.random()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.0.random()) << 32) | u64::from(self.0.random())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.0.random().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
