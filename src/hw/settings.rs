//! Persisted device settings: link credentials and the peer address.
//!
//! Written by the configuration access point (out of scope here), read
//! once at boot. One small flash page, plain fixed-layout record with
//! a magic word so an erased page reads as "not provisioned".

use embedded_storage::{ReadStorage, Storage};
use esp_storage::FlashStorage;
use heapless::String;

/// Flash offset of the settings page, below the asset region.
const SETTINGS_OFFSET: u32 = 0x0030_0000;

const MAGIC: u32 = 0x5144_4B31; // "QDK1"

const MAX_SSID_LEN: usize = 32;
const MAX_PASS_LEN: usize = 64;

/// magic + ssid_len + ssid + pass_len + pass + peer ip
const RECORD_LEN: usize = 4 + 1 + MAX_SSID_LEN + 1 + MAX_PASS_LEN + 4;

#[derive(Clone, Debug)]
pub struct Settings {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_PASS_LEN>,
    pub peer_ip: [u8; 4],
}

impl Settings {
    /// Read the provisioned settings, or `None` on a fresh device.
    pub fn load(flash: &mut FlashStorage) -> Option<Settings> {
        let mut raw = [0u8; RECORD_LEN];
        flash.read(SETTINGS_OFFSET, &mut raw).ok()?;

        if u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) != MAGIC {
            return None;
        }

        let ssid = read_str::<MAX_SSID_LEN>(&raw[4..])?;
        let pass_at = 4 + 1 + MAX_SSID_LEN;
        let password = read_str::<MAX_PASS_LEN>(&raw[pass_at..])?;
        let ip_at = pass_at + 1 + MAX_PASS_LEN;
        let peer_ip = [raw[ip_at], raw[ip_at + 1], raw[ip_at + 2], raw[ip_at + 3]];

        defmt::info!("settings: ssid={} peer={}", ssid.as_str(), peer_ip);
        Some(Settings {
            ssid,
            password,
            peer_ip,
        })
    }

    /// Persist new settings (called from the configuration AP flow).
    pub fn save(&self, flash: &mut FlashStorage) -> Result<(), esp_storage::FlashStorageError> {
        let mut raw = [0u8; RECORD_LEN];
        raw[..4].copy_from_slice(&MAGIC.to_le_bytes());
        write_str(&mut raw[4..], self.ssid.as_str());
        let pass_at = 4 + 1 + MAX_SSID_LEN;
        write_str(&mut raw[pass_at..], self.password.as_str());
        let ip_at = pass_at + 1 + MAX_PASS_LEN;
        raw[ip_at..ip_at + 4].copy_from_slice(&self.peer_ip);
        flash.write(SETTINGS_OFFSET, &raw)
    }
}

fn read_str<const N: usize>(raw: &[u8]) -> Option<String<N>> {
    let len = raw[0] as usize;
    if len > N {
        return None;
    }
    let text = core::str::from_utf8(&raw[1..1 + len]).ok()?;
    let mut out: String<N> = String::new();
    out.push_str(text).ok()?;
    Some(out)
}

fn write_str(raw: &mut [u8], s: &str) {
    raw[0] = s.len() as u8;
    raw[1..1 + s.len()].copy_from_slice(s.as_bytes());
}
