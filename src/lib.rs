//! quaddeck core: a four-key, four-display WiFi control deck.
//!
//! Everything in this library is pure logic testable on the host: the
//! session state machine, surface rendering, the flash asset cache,
//! connectivity supervision, input debouncing and the tick-driven
//! composition in [`tick::Device`]. Hardware enters only through the
//! trait seams ([`render::Panel`], [`cache::AssetStore`],
//! [`link::WirelessLink`], [`link::PeerSocket`], [`leds::LedStrip`],
//! [`tick::Watchdog`]); the embedded binary (feature `embedded`)
//! provides the ESP32 implementations in `hw/` and `main.rs`.
//!
//! Host testing: `cargo test`
//! Target build: `cargo build --release --features embedded`

#![cfg_attr(not(test), no_std)]

pub mod buttons;
pub mod cache;
pub mod config;
pub mod error;
pub mod leds;
pub mod link;
pub mod proto;
pub mod render;
pub mod session;
pub mod tick;

#[cfg(feature = "embedded")]
pub mod hw;

pub use error::Error;
