//! Application-wide constants and compile-time configuration.
//!
//! All display geometry, timing parameters, and protocol constants
//! live here so they can be tuned in one place.

// Surfaces & slots

/// Number of button/display pairs on the deck.
pub const SURFACE_COUNT: usize = 4;

/// Fixed asset geometry, device-wide. Every cached image is exactly
/// this size; anything else is rejected as corrupt.
pub const IMAGE_WIDTH: usize = 96;
pub const IMAGE_HEIGHT: usize = 96;

/// RGB565 = 2 bytes per pixel.
pub const IMAGE_BYTES: usize = IMAGE_WIDTH * IMAGE_HEIGHT * 2;

/// Capacity of slot label text.
pub const MAX_LABEL_LEN: usize = 32;

/// Capacity of slot action text (keystrokes sent upstream).
pub const MAX_ACTION_LEN: usize = 64;

/// Capacity of an asset name.
pub const MAX_ASSET_NAME_LEN: usize = 48;

/// Capacity of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 48;

/// Capacity of override title/content text.
pub const MAX_OVERRIDE_LEN: usize = 96;

// Wireless link

/// Initial reconnect delay after a failed link attempt (ms).
pub const WIFI_BACKOFF_BASE_MS: u64 = 1_000;

/// Ceiling for the doubling reconnect delay (ms).
pub const WIFI_BACKOFF_MAX_MS: u64 = 60_000;

// Peer socket

/// Fixed reconnect interval for the peer message socket (ms).
/// Deliberately not exponential - distinct policy from the link layer.
pub const SOCKET_RECONNECT_INTERVAL_MS: u64 = 5_000;

/// Heartbeat interval while the peer socket is connected (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// Well-known port of the peer's companion asset-download surface.
pub const ASSET_PORT: u16 = 8765;

/// Default port of the peer message socket.
pub const PEER_PORT: u16 = 8766;

/// Hard ceiling on one asset download, request to last byte (ms).
pub const DOWNLOAD_TIMEOUT_MS: u64 = 4_000;

/// Largest inbound JSON frame we accept (one line, without payload).
pub const MAX_FRAME_LEN: usize = 1_024;

// Asset cache

/// Extra free space demanded beyond the asset itself before a
/// download starts, so the store never fills to the last byte.
pub const CACHE_SAFETY_MARGIN: usize = 4_096;

/// Maximum number of directory entries the cache tracks.
pub const MAX_CACHE_ENTRIES: usize = 16;

// Input

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 30;

/// Window within which both combo keys must be held to enter
/// reconfiguration mode (ms).
pub const SETUP_COMBO_WINDOW_MS: u64 = 500;

/// Depth of the pending key-edge queue drained each tick.
pub const KEY_QUEUE_DEPTH: usize = 8;

/// Key indices of the setup combo (held together).
pub const SETUP_COMBO_KEYS: (usize, usize) = (0, 3);

// Event loop cadences

/// Main loop tick interval (ms).
pub const TICK_INTERVAL_MS: u64 = 20;

/// Countdown/timer face redraw cadence (ms).
pub const COUNTDOWN_TICK_MS: u64 = 1_000;

/// Alert glyph pulse cadence in the error state (ms).
pub const ALERT_PULSE_MS: u64 = 250;

/// LED animation phase cadence (ms).
pub const LED_PHASE_MS: u64 = 125;

/// Connecting-screen dot animation cadence (ms).
pub const SPINNER_TICK_MS: u64 = 400;

// Watchdog

/// Liveness watchdog timeout (ms). The tick must feed the watchdog
/// well inside this; expiry restarts the whole device.
pub const WATCHDOG_TIMEOUT_MS: u64 = 8_000;

// LED strip

/// Number of LEDs on the status strip.
pub const LED_COUNT: usize = 8;

// Identification

/// Device model string sent in the registration message.
pub const DEVICE_MODEL: &str = "quaddeck";

/// Firmware version sent in the registration message.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
