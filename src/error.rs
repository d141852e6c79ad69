//! Unified error type for quaddeck.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging when the
//! `defmt` feature is enabled.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Cache
    /// Eviction freed everything and the requested space still does
    /// not fit the store.
    InsufficientSpace,

    /// Asset download failed: network error, or a body whose length is
    /// not exactly the fixed image size.
    DownloadFailed,

    /// Flash read/write/erase failed, or a stored entry had the wrong
    /// length and was discarded.
    Storage,

    // Networking
    /// Peer socket is not connected; the message was not sent.
    Disconnected,

    /// Inbound frame was not valid JSON, or not a known message kind.
    Parse,

    /// Operation exceeded its hard time ceiling.
    Timeout,

    // Rendering
    /// Drawing to a display surface failed.
    Display,

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,
}
