//! Connectivity: wireless link supervision and the peer message
//! socket.
//!
//! Two distinct recovery policies, by design:
//!   - the wireless link reconnects with exponential backoff (doubling,
//!     capped, reset on success)
//!   - the peer socket reconnects at a fixed interval and heartbeats
//!     while connected
//!
//! Everything here is polled cooperatively from the event loop. Each
//! `service` call performs at most one unit of network progress and
//! returns; nothing blocks.

use crate::config::{
    DEVICE_MODEL, FIRMWARE_VERSION, HEARTBEAT_INTERVAL_MS, MAX_ASSET_NAME_LEN, MAX_FRAME_LEN,
    SOCKET_RECONNECT_INTERVAL_MS, WIFI_BACKOFF_BASE_MS, WIFI_BACKOFF_MAX_MS,
};
use crate::error::Error;
use crate::proto::{self, Inbound, Outbound};
use heapless::{String, Vec};

/// Wireless link driver. All calls are non-blocking.
pub trait WirelessLink {
    /// Stored credentials exist in device configuration.
    fn has_credentials(&self) -> bool;
    fn is_up(&self) -> bool;
    /// Kick one association attempt.
    fn start_connect(&mut self);
    /// Expose the local configuration access point; no further
    /// connection attempts will be made.
    fn enter_setup_mode(&mut self);
}

/// Peer message socket driver. All calls are non-blocking.
pub trait PeerSocket {
    fn is_connected(&self) -> bool;
    /// Kick one connect attempt toward the configured peer.
    fn start_connect(&mut self);
    fn send(&mut self, data: &[u8]) -> Result<(), Error>;
    /// Copy available bytes into `buf`; `Ok(0)` means nothing pending.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
    fn close(&mut self);
}

/// Doubling, capped retry delay.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    next_ms: u64,
}

impl Backoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            next_ms: base_ms,
        }
    }

    /// Delay to wait after the current failure; doubles the next one.
    pub fn advance(&mut self) -> u64 {
        let delay = self.next_ms;
        self.next_ms = (self.next_ms * 2).min(self.max_ms);
        delay
    }

    /// Any success resets the sequence to the base delay.
    pub fn reset(&mut self) {
        self.next_ms = self.base_ms;
    }

    pub fn current(&self) -> u64 {
        self.next_ms
    }
}

/// Drives a [`WirelessLink`] through the credentials gate and the
/// backoff reconnect policy.
pub struct LinkSupervisor<L: WirelessLink> {
    link: L,
    backoff: Backoff,
    next_attempt_ms: u64,
    setup_mode: bool,
    was_up: bool,
}

impl<L: WirelessLink> LinkSupervisor<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            backoff: Backoff::new(WIFI_BACKOFF_BASE_MS, WIFI_BACKOFF_MAX_MS),
            next_attempt_ms: 0,
            setup_mode: false,
            was_up: false,
        }
    }

    pub fn is_up(&self) -> bool {
        !self.setup_mode && self.link.is_up()
    }

    pub fn in_setup_mode(&self) -> bool {
        self.setup_mode
    }

    /// Drop whatever the link is doing and expose the configuration
    /// access point (reconfiguration combo).
    pub fn force_setup_mode(&mut self) {
        self.link.enter_setup_mode();
        self.setup_mode = true;
    }

    /// One unit of link progress per call.
    pub fn service(&mut self, now_ms: u64) {
        if self.setup_mode {
            return;
        }

        // No stored credentials: configuration AP only, never attempt
        // a connection.
        if !self.link.has_credentials() {
            self.force_setup_mode();
            return;
        }

        if self.link.is_up() {
            if !self.was_up {
                self.backoff.reset();
                self.was_up = true;
            }
            return;
        }

        if self.was_up {
            // Link just dropped; first retry happens immediately.
            self.was_up = false;
            self.next_attempt_ms = now_ms;
        }

        if now_ms >= self.next_attempt_ms {
            self.link.start_connect();
            // If the link is still down at the scheduled time, the
            // attempt counts as failed and the delay doubles.
            self.next_attempt_ms = now_ms + self.backoff.advance();
        }
    }
}

/// What one socket service pass produced.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Message(Inbound),
    /// Push preload completed; the payload sits in the scratch buffer.
    Image {
        name: String<MAX_ASSET_NAME_LEN>,
        len: usize,
    },
}

enum RxMode {
    /// Accumulating one newline-terminated JSON frame.
    Line,
    /// Copying an image payload into the scratch buffer.
    Payload {
        name: String<MAX_ASSET_NAME_LEN>,
        expected: usize,
        received: usize,
        /// Cleared when the header announced a bogus size; the payload
        /// is drained and dropped.
        keep: bool,
    },
}

/// Maintains the peer socket: fixed-interval reconnect, registration
/// on connect, heartbeats, and inbound frame assembly.
pub struct PeerSession<S: PeerSocket> {
    sock: S,
    was_connected: bool,
    next_attempt_ms: u64,
    last_heartbeat_ms: u64,
    line: Vec<u8, MAX_FRAME_LEN>,
    mode: RxMode,
    chunk: Vec<u8, 256>,
    chunk_pos: usize,
    parse_errors: u32,
}

impl<S: PeerSocket> PeerSession<S> {
    pub fn new(sock: S) -> Self {
        Self {
            sock,
            was_connected: false,
            next_attempt_ms: 0,
            last_heartbeat_ms: 0,
            line: Vec::new(),
            mode: RxMode::Line,
            chunk: Vec::new(),
            chunk_pos: 0,
            parse_errors: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sock.is_connected()
    }

    /// Frames that failed to parse and were dropped (diagnostics).
    pub fn parse_errors(&self) -> u32 {
        self.parse_errors
    }

    /// Send one message. `Disconnected` when the socket is down; the
    /// caller treats that as a logged no-op.
    pub fn send(&mut self, msg: &Outbound) -> Result<(), Error> {
        if !self.sock.is_connected() {
            return Err(Error::Disconnected);
        }
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = msg.encode(&mut buf)?;
        self.sock.send(&buf[..n])
    }

    /// One unit of socket progress: reconnect bookkeeping, one
    /// heartbeat if due, then at most one buffered chunk of inbound
    /// data. Returns the first completed event, if any.
    pub fn service(
        &mut self,
        now_ms: u64,
        link_up: bool,
        scratch: &mut [u8],
    ) -> Option<PeerEvent> {
        if !link_up {
            if self.was_connected {
                self.sock.close();
                self.reset_rx();
                self.was_connected = false;
            }
            return None;
        }

        if !self.sock.is_connected() {
            if self.was_connected {
                self.reset_rx();
                self.was_connected = false;
                // Drop edge: no reconnect kick on this pass. The stale
                // deadline from before the connection would otherwise
                // fire immediately and mask the disconnect from callers
                // that check connection state after servicing.
                self.next_attempt_ms = now_ms + SOCKET_RECONNECT_INTERVAL_MS;
                return None;
            }
            // Fixed reconnect cadence, not exponential.
            if now_ms >= self.next_attempt_ms {
                self.sock.start_connect();
                self.next_attempt_ms = now_ms + SOCKET_RECONNECT_INTERVAL_MS;
            }
            return None;
        }

        if !self.was_connected {
            self.was_connected = true;
            self.last_heartbeat_ms = now_ms;
            // Identify ourselves before anything else.
            let _ = self.send(&Outbound::Register {
                device: DEVICE_MODEL,
                fw: FIRMWARE_VERSION,
            });
        }

        if now_ms.saturating_sub(self.last_heartbeat_ms) >= HEARTBEAT_INTERVAL_MS {
            self.last_heartbeat_ms = now_ms;
            let _ = self.send(&Outbound::Heartbeat);
        }

        self.pump(scratch)
    }

    fn reset_rx(&mut self) {
        self.line.clear();
        self.chunk.clear();
        self.chunk_pos = 0;
        self.mode = RxMode::Line;
    }

    /// Feed buffered bytes through the frame assembler; refill the
    /// chunk from the socket when empty. Bounded by one chunk per call.
    fn pump(&mut self, scratch: &mut [u8]) -> Option<PeerEvent> {
        if self.chunk_pos >= self.chunk.len() {
            self.chunk.clear();
            self.chunk_pos = 0;
            let mut raw = [0u8; 256];
            match self.sock.recv(&mut raw) {
                Ok(0) | Err(_) => return None,
                Ok(n) => {
                    // Capacity equals the read buffer; cannot overflow.
                    let _ = self.chunk.extend_from_slice(&raw[..n]);
                }
            }
        }

        while self.chunk_pos < self.chunk.len() {
            let byte = self.chunk[self.chunk_pos];
            self.chunk_pos += 1;
            if let Some(event) = self.feed(byte, scratch) {
                return Some(event);
            }
        }
        None
    }

    fn feed(&mut self, byte: u8, scratch: &mut [u8]) -> Option<PeerEvent> {
        match &mut self.mode {
            RxMode::Line => {
                if byte != b'\n' {
                    if self.line.push(byte).is_err() {
                        // Frame longer than any legal message: drop it.
                        self.line.clear();
                        self.parse_errors = self.parse_errors.saturating_add(1);
                    }
                    return None;
                }
                let result = proto::parse(&self.line);
                self.line.clear();
                match result {
                    Ok(Inbound::ImageHeader { name, size }) => {
                        // Raw payload follows; a bogus size is drained
                        // and dropped rather than stored.
                        let keep = proto::image_size_valid(size) && size <= scratch.len();
                        self.mode = RxMode::Payload {
                            name,
                            expected: size,
                            received: 0,
                            keep,
                        };
                        None
                    }
                    Ok(msg) => Some(PeerEvent::Message(msg)),
                    Err(_) => {
                        // Malformed frames never take the session down.
                        self.parse_errors = self.parse_errors.saturating_add(1);
                        None
                    }
                }
            }
            RxMode::Payload {
                name,
                expected,
                received,
                keep,
            } => {
                if *keep {
                    scratch[*received] = byte;
                }
                *received += 1;
                if *received == *expected {
                    let done = if *keep {
                        Some(PeerEvent::Image {
                            name: name.clone(),
                            len: *expected,
                        })
                    } else {
                        self.parse_errors = self.parse_errors.saturating_add(1);
                        None
                    };
                    self.mode = RxMode::Line;
                    return done;
                }
                None
            }
        }
    }
}

/// The full connectivity manager: link supervision + peer session.
pub struct Connectivity<L: WirelessLink, S: PeerSocket> {
    pub link: LinkSupervisor<L>,
    pub peer: PeerSession<S>,
}

impl<L: WirelessLink, S: PeerSocket> Connectivity<L, S> {
    pub fn new(link: L, sock: S) -> Self {
        Self {
            link: LinkSupervisor::new(link),
            peer: PeerSession::new(sock),
        }
    }

    pub fn is_link_up(&self) -> bool {
        self.link.is_up()
    }

    pub fn is_peer_connected(&self) -> bool {
        self.link.is_up() && self.peer.is_connected()
    }

    pub fn send(&mut self, msg: &Outbound) -> Result<(), Error> {
        self.peer.send(msg)
    }

    /// One cooperative service pass.
    pub fn service(&mut self, now_ms: u64, scratch: &mut [u8]) -> Option<PeerEvent> {
        self.link.service(now_ms);
        self.peer.service(now_ms, self.link.is_up(), scratch)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
