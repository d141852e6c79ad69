//! Wire protocol with the relay peer.
//!
//! Messages travel as newline-delimited JSON over the peer socket. The
//! one exception is the `image` push: its JSON header line is followed
//! by exactly `size` raw payload bytes (JSON cannot carry raw pixels).
//!
//! Parsing is a single step producing the closed [`Inbound`] enum, so
//! unknown-kind handling is one match arm rather than string compares
//! scattered around the state machine.

use crate::config::{
    IMAGE_BYTES, MAX_ACTION_LEN, MAX_ASSET_NAME_LEN, MAX_LABEL_LEN, MAX_OVERRIDE_LEN,
    MAX_SESSION_ID_LEN, SURFACE_COUNT,
};
use crate::error::Error;
use crate::render::Rgb;
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

/// One button option slot as transmitted by the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OptionSpec {
    pub label: String<MAX_LABEL_LEN>,
    /// Keystrokes to inject upstream; empty means "use the label".
    pub action: String<MAX_ACTION_LEN>,
    pub image: Option<String<MAX_ASSET_NAME_LEN>>,
    pub color: Rgb,
}

/// Session status reported by the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusKind {
    Idle,
    Thinking,
    Waiting,
    Error,
    Limit,
    /// Status string we do not recognise; logged and ignored.
    Unknown,
}

/// A fully parsed inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Inbound {
    UpdateOptions {
        session_id: String<MAX_SESSION_ID_LEN>,
        options: Vec<OptionSpec, SURFACE_COUNT>,
    },
    Status {
        status: StatusKind,
        /// Only meaningful for [`StatusKind::Limit`]; 0 = duration unknown.
        countdown_secs: u32,
    },
    DisplayOverride {
        surface: usize,
        title: String<MAX_OVERRIDE_LEN>,
        content: String<MAX_OVERRIDE_LEN>,
    },
    /// Header of a push preload; `size` raw bytes follow on the socket.
    ImageHeader {
        name: String<MAX_ASSET_NAME_LEN>,
        size: usize,
    },
}

// Raw wire shape: every field optional so one struct covers all kinds.
// Borrowed strings keep the parse allocation-free.
#[derive(Deserialize)]
struct WireMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(borrow)]
    session_id: Option<&'a str>,
    options: Option<Vec<WireOption<'a>, SURFACE_COUNT>>,
    #[serde(borrow)]
    state: Option<&'a str>,
    countdown: Option<u32>,
    display: Option<usize>,
    #[serde(borrow)]
    title: Option<&'a str>,
    #[serde(borrow)]
    content: Option<&'a str>,
    #[serde(borrow)]
    name: Option<&'a str>,
    size: Option<usize>,
}

#[derive(Deserialize)]
struct WireOption<'a> {
    #[serde(borrow)]
    label: &'a str,
    #[serde(borrow)]
    action: Option<&'a str>,
    #[serde(borrow)]
    image: Option<&'a str>,
    #[serde(borrow)]
    color: Option<&'a str>,
}

/// Copy `s` into a bounded string, truncating at capacity.
pub fn bounded<const N: usize>(s: &str) -> String<N> {
    let mut out: String<N> = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// serde-json-core hands borrowed `&str` fields back as the raw slice of
// the document, escapes and all. Resolve them here while copying into
// the bounded string; malformed escapes are dropped rather than failing
// the whole frame.
fn unescape<const N: usize>(s: &str) -> String<N> {
    let mut out: String<N> = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        let decoded = if c == '\\' {
            match chars.next() {
                Some('n') => '\n',
                Some('r') => '\r',
                Some('t') => '\t',
                Some('b') => '\u{8}',
                Some('f') => '\u{c}',
                Some('u') => match unescape_codepoint(&mut chars) {
                    Some(u) => u,
                    None => continue,
                },
                // Covers \" \\ \/ and anything nonstandard.
                Some(other) => other,
                None => break,
            }
        } else {
            c
        };
        if out.push(decoded).is_err() {
            break;
        }
    }
    out
}

// Reads the 4 hex digits after `\u`, plus the second half of a
// surrogate pair when the first half demands one.
fn unescape_codepoint(chars: &mut core::str::Chars) -> Option<char> {
    let hi = hex4(chars)?;
    if (0xD800..=0xDBFF).contains(&hi) {
        if chars.next() != Some('\\') || chars.next() != Some('u') {
            return None;
        }
        let lo = hex4(chars)?;
        if !(0xDC00..=0xDFFF).contains(&lo) {
            return None;
        }
        let code = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
        char::from_u32(code)
    } else {
        char::from_u32(hi)
    }
}

fn hex4(chars: &mut core::str::Chars) -> Option<u32> {
    let mut v = 0u32;
    for _ in 0..4 {
        v = (v << 4) | chars.next()?.to_digit(16)?;
    }
    Some(v)
}

/// Parse one JSON frame (without its trailing newline).
pub fn parse(frame: &[u8]) -> Result<Inbound, Error> {
    let (msg, _rest) =
        serde_json_core::from_slice::<WireMessage>(frame).map_err(|_| Error::Parse)?;

    match msg.kind {
        "update_options" => {
            let mut options: Vec<OptionSpec, SURFACE_COUNT> = Vec::new();
            for opt in msg.options.ok_or(Error::Parse)?.iter() {
                let action = match opt.action {
                    Some(a) if !a.is_empty() => unescape(a),
                    // Action defaults to the label when unset.
                    _ => unescape(opt.label),
                };
                let spec = OptionSpec {
                    label: unescape(opt.label),
                    action,
                    image: opt.image.filter(|i| !i.is_empty()).map(unescape),
                    color: opt
                        .color
                        .and_then(Rgb::from_hex)
                        .unwrap_or(Rgb::SLOT_DEFAULT),
                };
                options.push(spec).map_err(|_| Error::Parse)?;
            }
            if options.len() != SURFACE_COUNT {
                return Err(Error::Parse);
            }
            Ok(Inbound::UpdateOptions {
                session_id: unescape(msg.session_id.unwrap_or("")),
                options,
            })
        }
        "status" => {
            let status = match msg.state.ok_or(Error::Parse)? {
                "idle" => StatusKind::Idle,
                "thinking" => StatusKind::Thinking,
                "waiting" | "waiting_for_input" => StatusKind::Waiting,
                "error" => StatusKind::Error,
                "limit" => StatusKind::Limit,
                _ => StatusKind::Unknown,
            };
            Ok(Inbound::Status {
                status,
                countdown_secs: msg.countdown.unwrap_or(0),
            })
        }
        "display_override" => {
            let surface = msg.display.ok_or(Error::Parse)?;
            if surface >= SURFACE_COUNT {
                return Err(Error::Parse);
            }
            Ok(Inbound::DisplayOverride {
                surface,
                title: unescape(msg.title.unwrap_or("")),
                content: unescape(msg.content.unwrap_or("")),
            })
        }
        "image" => {
            let name = msg.name.ok_or(Error::Parse)?;
            if name.is_empty() {
                return Err(Error::Parse);
            }
            Ok(Inbound::ImageHeader {
                name: unescape(name),
                size: msg.size.ok_or(Error::Parse)?,
            })
        }
        _ => Err(Error::Parse),
    }
}

/// Messages we emit to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outbound<'a> {
    KeyPress {
        session_id: &'a str,
        /// 1-based key index, matching the relay's expectations.
        key: u8,
        text: &'a str,
    },
    Register {
        device: &'a str,
        fw: &'a str,
    },
    Heartbeat,
}

#[derive(Serialize)]
struct WireKeyPress<'a> {
    r#type: &'a str,
    session_id: &'a str,
    key: u8,
    text: &'a str,
}

#[derive(Serialize)]
struct WireRegister<'a> {
    r#type: &'a str,
    device: &'a str,
    fw: &'a str,
}

#[derive(Serialize)]
struct WireHeartbeat<'a> {
    r#type: &'a str,
}

impl Outbound<'_> {
    /// Encode as one newline-terminated JSON frame. Returns the total
    /// number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let written = match *self {
            Outbound::KeyPress {
                session_id,
                key,
                text,
            } => serde_json_core::to_slice(
                &WireKeyPress {
                    r#type: "key_press",
                    session_id,
                    key,
                    text,
                },
                buf,
            ),
            Outbound::Register { device, fw } => serde_json_core::to_slice(
                &WireRegister {
                    r#type: "register",
                    device,
                    fw,
                },
                buf,
            ),
            Outbound::Heartbeat => {
                serde_json_core::to_slice(&WireHeartbeat { r#type: "heartbeat" }, buf)
            }
        }
        .map_err(|_| Error::BufferOverflow)?;

        if written >= buf.len() {
            return Err(Error::BufferOverflow);
        }
        buf[written] = b'\n';
        Ok(written + 1)
    }
}

/// Quick sanity bound applied by the socket layer before it commits to
/// reading an image payload.
pub fn image_size_valid(size: usize) -> bool {
    size == IMAGE_BYTES
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
