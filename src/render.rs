//! Display rendering for the four surfaces.
//!
//! Hardware sits behind the [`Panel`] trait; the layout functions here
//! only decide what goes where. [`render_state`] is the single
//! state-to-layout dispatch point, so adding a state is one local
//! change rather than branches scattered across input/LED/render code.
//!
//! Layout fixed points (everything else is cosmetic):
//!   - `RateLimited` owns the timer on surface 0, CONTINUE on surface 3
//!   - `Error` owns the pulsing alert on surface 0, RETRY on surface 2,
//!     CONTINUE on surface 3
//!   - surfaces with `manual_override` set are never touched here

use crate::config::SURFACE_COUNT;
use crate::session::{ButtonSlot, OperatingState, SessionMachine, TimerFace};
use core::fmt::Write;
use heapless::String;

/// 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
    pub const RED: Rgb = Rgb::new(0xE0, 0x10, 0x10);
    pub const GREEN: Rgb = Rgb::new(0x10, 0xC0, 0x10);
    pub const BLUE: Rgb = Rgb::new(0x20, 0x40, 0xE0);
    pub const AMBER: Rgb = Rgb::new(0xFF, 0xA0, 0x00);
    pub const ORANGE: Rgb = Rgb::new(0xFF, 0x60, 0x00);

    /// Background used when the peer sends no slot color.
    pub const SLOT_DEFAULT: Rgb = Rgb::new(0x20, 0x20, 0x28);

    /// Parse `#RRGGBB`.
    pub fn from_hex(s: &str) -> Option<Rgb> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let byte = |r: &str| u8::from_str_radix(r, 16).ok();
        Some(Rgb::new(
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
        ))
    }

    /// Scale brightness by `level / 255`.
    pub fn dim(self, level: u8) -> Rgb {
        let scale = |c: u8| ((c as u16 * level as u16) / 255) as u8;
        Rgb::new(scale(self.r), scale(self.g), scale(self.b))
    }

    /// Pack as RGB565 for the panel framebuffers.
    pub fn to_rgb565(self) -> u16 {
        ((self.r as u16 & 0xF8) << 8) | ((self.g as u16 & 0xFC) << 3) | (self.b as u16 >> 3)
    }
}

/// One of the four display surfaces.
///
/// Implementations buffer draw calls and present on `flush`. Drawing
/// must not fail visibly; hardware errors are swallowed or logged by
/// the implementation.
pub trait Panel {
    fn clear(&mut self, bg: Rgb);
    /// Small text on one of four lines (0..=3).
    fn text(&mut self, line: u8, s: &str, color: Rgb);
    /// Large centered text (labels, timer digits).
    fn big_text(&mut self, s: &str, color: Rgb);
    /// Full-surface raw RGB565 image.
    fn image(&mut self, pixels: &[u8]);
    fn flush(&mut self);
}

/// Resolves an asset name to pixel bytes, downloading on miss.
/// A `None` means "no image" and the caller falls back to text.
pub trait AssetProvider {
    fn load(&mut self, name: &str, buf: &mut [u8]) -> Option<usize>;
}

/// Animation phases owned by the event loop's timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Anim {
    /// Connecting-screen dot count (0..=3).
    pub spinner_dots: u8,
    /// Alert glyph bright phase.
    pub pulse_on: bool,
}

/// Format seconds as `MM:SS` (or `H:MM:SS` past the hour).
pub fn format_clock(secs: u64) -> String<12> {
    let mut out: String<12> = String::new();
    let (h, m, s) = (secs / 3_600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        let _ = write!(out, "{}:{:02}:{:02}", h, m, s);
    } else {
        let _ = write!(out, "{:02}:{:02}", m, s);
    }
    out
}

pub fn draw_blank<P: Panel>(panel: &mut P) {
    panel.clear(Rgb::BLACK);
    panel.flush();
}

/// Render one option slot: cached image when it resolves, otherwise
/// the label centered on the slot color. Never fails.
pub fn draw_slot<P: Panel>(
    panel: &mut P,
    slot: &ButtonSlot,
    assets: &mut impl AssetProvider,
    pixbuf: &mut [u8],
) {
    if let Some(name) = slot.image.as_ref() {
        if let Some(n) = assets.load(name.as_str(), pixbuf) {
            panel.image(&pixbuf[..n]);
            panel.flush();
            return;
        }
    }
    panel.clear(slot.color);
    panel.big_text(slot.label.as_str(), Rgb::WHITE);
    panel.flush();
}

pub fn draw_connecting<P: Panel>(panel: &mut P, link_up: bool, dots: u8) {
    panel.clear(Rgb::BLACK);
    let stage = if link_up { "peer" } else { "wifi" };
    panel.text(0, stage, Rgb::WHITE);
    let dot_str = match dots % 4 {
        0 => "",
        1 => ".",
        2 => "..",
        _ => "...",
    };
    panel.text(1, dot_str, Rgb::AMBER);
    panel.flush();
}

/// Countdown/elapsed timer face (surface 0 while rate-limited).
pub fn draw_timer<P: Panel>(panel: &mut P, face: TimerFace) {
    panel.clear(Rgb::BLACK);
    match face {
        TimerFace::Remaining(secs) => {
            panel.text(0, "limit", Rgb::ORANGE);
            panel.big_text(format_clock(secs).as_str(), Rgb::WHITE);
        }
        TimerFace::Elapsed(secs) => {
            panel.text(0, "limit", Rgb::ORANGE);
            panel.big_text(format_clock(secs).as_str(), Rgb::WHITE);
            panel.text(3, "elapsed", Rgb::ORANGE);
        }
    }
    panel.flush();
}

/// Pulsing alert glyph (surface 0 in the error state).
pub fn draw_alert<P: Panel>(panel: &mut P, pulse_on: bool) {
    panel.clear(Rgb::BLACK);
    let color = if pulse_on { Rgb::RED } else { Rgb::RED.dim(60) };
    panel.big_text("!", color);
    panel.text(3, "error", Rgb::WHITE);
    panel.flush();
}

/// Fixed affordance surface ("CONTINUE", "RETRY").
pub fn draw_affordance<P: Panel>(panel: &mut P, label: &str, color: Rgb) {
    panel.clear(Rgb::SLOT_DEFAULT);
    panel.big_text(label, color);
    panel.flush();
}

/// Out-of-band content pushed by `display_override`.
pub fn draw_override<P: Panel>(panel: &mut P, title: &str, content: &str) {
    panel.clear(Rgb::BLACK);
    panel.text(0, title, Rgb::AMBER);
    panel.text(2, content, Rgb::WHITE);
    panel.flush();
}

/// Re-render every non-overridden surface for the current state.
pub fn render_state<P: Panel>(
    panels: &mut [P; SURFACE_COUNT],
    machine: &SessionMachine,
    assets: &mut impl AssetProvider,
    pixbuf: &mut [u8],
    now_ms: u64,
    anim: Anim,
    link_up: bool,
) {
    for (i, panel) in panels.iter_mut().enumerate() {
        if machine.slot(i).manual_override {
            continue;
        }
        match machine.state() {
            OperatingState::Connecting => match i {
                0 => draw_connecting(panel, link_up, anim.spinner_dots),
                _ => draw_blank(panel),
            },
            OperatingState::Idle
            | OperatingState::Thinking
            | OperatingState::WaitingForInput => {
                draw_slot(panel, machine.slot(i), assets, pixbuf)
            }
            OperatingState::Error => match i {
                0 => draw_alert(panel, anim.pulse_on),
                2 => draw_affordance(panel, "RETRY", Rgb::AMBER),
                3 => draw_affordance(panel, "CONTINUE", Rgb::GREEN),
                _ => draw_blank(panel),
            },
            OperatingState::RateLimited => match i {
                0 => {
                    if let Some(face) = machine.timer_face(now_ms) {
                        draw_timer(panel, face);
                    } else {
                        draw_blank(panel);
                    }
                }
                3 => draw_affordance(panel, "CONTINUE", Rgb::GREEN),
                _ => draw_blank(panel),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
