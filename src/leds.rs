//! Status strip patterns.
//!
//! `led_frame` is a pure mapping from device status to one strip
//! frame; the event loop calls it on every animation phase step and
//! hands the result to the strip driver.

use crate::config::LED_COUNT;
use crate::error::Error;
use crate::render::Rgb;
use crate::session::OperatingState;

/// Strip output seam, implemented over WS2812 on target.
pub trait LedStrip {
    fn show(&mut self, frame: &[Rgb; LED_COUNT]) -> Result<(), Error>;
}

/// Compute one strip frame. `phase` advances once per `LED_PHASE_MS`
/// and drives blink, pulse and chase animations.
pub fn led_frame(
    state: OperatingState,
    link_up: bool,
    peer_connected: bool,
    phase: u8,
) -> [Rgb; LED_COUNT] {
    // Connectivity trouble overrides whatever the session is doing.
    if !link_up {
        return if phase % 2 == 0 {
            [Rgb::RED; LED_COUNT]
        } else {
            [Rgb::BLACK; LED_COUNT]
        };
    }
    if !peer_connected {
        return chase(Rgb::AMBER, phase);
    }

    match state {
        OperatingState::Connecting => chase(Rgb::AMBER, phase),
        OperatingState::Idle => [Rgb::GREEN.dim(40); LED_COUNT],
        OperatingState::Thinking => [Rgb::BLUE.dim(pulse_level(phase)); LED_COUNT],
        OperatingState::WaitingForInput => [Rgb::WHITE; LED_COUNT],
        OperatingState::Error => [Rgb::RED.dim(pulse_level(phase)); LED_COUNT],
        OperatingState::RateLimited => [Rgb::ORANGE; LED_COUNT],
    }
}

/// One bright pixel walking the strip.
fn chase(color: Rgb, phase: u8) -> [Rgb; LED_COUNT] {
    let mut frame = [color.dim(25); LED_COUNT];
    frame[phase as usize % LED_COUNT] = color;
    frame
}

/// Triangle wave over 16 phase steps, dim levels 25..=95.
fn pulse_level(phase: u8) -> u8 {
    let step = phase % 16;
    let ramp = if step < 8 { step } else { 15 - step };
    25 + ramp * 10
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_down_blinks_red_regardless_of_state() {
        let on = led_frame(OperatingState::Idle, false, false, 0);
        let off = led_frame(OperatingState::Thinking, false, false, 1);
        assert!(on.iter().all(|&c| c == Rgb::RED));
        assert!(off.iter().all(|&c| c == Rgb::BLACK));
    }

    #[test]
    fn peer_down_shows_amber_chase() {
        let frame = led_frame(OperatingState::Idle, true, false, 3);
        assert_eq!(frame[3], Rgb::AMBER);
        assert!(frame
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 3)
            .all(|(_, &c)| c == Rgb::AMBER.dim(25)));
    }

    #[test]
    fn chase_pixel_advances_with_phase() {
        let a = led_frame(OperatingState::Connecting, true, true, 0);
        let b = led_frame(OperatingState::Connecting, true, true, 1);
        assert_eq!(a[0], Rgb::AMBER);
        assert_eq!(b[1], Rgb::AMBER);
        assert_ne!(a, b);
    }

    #[test]
    fn steady_states_are_uniform() {
        let idle = led_frame(OperatingState::Idle, true, true, 7);
        assert!(idle.iter().all(|&c| c == idle[0]));
        let limited = led_frame(OperatingState::RateLimited, true, true, 2);
        assert!(limited.iter().all(|&c| c == Rgb::ORANGE));
        let waiting = led_frame(OperatingState::WaitingForInput, true, true, 9);
        assert!(waiting.iter().all(|&c| c == Rgb::WHITE));
    }

    #[test]
    fn pulse_breathes_between_phases() {
        let dimmer = led_frame(OperatingState::Thinking, true, true, 0);
        let brighter = led_frame(OperatingState::Thinking, true, true, 7);
        assert_ne!(dimmer[0], brighter[0]);
    }

    #[test]
    fn pulse_level_stays_in_range() {
        for phase in 0..=255u8 {
            let level = pulse_level(phase);
            assert!((25..=105).contains(&level));
        }
    }
}
