//! Key input: per-key debouncing, a bounded press queue, and the
//! two-key reconfiguration combo.
//!
//! The scanner is fed raw pin levels once per tick and owns all
//! timing. Presses are queued and drained by the event loop so a
//! burst during a slow tick is not lost.

use crate::config::{
    BUTTON_DEBOUNCE_MS, KEY_QUEUE_DEPTH, SETUP_COMBO_KEYS, SETUP_COMBO_WINDOW_MS, SURFACE_COUNT,
};
use heapless::Deque;

/// A committed level change on one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Press,
    Release,
}

/// Classic two-phase debouncer: a raw change starts the timer, and the
/// new level is committed once it has held for the debounce window.
#[derive(Clone, Copy, Debug, Default)]
pub struct Debouncer {
    stable: bool,
    last_raw: bool,
    changed_at_ms: u64,
}

impl Debouncer {
    pub fn update(&mut self, now_ms: u64, raw: bool) -> Option<Edge> {
        if raw != self.last_raw {
            self.last_raw = raw;
            self.changed_at_ms = now_ms;
        }
        if raw != self.stable && now_ms.saturating_sub(self.changed_at_ms) >= BUTTON_DEBOUNCE_MS {
            self.stable = raw;
            return Some(if raw { Edge::Press } else { Edge::Release });
        }
        None
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }
}

/// Scans the four keys and produces queued presses plus the combo
/// signal.
pub struct InputScanner {
    keys: [Debouncer; SURFACE_COUNT],
    pressed_at: [Option<u64>; SURFACE_COUNT],
    queue: Deque<u8, KEY_QUEUE_DEPTH>,
    combo_latched: bool,
}

impl InputScanner {
    pub fn new() -> Self {
        Self {
            keys: [Debouncer::default(); SURFACE_COUNT],
            pressed_at: [None; SURFACE_COUNT],
            queue: Deque::new(),
            combo_latched: false,
        }
    }

    /// Feed one sample of raw pin levels (true = pressed). Returns
    /// true when the reconfiguration combo fired this sample.
    pub fn scan(&mut self, now_ms: u64, raw: [bool; SURFACE_COUNT]) -> bool {
        let mut combo = false;
        for (key, level) in raw.iter().enumerate() {
            match self.keys[key].update(now_ms, *level) {
                Some(Edge::Press) => {
                    self.pressed_at[key] = Some(now_ms);
                    if self.check_combo(key, now_ms) {
                        combo = true;
                    } else {
                        self.enqueue(key as u8);
                    }
                }
                Some(Edge::Release) => {
                    self.pressed_at[key] = None;
                    if key == SETUP_COMBO_KEYS.0 || key == SETUP_COMBO_KEYS.1 {
                        self.combo_latched = false;
                    }
                }
                None => {}
            }
        }
        combo
    }

    /// Next queued key press, oldest first.
    pub fn pop(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }

    fn enqueue(&mut self, key: u8) {
        // Drop the oldest press rather than the newest.
        if self.queue.is_full() {
            let _ = self.queue.pop_front();
        }
        let _ = self.queue.push_back(key);
    }

    /// The combo is both outer keys pressed within the window. It
    /// fires once per hold and swallows the pending presses so the
    /// session never sees the combo keys as input.
    fn check_combo(&mut self, key: usize, now_ms: u64) -> bool {
        if self.combo_latched {
            return false;
        }
        let other = if key == SETUP_COMBO_KEYS.0 {
            SETUP_COMBO_KEYS.1
        } else if key == SETUP_COMBO_KEYS.1 {
            SETUP_COMBO_KEYS.0
        } else {
            return false;
        };
        match self.pressed_at[other] {
            Some(t) if now_ms.saturating_sub(t) <= SETUP_COMBO_WINDOW_MS => {
                self.combo_latched = true;
                self.queue.clear();
                true
            }
            _ => false,
        }
    }
}

impl Default for InputScanner {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn held(key: usize) -> [bool; SURFACE_COUNT] {
        let mut raw = [false; SURFACE_COUNT];
        raw[key] = true;
        raw
    }

    #[test]
    fn short_glitch_is_ignored() {
        let mut d = Debouncer::default();
        assert_eq!(d.update(0, true), None);
        assert_eq!(d.update(10, true), None);
        // Bounce back before the window elapses.
        assert_eq!(d.update(20, false), None);
        assert_eq!(d.update(100, false), None);
        assert!(!d.is_pressed());
    }

    #[test]
    fn stable_press_and_release_emit_edges() {
        let mut d = Debouncer::default();
        assert_eq!(d.update(0, true), None);
        assert_eq!(d.update(BUTTON_DEBOUNCE_MS, true), Some(Edge::Press));
        assert!(d.is_pressed());
        // No repeat while held.
        assert_eq!(d.update(1_000, true), None);
        assert_eq!(d.update(2_000, false), None);
        assert_eq!(
            d.update(2_000 + BUTTON_DEBOUNCE_MS, false),
            Some(Edge::Release)
        );
        assert!(!d.is_pressed());
    }

    #[test]
    fn press_is_queued_and_popped() {
        let mut s = InputScanner::new();
        assert!(!s.scan(0, held(2)));
        assert!(!s.scan(BUTTON_DEBOUNCE_MS, held(2)));
        assert_eq!(s.pop(), Some(2));
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn queue_overflow_drops_oldest() {
        let mut s = InputScanner::new();
        let mut t = 0;
        // KEY_QUEUE_DEPTH + 1 presses of alternating keys.
        for i in 0..=KEY_QUEUE_DEPTH {
            let key = (i % 2) + 1; // keys 1 and 2, never the combo pair
            s.scan(t, held(key));
            t += BUTTON_DEBOUNCE_MS;
            s.scan(t, held(key));
            t += BUTTON_DEBOUNCE_MS;
            s.scan(t, [false; SURFACE_COUNT]);
            t += BUTTON_DEBOUNCE_MS;
            s.scan(t, [false; SURFACE_COUNT]);
            t += BUTTON_DEBOUNCE_MS;
        }
        // The first press (key 1) was dropped; the queue starts at the
        // second press (key 2).
        assert_eq!(s.pop(), Some(2));
        let mut drained = 1;
        while s.pop().is_some() {
            drained += 1;
        }
        assert_eq!(drained, KEY_QUEUE_DEPTH);
    }

    #[test]
    fn combo_within_window_fires_and_clears_queue() {
        let mut s = InputScanner::new();
        let (a, b) = SETUP_COMBO_KEYS;
        let mut raw = [false; SURFACE_COUNT];
        raw[a] = true;
        s.scan(0, raw);
        assert!(!s.scan(BUTTON_DEBOUNCE_MS, raw));
        raw[b] = true;
        s.scan(BUTTON_DEBOUNCE_MS + 100, raw);
        assert!(s.scan(BUTTON_DEBOUNCE_MS * 2 + 100, raw));
        // Neither key reaches the queue.
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn combo_outside_window_is_two_presses() {
        let mut s = InputScanner::new();
        let (a, b) = SETUP_COMBO_KEYS;
        let mut raw = [false; SURFACE_COUNT];
        raw[a] = true;
        s.scan(0, raw);
        s.scan(BUTTON_DEBOUNCE_MS, raw);
        let late = SETUP_COMBO_WINDOW_MS + 200;
        raw[b] = true;
        s.scan(late, raw);
        assert!(!s.scan(late + BUTTON_DEBOUNCE_MS, raw));
        assert_eq!(s.pop(), Some(a as u8));
        assert_eq!(s.pop(), Some(b as u8));
    }

    #[test]
    fn combo_fires_once_per_hold() {
        let mut s = InputScanner::new();
        let (a, b) = SETUP_COMBO_KEYS;
        let mut raw = [false; SURFACE_COUNT];
        raw[a] = true;
        raw[b] = true;
        s.scan(0, raw);
        assert!(s.scan(BUTTON_DEBOUNCE_MS, raw));
        // Still held: no retrigger.
        assert!(!s.scan(1_000, raw));
        // Full release re-arms it.
        s.scan(2_000, [false; SURFACE_COUNT]);
        s.scan(2_000 + BUTTON_DEBOUNCE_MS, [false; SURFACE_COUNT]);
        s.scan(3_000, raw);
        assert!(s.scan(3_000 + BUTTON_DEBOUNCE_MS, raw));
    }
}
