//! Session state machine.
//!
//! Owns the operating state, the four button option slots and the
//! rate-limit record. All mutation happens from the event loop's
//! thread of control; there is no locking.
//!
//! The machine never draws. It reports what changed through
//! [`Applied`]/[`KeyOutcome`] and the event loop re-renders the
//! non-overridden surfaces accordingly.

use crate::config::{MAX_ACTION_LEN, MAX_ASSET_NAME_LEN, MAX_LABEL_LEN, MAX_SESSION_ID_LEN, SURFACE_COUNT};
use crate::proto::{bounded, Inbound, OptionSpec, StatusKind};
use crate::render::Rgb;
use heapless::String;

/// Exclusive device operating state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingState {
    /// Initial state: waiting for link + peer. Only left via `status`.
    Connecting,
    Idle,
    Thinking,
    WaitingForInput,
    Error,
    RateLimited,
}

/// One button/display pairing.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonSlot {
    pub label: String<MAX_LABEL_LEN>,
    /// Text sent upstream in `key_press`; defaults to `label`.
    pub action: String<MAX_ACTION_LEN>,
    pub image: Option<String<MAX_ASSET_NAME_LEN>>,
    pub color: Rgb,
    /// Set by `display_override`; state rendering must not touch the
    /// surface until the next transition clears this.
    pub manual_override: bool,
}

impl ButtonSlot {
    pub fn empty() -> Self {
        Self {
            label: String::new(),
            action: String::new(),
            image: None,
            color: Rgb::SLOT_DEFAULT,
            manual_override: false,
        }
    }
}

/// Rate-limit bookkeeping, created on entering `RateLimited`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RateLimit {
    pub started_at_ms: u64,
    /// 0 = duration unknown; show elapsed instead of remaining time.
    pub countdown_secs: u32,
}

/// What the countdown surface should show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerFace {
    Remaining(u64),
    Elapsed(u64),
}

/// Result of dispatching one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Applied {
    /// Nothing changed (unknown status, self-transition, ...).
    None,
    /// Slots were replaced; re-render non-overridden surfaces.
    Options,
    /// State changed; re-render non-overridden surfaces.
    State,
    /// One surface went manual; caller renders the override content.
    Override { surface: usize },
    /// Asset push; caller forwards the payload to the cache.
    Image,
}

/// Result of one debounced key press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyOutcome {
    /// Consumed by a state-specific rule; nothing goes upstream.
    Ignored,
    /// Emit `key_press` for this slot (1-based key index).
    Emit { key: u8 },
    /// Emit `key_press` and re-render: the press also transitioned.
    EmitAndRender { key: u8 },
}

/// Key index of the CONTINUE affordance (rightmost key).
pub const CONTINUE_KEY: usize = 3;

/// Key index of the RETRY affordance in the error state.
pub const RETRY_KEY: usize = 2;

pub struct SessionMachine {
    state: OperatingState,
    previous: OperatingState,
    slots: [ButtonSlot; SURFACE_COUNT],
    session_id: String<MAX_SESSION_ID_LEN>,
    rate_limit: Option<RateLimit>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: OperatingState::Connecting,
            previous: OperatingState::Connecting,
            slots: [
                ButtonSlot::empty(),
                ButtonSlot::empty(),
                ButtonSlot::empty(),
                ButtonSlot::empty(),
            ],
            session_id: String::new(),
            rate_limit: None,
        }
    }

    pub fn state(&self) -> OperatingState {
        self.state
    }

    pub fn previous(&self) -> OperatingState {
        self.previous
    }

    pub fn slots(&self) -> &[ButtonSlot; SURFACE_COUNT] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> &ButtonSlot {
        &self.slots[index]
    }

    pub fn session_id(&self) -> &str {
        self.session_id.as_str()
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    /// Atomic state transition. No-op when `new` equals the current
    /// state. Otherwise: exit-actions, swap, clear manual overrides,
    /// entry-actions. Returns `true` when the caller must re-render.
    pub fn transition(&mut self, new: OperatingState, now_ms: u64) -> bool {
        if new == self.state {
            return false;
        }

        // Exit-actions of the old state.
        if self.state == OperatingState::RateLimited {
            self.rate_limit = None;
        }

        self.previous = self.state;
        self.state = new;

        // Every transition returns the surfaces to state-driven
        // rendering.
        for slot in self.slots.iter_mut() {
            slot.manual_override = false;
        }

        // Entry-actions of the new state.
        if new == OperatingState::RateLimited && self.rate_limit.is_none() {
            self.rate_limit = Some(RateLimit {
                started_at_ms: now_ms,
                countdown_secs: 0,
            });
        }

        true
    }

    /// Replace all four option slots. Empty action text falls back to
    /// the label. Always triggers a re-render of non-overridden
    /// surfaces; override flags survive (no transition happens here).
    pub fn update_options(&mut self, session_id: &str, options: &[OptionSpec]) {
        self.session_id = bounded(session_id);
        for (slot, spec) in self.slots.iter_mut().zip(options.iter()) {
            slot.label = spec.label.clone();
            slot.action = if spec.action.is_empty() {
                bounded(spec.label.as_str())
            } else {
                spec.action.clone()
            };
            slot.image = spec.image.clone();
            slot.color = spec.color;
            // manual_override deliberately untouched.
        }
    }

    /// Mark one surface as manually driven until the next transition.
    pub fn mark_override(&mut self, surface: usize) {
        if surface < SURFACE_COUNT {
            self.slots[surface].manual_override = true;
        }
    }

    /// Dispatch one parsed inbound message.
    pub fn handle_inbound(&mut self, msg: &Inbound, now_ms: u64) -> Applied {
        match msg {
            Inbound::UpdateOptions {
                session_id,
                options,
            } => {
                self.update_options(session_id.as_str(), options.as_slice());
                Applied::Options
            }
            Inbound::Status {
                status,
                countdown_secs,
            } => {
                let new = match status {
                    StatusKind::Idle => OperatingState::Idle,
                    StatusKind::Thinking => OperatingState::Thinking,
                    StatusKind::Waiting => OperatingState::WaitingForInput,
                    StatusKind::Error => OperatingState::Error,
                    StatusKind::Limit => OperatingState::RateLimited,
                    // Unknown status strings are ignored; the embedded
                    // glue logs them at the socket seam.
                    StatusKind::Unknown => return Applied::None,
                };
                let changed = self.transition(new, now_ms);
                if new == OperatingState::RateLimited {
                    // The countdown from the message wins even when we
                    // were already rate-limited.
                    match self.rate_limit.as_mut() {
                        Some(rl) => rl.countdown_secs = *countdown_secs,
                        None => {
                            self.rate_limit = Some(RateLimit {
                                started_at_ms: now_ms,
                                countdown_secs: *countdown_secs,
                            })
                        }
                    }
                }
                if changed {
                    Applied::State
                } else {
                    Applied::None
                }
            }
            Inbound::DisplayOverride { surface, .. } => {
                self.mark_override(*surface);
                Applied::Override { surface: *surface }
            }
            Inbound::ImageHeader { .. } => Applied::Image,
        }
    }

    /// What the timer surface shows right now, if any.
    pub fn timer_face(&self, now_ms: u64) -> Option<TimerFace> {
        let rl = self.rate_limit?;
        let elapsed_secs = now_ms.saturating_sub(rl.started_at_ms) / 1_000;
        if rl.countdown_secs == 0 {
            Some(TimerFace::Elapsed(elapsed_secs))
        } else {
            Some(TimerFace::Remaining(
                u64::from(rl.countdown_secs).saturating_sub(elapsed_secs),
            ))
        }
    }

    fn countdown_expired(&self, now_ms: u64) -> bool {
        matches!(self.timer_face(now_ms), Some(TimerFace::Remaining(0)))
    }

    /// Called once per countdown tick while rate-limited. Returns
    /// `true` when the machine autonomously returned to `Idle`
    /// (known-duration countdown reached zero).
    pub fn service_countdown(&mut self, now_ms: u64) -> bool {
        if self.state == OperatingState::RateLimited && self.countdown_expired(now_ms) {
            return self.transition(OperatingState::Idle, now_ms);
        }
        false
    }

    /// Apply state-specific key semantics to one debounced press.
    pub fn handle_key(&mut self, index: usize, now_ms: u64) -> KeyOutcome {
        if index >= SURFACE_COUNT {
            return KeyOutcome::Ignored;
        }
        let key = (index + 1) as u8;

        match self.state {
            OperatingState::Connecting => KeyOutcome::Ignored,
            OperatingState::RateLimited => {
                // CONTINUE only works once the countdown has reached
                // zero (or the duration was never known).
                let gated = match self.timer_face(now_ms) {
                    Some(TimerFace::Remaining(r)) => r > 0,
                    _ => false,
                };
                if index == CONTINUE_KEY && !gated {
                    self.transition(OperatingState::Idle, now_ms);
                    KeyOutcome::EmitAndRender { key }
                } else {
                    KeyOutcome::Ignored
                }
            }
            OperatingState::Error => {
                if index == CONTINUE_KEY || index == RETRY_KEY {
                    self.transition(OperatingState::Idle, now_ms);
                    KeyOutcome::EmitAndRender { key }
                } else {
                    KeyOutcome::Ignored
                }
            }
            OperatingState::Idle | OperatingState::Thinking | OperatingState::WaitingForInput => {
                KeyOutcome::Emit { key }
            }
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
