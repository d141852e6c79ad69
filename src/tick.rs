//! Event loop composition.
//!
//! [`Device`] owns every core component and advances the whole system
//! from a single `tick` call. The embedded binary calls `tick` on a
//! fixed cadence with the current time and raw key levels; host tests
//! drive it with synthetic time.
//!
//! Tick order is fixed: keys, connectivity, inbound effects, periodic
//! redraws, LEDs, watchdog. Every step is check-and-return; nothing
//! in here blocks or sleeps.

use crate::buttons::InputScanner;
use crate::cache::{AssetCache, AssetSource, AssetStore, CachedAssets};
use crate::config::{
    ALERT_PULSE_MS, COUNTDOWN_TICK_MS, DEVICE_MODEL, IMAGE_BYTES, LED_PHASE_MS, SPINNER_TICK_MS,
    SURFACE_COUNT,
};
use crate::leds::{led_frame, LedStrip};
use crate::link::{Connectivity, PeerEvent, PeerSocket, WirelessLink};
use crate::proto::{Inbound, Outbound};
use crate::render::{self, Anim, Panel};
use crate::session::{Applied, KeyOutcome, OperatingState, SessionMachine};
use rand_core::RngCore;

/// Hardware watchdog seam. `feed` is called once per completed tick;
/// a wedged loop stops feeding and the chip resets.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Deadlines for the periodic work, all in absolute milliseconds.
#[derive(Default)]
struct Timers {
    countdown_at: u64,
    pulse_at: u64,
    spinner_at: u64,
    led_at: u64,
}

/// Fires at most once per `interval` and re-arms itself.
fn due(deadline: &mut u64, now_ms: u64, interval: u64) -> bool {
    if now_ms >= *deadline {
        *deadline = now_ms + interval;
        true
    } else {
        false
    }
}

pub struct Device<P, A, F, L, K, T, W, R>
where
    P: Panel,
    A: AssetStore,
    F: AssetSource,
    L: WirelessLink,
    K: PeerSocket,
    T: LedStrip,
    W: Watchdog,
    R: RngCore,
{
    machine: SessionMachine,
    cache: AssetCache<A>,
    source: F,
    conn: Connectivity<L, K>,
    panels: [P; SURFACE_COUNT],
    leds: T,
    input: InputScanner,
    watchdog: W,
    rng: R,
    anim: Anim,
    timers: Timers,
    led_phase: u8,
    last_link_up: bool,
    /// In-flight image payload from the peer; also the staging buffer
    /// handed to the frame assembler.
    scratch: [u8; IMAGE_BYTES],
    /// Pixel buffer for rendering; separate from `scratch` because an
    /// image push may span many ticks.
    pixbuf: [u8; IMAGE_BYTES],
    needs_render: bool,
}

impl<P, A, F, L, K, T, W, R> Device<P, A, F, L, K, T, W, R>
where
    P: Panel,
    A: AssetStore,
    F: AssetSource,
    L: WirelessLink,
    K: PeerSocket,
    T: LedStrip,
    W: Watchdog,
    R: RngCore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        panels: [P; SURFACE_COUNT],
        store: A,
        source: F,
        link: L,
        sock: K,
        leds: T,
        watchdog: W,
        rng: R,
    ) -> Self {
        Self {
            machine: SessionMachine::new(),
            cache: AssetCache::new(store),
            source,
            conn: Connectivity::new(link, sock),
            panels,
            leds,
            input: InputScanner::new(),
            watchdog,
            rng,
            anim: Anim::default(),
            timers: Timers::default(),
            led_phase: 0,
            last_link_up: false,
            scratch: [0; IMAGE_BYTES],
            pixbuf: [0; IMAGE_BYTES],
            // First tick paints the connecting screen.
            needs_render: true,
        }
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn cache(&self) -> &AssetCache<A> {
        &self.cache
    }

    pub fn in_setup_mode(&self) -> bool {
        self.conn.link.in_setup_mode()
    }

    /// Advance the whole device by one tick.
    pub fn tick(&mut self, now_ms: u64, raw_keys: [bool; SURFACE_COUNT]) {
        self.service_keys(now_ms, raw_keys);
        self.service_connectivity(now_ms);
        self.service_periodic(now_ms);

        if self.needs_render {
            self.needs_render = false;
            self.render(now_ms);
        }

        if due(&mut self.timers.led_at, now_ms, LED_PHASE_MS) {
            self.led_phase = self.led_phase.wrapping_add(1);
            let frame = led_frame(
                self.machine.state(),
                self.conn.is_link_up(),
                self.conn.is_peer_connected(),
                self.led_phase,
            );
            let _ = self.leds.show(&frame);
        }

        self.watchdog.feed();
    }

    /// Step 1: debounce, combo, drain queued presses.
    fn service_keys(&mut self, now_ms: u64, raw_keys: [bool; SURFACE_COUNT]) {
        if self.input.scan(now_ms, raw_keys) {
            self.enter_setup_mode(now_ms);
            return;
        }

        while let Some(key) = self.input.pop() {
            let index = key as usize;
            match self.machine.handle_key(index, now_ms) {
                KeyOutcome::Ignored => {}
                KeyOutcome::Emit { key } => self.send_key(key, index),
                KeyOutcome::EmitAndRender { key } => {
                    self.send_key(key, index);
                    self.needs_render = true;
                }
            }
        }
    }

    /// The combo drops the link into its configuration AP and parks
    /// the session. Surface 0 shows how to reach the device; a later
    /// transition (post-reconfiguration reboot) reclaims it.
    fn enter_setup_mode(&mut self, now_ms: u64) {
        self.conn.link.force_setup_mode();
        self.machine.transition(OperatingState::Connecting, now_ms);
        self.machine.mark_override(0);
        render::draw_override(&mut self.panels[0], "setup", DEVICE_MODEL);
        self.needs_render = true;
    }

    /// Send stays best-effort: a press while the peer is down is
    /// dropped, never queued for replay.
    fn send_key(&mut self, key: u8, index: usize) {
        let _ = self.conn.send(&Outbound::KeyPress {
            session_id: self.machine.session_id(),
            key,
            text: self.machine.slot(index).action.as_str(),
        });
    }

    /// Steps 2 and 3: one unit of connectivity progress, then apply
    /// whatever event it completed.
    fn service_connectivity(&mut self, now_ms: u64) {
        let event = self.conn.service(now_ms, &mut self.scratch);

        // Stage change on the connecting screen (wifi -> peer).
        let link_up = self.conn.is_link_up();
        if link_up != self.last_link_up {
            self.last_link_up = link_up;
            if self.machine.state() == OperatingState::Connecting {
                self.needs_render = true;
            }
        }

        // A lost peer parks the session until the next status message.
        if !self.conn.is_peer_connected()
            && self.machine.state() != OperatingState::Connecting
            && self.machine.transition(OperatingState::Connecting, now_ms)
        {
            self.needs_render = true;
        }

        let Some(event) = event else { return };
        match event {
            PeerEvent::Message(msg) => self.apply_inbound(&msg, now_ms),
            PeerEvent::Image { name, len } => {
                // Push preload: store it quietly, rendering picks the
                // asset up on the next slot draw.
                let (scratch, rng) = (&self.scratch, &mut self.rng);
                let _ = self.cache.insert(name.as_str(), &scratch[..len], rng);
            }
        }
    }

    fn apply_inbound(&mut self, msg: &Inbound, now_ms: u64) {
        match self.machine.handle_inbound(msg, now_ms) {
            Applied::None => {}
            Applied::Options | Applied::State => self.needs_render = true,
            Applied::Override { surface } => {
                if let Inbound::DisplayOverride { title, content, .. } = msg {
                    render::draw_override(
                        &mut self.panels[surface],
                        title.as_str(),
                        content.as_str(),
                    );
                }
            }
            // The payload arrives separately through PeerEvent::Image.
            Applied::Image => {}
        }
    }

    /// Step 4: state-specific periodic redraws.
    fn service_periodic(&mut self, now_ms: u64) {
        match self.machine.state() {
            OperatingState::RateLimited => {
                if due(&mut self.timers.countdown_at, now_ms, COUNTDOWN_TICK_MS) {
                    if self.machine.service_countdown(now_ms) {
                        // Countdown hit zero: full redraw in Idle.
                        self.needs_render = true;
                    } else if !self.machine.slot(0).manual_override {
                        if let Some(face) = self.machine.timer_face(now_ms) {
                            render::draw_timer(&mut self.panels[0], face);
                        }
                    }
                }
            }
            OperatingState::Error => {
                if due(&mut self.timers.pulse_at, now_ms, ALERT_PULSE_MS) {
                    self.anim.pulse_on = !self.anim.pulse_on;
                    if !self.machine.slot(0).manual_override {
                        render::draw_alert(&mut self.panels[0], self.anim.pulse_on);
                    }
                }
            }
            OperatingState::Connecting => {
                if due(&mut self.timers.spinner_at, now_ms, SPINNER_TICK_MS) {
                    self.anim.spinner_dots = self.anim.spinner_dots.wrapping_add(1) % 4;
                    if !self.machine.slot(0).manual_override {
                        render::draw_connecting(
                            &mut self.panels[0],
                            self.conn.is_link_up(),
                            self.anim.spinner_dots,
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn render(&mut self, now_ms: u64) {
        let mut assets = CachedAssets {
            cache: &mut self.cache,
            source: &mut self.source,
            rng: &mut self.rng,
        };
        render::render_state(
            &mut self.panels,
            &self.machine,
            &mut assets,
            &mut self.pixbuf,
            now_ms,
            self.anim,
            self.conn.is_link_up(),
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
