//! End-to-end scenarios for the quaddeck host-testable core.
//!
//! A full `Device` is assembled from in-memory fakes and driven
//! tick-by-tick with synthetic time, the same way the firmware binary
//! drives it on target.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use quaddeck::cache::{AssetSource, AssetStore};
use quaddeck::config::{
    BUTTON_DEBOUNCE_MS, IMAGE_BYTES, LED_COUNT, SETUP_COMBO_KEYS, SURFACE_COUNT, TICK_INTERVAL_MS,
};
use quaddeck::leds::LedStrip;
use quaddeck::link::{PeerSocket, WirelessLink};
use quaddeck::render::{Panel, Rgb};
use quaddeck::session::OperatingState;
use quaddeck::tick::{Device, Watchdog};
use quaddeck::Error;

use rand::rngs::SmallRng;
use rand::SeedableRng;

// ═══════════════════════════════════════════════════════════════════════════
// Fakes (shared handles so the tests can observe after moving into Device)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct PanelState {
    big_texts: Vec<String>,
    lines: Vec<String>,
    images_drawn: usize,
    flushes: usize,
}

#[derive(Clone, Default)]
struct FakePanel(Rc<RefCell<PanelState>>);

impl FakePanel {
    fn last_big(&self) -> String {
        self.0.borrow().big_texts.last().cloned().unwrap_or_default()
    }

    fn saw_line(&self, needle: &str) -> bool {
        self.0.borrow().lines.iter().any(|l| l.contains(needle))
    }
}

impl Panel for FakePanel {
    fn clear(&mut self, _bg: Rgb) {}
    fn text(&mut self, _line: u8, s: &str, _color: Rgb) {
        self.0.borrow_mut().lines.push(s.to_string());
    }
    fn big_text(&mut self, s: &str, _color: Rgb) {
        self.0.borrow_mut().big_texts.push(s.to_string());
    }
    fn image(&mut self, _pixels: &[u8]) {
        self.0.borrow_mut().images_drawn += 1;
    }
    fn flush(&mut self) {
        self.0.borrow_mut().flushes += 1;
    }
}

#[derive(Default)]
struct LinkState {
    credentials: bool,
    up: bool,
    attempts: usize,
    setup_mode: bool,
}

#[derive(Clone, Default)]
struct FakeLink(Rc<RefCell<LinkState>>);

impl WirelessLink for FakeLink {
    fn has_credentials(&self) -> bool {
        self.0.borrow().credentials
    }
    fn is_up(&self) -> bool {
        self.0.borrow().up
    }
    fn start_connect(&mut self) {
        let mut s = self.0.borrow_mut();
        s.attempts += 1;
        s.up = true;
    }
    fn enter_setup_mode(&mut self) {
        self.0.borrow_mut().setup_mode = true;
    }
}

#[derive(Default)]
struct SockState {
    connected: bool,
    reachable: bool,
    attempts: usize,
    rx: Vec<u8>,
    tx: Vec<u8>,
}

#[derive(Clone, Default)]
struct FakeSocket(Rc<RefCell<SockState>>);

impl FakeSocket {
    fn push_line(&self, line: &str) {
        let mut s = self.0.borrow_mut();
        s.rx.extend_from_slice(line.as_bytes());
        s.rx.push(b'\n');
    }

    fn push_image(&self, name: &str, payload: &[u8]) {
        self.push_line(&format!(
            r#"{{"type":"image","name":"{}","size":{}}}"#,
            name,
            payload.len()
        ));
        self.0.borrow_mut().rx.extend_from_slice(payload);
    }

    fn sent(&self) -> String {
        String::from_utf8(self.0.borrow().tx.clone()).unwrap()
    }
}

impl PeerSocket for FakeSocket {
    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }
    fn start_connect(&mut self) {
        let mut s = self.0.borrow_mut();
        s.attempts += 1;
        if s.reachable {
            s.connected = true;
        }
    }
    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut s = self.0.borrow_mut();
        if !s.connected {
            return Err(Error::Disconnected);
        }
        s.tx.extend_from_slice(data);
        Ok(())
    }
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut s = self.0.borrow_mut();
        let n = s.rx.len().min(buf.len());
        buf[..n].copy_from_slice(&s.rx[..n]);
        s.rx.drain(..n);
        Ok(n)
    }
    fn close(&mut self) {
        self.0.borrow_mut().connected = false;
    }
}

/// Byte-budgeted in-memory store.
struct MapStore {
    entries: BTreeMap<String, Vec<u8>>,
    capacity: usize,
}

impl MapStore {
    fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }
}

impl AssetStore for MapStore {
    fn entry_count(&self) -> usize {
        self.entries.len()
    }
    fn entry_name(&self, index: usize) -> Option<&str> {
        self.entries.keys().nth(index).map(|s| s.as_str())
    }
    fn free_space(&self) -> usize {
        self.capacity - self.entries.values().map(|v| v.len()).sum::<usize>()
    }
    fn size_of(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|v| v.len())
    }
    fn read(&self, name: &str, buf: &mut [u8]) -> Result<usize, Error> {
        let data = self.entries.get(name).ok_or(Error::Storage)?;
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }
    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        if data.len() > self.free_space() {
            return Err(Error::InsufficientSpace);
        }
        self.entries.insert(name.to_string(), data.to_vec());
        Ok(())
    }
    fn remove(&mut self, name: &str) -> Result<(), Error> {
        self.entries.remove(name).map(|_| ()).ok_or(Error::Storage)
    }
}

#[derive(Clone, Default)]
struct FakeSource {
    assets: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
    downloads: Rc<RefCell<usize>>,
}

impl FakeSource {
    fn provide(&self, name: &str, payload: Vec<u8>) {
        self.assets.borrow_mut().insert(name.to_string(), payload);
    }
}

impl AssetSource for FakeSource {
    fn download(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, Error> {
        *self.downloads.borrow_mut() += 1;
        let assets = self.assets.borrow();
        let data = assets.get(name).ok_or(Error::DownloadFailed)?;
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }
}

#[derive(Clone, Default)]
struct FakeStrip(Rc<RefCell<Vec<[Rgb; LED_COUNT]>>>);

impl LedStrip for FakeStrip {
    fn show(&mut self, frame: &[Rgb; LED_COUNT]) -> Result<(), Error> {
        self.0.borrow_mut().push(*frame);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeWatchdog(Rc<RefCell<usize>>);

impl Watchdog for FakeWatchdog {
    fn feed(&mut self) {
        *self.0.borrow_mut() += 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Harness
// ═══════════════════════════════════════════════════════════════════════════

type TestDevice =
    Device<FakePanel, MapStore, FakeSource, FakeLink, FakeSocket, FakeStrip, FakeWatchdog, SmallRng>;

struct Deck {
    panels: [FakePanel; SURFACE_COUNT],
    link: FakeLink,
    sock: FakeSocket,
    source: FakeSource,
    strip: FakeStrip,
    dog: FakeWatchdog,
    dev: TestDevice,
    now_ms: u64,
}

impl Deck {
    fn new(credentials: bool, peer_reachable: bool) -> Self {
        let panels: [FakePanel; SURFACE_COUNT] = Default::default();
        let link = FakeLink::default();
        link.0.borrow_mut().credentials = credentials;
        let sock = FakeSocket::default();
        sock.0.borrow_mut().reachable = peer_reachable;
        let source = FakeSource::default();
        let strip = FakeStrip::default();
        let dog = FakeWatchdog::default();
        let dev = Device::new(
            panels.clone(),
            MapStore::new(4 * IMAGE_BYTES),
            source.clone(),
            link.clone(),
            sock.clone(),
            strip.clone(),
            dog.clone(),
            SmallRng::seed_from_u64(42),
        );
        Deck {
            panels,
            link,
            sock,
            source,
            strip,
            dog,
            dev,
            now_ms: 0,
        }
    }

    /// Run the loop for `duration_ms` of synthetic time.
    fn run(&mut self, duration_ms: u64) {
        self.run_with_keys(duration_ms, [false; SURFACE_COUNT]);
    }

    fn run_with_keys(&mut self, duration_ms: u64, raw: [bool; SURFACE_COUNT]) {
        let until = self.now_ms + duration_ms;
        while self.now_ms < until {
            self.dev.tick(self.now_ms, raw);
            self.now_ms += TICK_INTERVAL_MS;
        }
    }

    /// Boot with credentials and get the peer session established.
    fn online() -> Self {
        let mut d = Deck::new(true, true);
        d.run(10_000);
        assert!(d.dev.machine().state() == OperatingState::Connecting);
        assert!(d.sock.sent().contains("\"register\""));
        d
    }

    fn press(&mut self, key: usize) {
        let mut raw = [false; SURFACE_COUNT];
        raw[key] = true;
        self.run_with_keys(2 * BUTTON_DEBOUNCE_MS, raw);
        self.run(2 * BUTTON_DEBOUNCE_MS);
    }

    fn send_options(&self, session: &str, labels: [&str; SURFACE_COUNT]) {
        let opts: Vec<String> = labels
            .iter()
            .map(|l| format!(r#"{{"label":"{}"}}"#, l))
            .collect();
        self.sock.push_line(&format!(
            r#"{{"type":"update_options","session_id":"{}","options":[{}]}}"#,
            session,
            opts.join(",")
        ));
    }

    fn send_status(&self, state: &str) {
        self.sock
            .push_line(&format!(r#"{{"type":"status","state":"{}"}}"#, state));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn boot_without_credentials_goes_to_setup_not_the_network() {
    let mut d = Deck::new(false, true);
    d.run(120_000);

    assert!(d.link.0.borrow().setup_mode);
    assert_eq!(d.link.0.borrow().attempts, 0);
    assert_eq!(d.sock.0.borrow().attempts, 0);
    assert!(d.dev.in_setup_mode());
}

#[test]
fn session_flow_options_then_key_press() {
    let mut d = Deck::online();
    d.send_options("s-42", ["Yes", "No", "Retry", "Stop"]);
    d.send_status("waiting");
    d.run(500);

    assert_eq!(d.dev.machine().state(), OperatingState::WaitingForInput);
    assert_eq!(d.panels[0].last_big(), "Yes");
    assert_eq!(d.panels[3].last_big(), "Stop");

    d.press(0);
    let sent = d.sock.sent();
    assert!(sent.contains(r#""type":"key_press""#));
    assert!(sent.contains(r#""session_id":"s-42""#));
    assert!(sent.contains(r#""key":1"#));
    assert!(sent.contains(r#""text":"Yes""#));
}

#[test]
fn rate_limit_counts_down_and_returns_to_idle() {
    let mut d = Deck::online();
    d.sock
        .push_line(r#"{"type":"status","state":"limit","countdown":45}"#);
    d.run(500);
    assert_eq!(d.dev.machine().state(), OperatingState::RateLimited);
    assert_eq!(d.dev.machine().rate_limit().unwrap().countdown_secs, 45);

    // 40 s in, still limited and the timer face is live.
    d.run(40_000);
    assert_eq!(d.dev.machine().state(), OperatingState::RateLimited);
    assert!(d.panels[0].saw_line("limit"));

    // Past the 45 s mark: autonomously back to Idle, no message needed.
    d.run(10_000);
    assert_eq!(d.dev.machine().state(), OperatingState::Idle);
}

#[test]
fn continue_key_gated_until_countdown_expires() {
    let mut d = Deck::online();
    d.send_options("s-1", ["A", "B", "C", "Go"]);
    d.sock
        .push_line(r#"{"type":"status","state":"limit","countdown":600}"#);
    d.run(500);

    // Mid-countdown: the press is swallowed.
    d.press(3);
    assert!(!d.sock.sent().contains("key_press"));
    assert_eq!(d.dev.machine().state(), OperatingState::RateLimited);

    // Duration revised to unknown: CONTINUE is no longer gated.
    d.sock
        .push_line(r#"{"type":"status","state":"limit","countdown":0}"#);
    d.run(500);

    d.press(3);
    let sent = d.sock.sent();
    assert!(sent.contains(r#""key":4"#));
    assert!(sent.contains(r#""text":"Go""#));
    assert_eq!(d.dev.machine().state(), OperatingState::Idle);
}

#[test]
fn override_survives_options_but_not_transitions() {
    let mut d = Deck::online();
    d.send_options("s", ["A", "B", "C", "D"]);
    d.send_status("idle");
    d.run(500);

    d.sock.push_line(
        r#"{"type":"display_override","display":1,"title":"Build","content":"42s"}"#,
    );
    d.run(200);
    assert!(d.panels[1].saw_line("Build"));

    // Options only: surface 1 keeps the override content.
    let big_before = d.panels[1].0.borrow().big_texts.len();
    d.send_options("s", ["A2", "B2", "C2", "D2"]);
    d.run(200);
    assert_eq!(d.panels[1].0.borrow().big_texts.len(), big_before);
    assert_eq!(d.panels[0].last_big(), "A2");

    // A transition reclaims the surface for state rendering.
    d.send_status("thinking");
    d.run(200);
    assert_eq!(d.panels[1].last_big(), "B2");
}

#[test]
fn missing_asset_with_dead_source_falls_back_to_label() {
    let mut d = Deck::online();
    // No asset provided to the source: every download fails.
    d.sock.push_line(
        r#"{"type":"update_options","session_id":"s","options":[{"label":"Deploy","image":"rocket.raw"},{"label":"B"},{"label":"C"},{"label":"D"}]}"#,
    );
    d.send_status("idle");
    d.run(500);

    assert!(*d.source.downloads.borrow() >= 1);
    assert_eq!(d.panels[0].0.borrow().images_drawn, 0);
    assert_eq!(d.panels[0].last_big(), "Deploy");
}

#[test]
fn downloaded_asset_renders_as_pixels() {
    let mut d = Deck::online();
    d.source.provide("rocket.raw", vec![0x5A; IMAGE_BYTES]);
    d.sock.push_line(
        r#"{"type":"update_options","session_id":"s","options":[{"label":"Deploy","image":"rocket.raw"},{"label":"B"},{"label":"C"},{"label":"D"}]}"#,
    );
    d.send_status("idle");
    d.run(500);

    assert!(d.dev.cache().contains("rocket.raw"));
    assert!(d.panels[0].0.borrow().images_drawn >= 1);
}

#[test]
fn pushed_image_is_cached_without_a_download() {
    let mut d = Deck::online();
    d.sock.push_image("icon.raw", &vec![0xC3; IMAGE_BYTES]);
    d.run(5_000);

    assert!(d.dev.cache().contains("icon.raw"));
    assert_eq!(*d.source.downloads.borrow(), 0);
}

#[test]
fn peer_loss_parks_and_status_recovers() {
    let mut d = Deck::online();
    d.send_status("idle");
    d.run(500);
    assert_eq!(d.dev.machine().state(), OperatingState::Idle);

    d.sock.0.borrow_mut().connected = false;
    d.run(500);
    assert_eq!(d.dev.machine().state(), OperatingState::Connecting);

    // Fixed-interval reconnect brings the socket back; the next status
    // message restores the session.
    d.run(10_000);
    assert!(d.sock.0.borrow().connected);
    d.send_status("idle");
    d.run(500);
    assert_eq!(d.dev.machine().state(), OperatingState::Idle);
}

#[test]
fn setup_combo_stops_the_session() {
    let mut d = Deck::online();
    d.send_status("idle");
    d.run(500);

    let mut raw = [false; SURFACE_COUNT];
    raw[SETUP_COMBO_KEYS.0] = true;
    raw[SETUP_COMBO_KEYS.1] = true;
    d.run_with_keys(2 * BUTTON_DEBOUNCE_MS, raw);

    assert!(d.dev.in_setup_mode());
    assert_eq!(d.dev.machine().state(), OperatingState::Connecting);
    assert!(d.panels[0].saw_line("setup"));
    assert!(!d.sock.sent().contains("key_press"));
}

#[test]
fn watchdog_and_leds_are_serviced_every_tick() {
    let mut d = Deck::online();
    let fed_before = *d.dog.0.borrow();
    let frames_before = d.strip.0.borrow().len();
    d.run(2_000);

    let ticks = 2_000 / TICK_INTERVAL_MS;
    assert_eq!(*d.dog.0.borrow() - fed_before, ticks as usize);
    // LED phase advances slower than the tick but steadily.
    assert!(d.strip.0.borrow().len() > frames_before);
}

#[test]
fn heartbeats_flow_while_connected() {
    let mut d = Deck::online();
    d.run(40_000);
    let sent = d.sock.sent();
    let beats = sent.matches("\"heartbeat\"").count();
    assert!(beats >= 2, "expected heartbeats, got {}", beats);
}
