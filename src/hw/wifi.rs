//! Wireless link glue.
//!
//! The esp-wifi controller is async and lives in its own task; the
//! event loop talks to it through [`WifiLink`], a thin command/status
//! view over shared atomics. One command is latched at a time and the
//! task acknowledges by updating the link state.

use super::settings::Settings;
use crate::link::WirelessLink;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use embassy_time::{Duration, Timer};
use esp_wifi::wifi::{
    AccessPointConfiguration, ClientConfiguration, Configuration, WifiController, WifiState,
};

const CMD_NONE: u8 = 0;
const CMD_CONNECT: u8 = 1;
const CMD_SETUP: u8 = 2;

/// SSID of the configuration access point.
const SETUP_SSID: &str = "quaddeck-setup";

pub struct WifiShared {
    up: AtomicBool,
    command: AtomicU8,
}

impl WifiShared {
    pub const fn new() -> Self {
        Self {
            up: AtomicBool::new(false),
            command: AtomicU8::new(CMD_NONE),
        }
    }
}

/// The event loop's synchronous view of the link.
pub struct WifiLink {
    shared: &'static WifiShared,
    has_credentials: bool,
}

impl WifiLink {
    pub fn new(shared: &'static WifiShared, has_credentials: bool) -> Self {
        Self {
            shared,
            has_credentials,
        }
    }
}

impl WirelessLink for WifiLink {
    fn has_credentials(&self) -> bool {
        self.has_credentials
    }

    fn is_up(&self) -> bool {
        self.shared.up.load(Ordering::Relaxed)
    }

    fn start_connect(&mut self) {
        self.shared.command.store(CMD_CONNECT, Ordering::Relaxed);
    }

    fn enter_setup_mode(&mut self) {
        self.shared.command.store(CMD_SETUP, Ordering::Relaxed);
    }
}

/// Owns the wifi controller. Executes latched commands and mirrors the
/// association state into the shared flags.
#[embassy_executor::task]
pub async fn wifi_task(
    mut controller: WifiController<'static>,
    shared: &'static WifiShared,
    settings: Option<Settings>,
) {
    loop {
        match shared.command.swap(CMD_NONE, Ordering::Relaxed) {
            CMD_CONNECT => {
                if let Some(s) = settings.as_ref() {
                    connect_once(&mut controller, s).await;
                }
            }
            CMD_SETUP => {
                enter_setup(&mut controller).await;
                // Setup mode is terminal; the device reboots after
                // reconfiguration.
                loop {
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
            _ => {}
        }

        shared.up.store(
            matches!(esp_wifi::wifi::wifi_state(), WifiState::StaConnected),
            Ordering::Relaxed,
        );
        Timer::after(Duration::from_millis(100)).await;
    }
}

/// One association attempt. Success/failure is reported through the
/// mirrored state, not a return value; retry pacing is the core's job.
async fn connect_once(controller: &mut WifiController<'static>, settings: &Settings) {
    if !matches!(controller.is_started(), Ok(true)) {
        let config = Configuration::Client(ClientConfiguration {
            ssid: settings.ssid.clone(),
            password: settings.password.clone(),
            ..Default::default()
        });
        if let Err(e) = controller.set_configuration(&config) {
            defmt::warn!("wifi config failed: {:?}", e);
            return;
        }
        if let Err(e) = controller.start_async().await {
            defmt::warn!("wifi start failed: {:?}", e);
            return;
        }
    }

    defmt::info!("wifi: connecting to {}", settings.ssid.as_str());
    match controller.connect_async().await {
        Ok(()) => defmt::info!("wifi: associated"),
        Err(e) => defmt::warn!("wifi: connect failed: {:?}", e),
    }
}

async fn enter_setup(controller: &mut WifiController<'static>) {
    let _ = controller.stop_async().await;
    let config = Configuration::AccessPoint(AccessPointConfiguration {
        ssid: SETUP_SSID.try_into().unwrap_or_default(),
        ..Default::default()
    });
    if let Err(e) = controller.set_configuration(&config) {
        defmt::error!("setup AP config failed: {:?}", e);
        return;
    }
    match controller.start_async().await {
        Ok(()) => defmt::info!("setup AP up: {}", SETUP_SSID),
        Err(e) => defmt::error!("setup AP failed: {:?}", e),
    }
}
