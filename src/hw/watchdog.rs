//! RTC watchdog glue.
//!
//! The RWDT resets the whole chip when the event loop stops feeding
//! it. That reset is the designed recovery path for a wedged loop; all
//! RAM state is rebuilt from flash on the way back up.

use crate::config::WATCHDOG_TIMEOUT_MS;
use crate::tick::Watchdog;
use esp_hal::rtc_cntl::{Rtc, RwdtStage};
use esp_hal::time::Duration;

pub struct RtcWatchdog {
    rtc: Rtc<'static>,
}

impl RtcWatchdog {
    pub fn new(mut rtc: Rtc<'static>) -> Self {
        rtc.rwdt
            .set_timeout(RwdtStage::Stage0, Duration::millis(WATCHDOG_TIMEOUT_MS));
        rtc.rwdt.enable();
        defmt::info!("watchdog armed: {} ms", WATCHDOG_TIMEOUT_MS);
        Self { rtc }
    }
}

impl Watchdog for RtcWatchdog {
    fn feed(&mut self) {
        self.rtc.rwdt.feed();
    }
}
