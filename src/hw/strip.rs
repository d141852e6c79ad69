//! WS2812 status strip glue.

use crate::config::LED_COUNT;
use crate::error::Error;
use crate::leds::LedStrip;
use crate::render::Rgb;
use smart_leds::{SmartLedsWrite, RGB8};

/// Global brightness cap; full-white at 8 LEDs pulls too much current
/// from the 3V3 rail.
const BRIGHTNESS: u8 = 80;

pub struct Ws2812Strip<S> {
    driver: S,
}

impl<S> Ws2812Strip<S>
where
    S: SmartLedsWrite<Color = RGB8>,
{
    pub fn new(driver: S) -> Self {
        Self { driver }
    }
}

impl<S> LedStrip for Ws2812Strip<S>
where
    S: SmartLedsWrite<Color = RGB8>,
{
    fn show(&mut self, frame: &[Rgb; LED_COUNT]) -> Result<(), Error> {
        let scaled = frame.iter().map(|c| {
            let d = c.dim(BRIGHTNESS);
            RGB8::new(d.r, d.g, d.b)
        });
        self.driver.write(scaled).map_err(|_| Error::Display)
    }
}
