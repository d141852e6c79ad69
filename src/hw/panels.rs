//! Display surface glue.
//!
//! [`GfxPanel`] adapts any embedded-graphics draw target (the four
//! mipidsi panels on the shared SPI bus) to the renderer's [`Panel`]
//! seam. Draw errors cannot be surfaced to the renderer by contract,
//! so they are logged and swallowed here.

use crate::config::{IMAGE_HEIGHT, IMAGE_WIDTH};
use crate::render::{Panel, Rgb};
use embedded_graphics::image::{Image, ImageRaw};
use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_8X13};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::raw::BigEndian;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;

/// Vertical pitch of the four small text lines.
const LINE_HEIGHT: i32 = 16;

fn color565(c: Rgb) -> Rgb565 {
    Rgb565::new(c.r >> 3, c.g >> 2, c.b >> 3)
}

pub struct GfxPanel<D> {
    target: D,
}

impl<D> GfxPanel<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    pub fn new(target: D) -> Self {
        Self { target }
    }
}

impl<D> Panel for GfxPanel<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    fn clear(&mut self, bg: Rgb) {
        if self.target.clear(color565(bg)).is_err() {
            defmt::warn!("panel: clear failed");
        }
    }

    fn text(&mut self, line: u8, s: &str, color: Rgb) {
        let style = MonoTextStyle::new(&FONT_8X13, color565(color));
        let pos = Point::new(2, 12 + i32::from(line) * LINE_HEIGHT);
        if Text::new(s, pos, style).draw(&mut self.target).is_err() {
            defmt::warn!("panel: text failed");
        }
    }

    fn big_text(&mut self, s: &str, color: Rgb) {
        let style = MonoTextStyle::new(&FONT_10X20, color565(color));
        // Centered for the fixed 10px glyph advance; count chars, not
        // bytes, so multi-byte labels stay centered.
        let width = (s.chars().count() as i32) * 10;
        let x = ((IMAGE_WIDTH as i32) - width).max(0) / 2;
        let y = (IMAGE_HEIGHT as i32) / 2 + 7;
        if Text::new(s, Point::new(x, y), style)
            .draw(&mut self.target)
            .is_err()
        {
            defmt::warn!("panel: big_text failed");
        }
    }

    fn image(&mut self, pixels: &[u8]) {
        let raw: ImageRaw<Rgb565, BigEndian> = ImageRaw::new(pixels, IMAGE_WIDTH as u32);
        if Image::new(&raw, Point::zero())
            .draw(&mut self.target)
            .is_err()
        {
            defmt::warn!("panel: image failed");
        }
    }

    fn flush(&mut self) {
        // mipidsi draws through to the panel; nothing buffered.
    }
}
