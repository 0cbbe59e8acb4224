//! ST7789 TFT driver (240x320, RGB565 over SPI)
//!
//! The controller keeps the whole frame in its own RAM; we stream pixel
//! data into a CASET/RASET window and never hold a framebuffer on the
//! MCU side. Rows arrive as RGB565 words and are serialized big-endian
//! through a small chunk buffer.

use embedded_graphics_core::Pixel;
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{OriginDimensions, Size};
use embedded_graphics_core::pixelcolor::{IntoStorage, Rgb565};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use esp_hal::delay::Delay;

// Display dimensions (physical, portrait)
pub const WIDTH: u16 = 240;
pub const HEIGHT: u16 = 320;

// SPI frequency
pub const SPI_FREQ_MHZ: u32 = 40;

const SLPOUT_TIME_MS: u32 = 120;
const RESET_TIME_MS: u32 = 10;

// serialization chunk, in pixels
const CHUNK_PIXELS: usize = 128;

/// Display rotation, applied through MADCTL.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    const fn madctl(self) -> u8 {
        match self {
            Rotation::Deg0 => 0x00,
            Rotation::Deg90 => 0x60,
            Rotation::Deg180 => 0xC0,
            Rotation::Deg270 => 0xA0,
        }
    }
}

// ST7789 commands
mod cmd {
    pub const NOP: u8 = 0x00;
    pub const SW_RESET: u8 = 0x01;
    pub const SLEEP_OUT: u8 = 0x11;
    pub const NORMAL_MODE: u8 = 0x13;
    pub const INVERSION_ON: u8 = 0x21;
    pub const DISPLAY_OFF: u8 = 0x28;
    pub const DISPLAY_ON: u8 = 0x29;
    pub const COLUMN_RANGE: u8 = 0x2A;
    pub const ROW_RANGE: u8 = 0x2B;
    pub const RAM_WRITE: u8 = 0x2C;
    pub const MADCTL: u8 = 0x36;
    pub const PIXEL_FORMAT: u8 = 0x3A;
}

pub struct DisplayDriver<SPI, DC, RST, BL> {
    spi: SPI,
    dc: DC,
    rst: RST,
    bl: BL,
    rotation: Rotation,
    display_on: bool,
    init_done: bool,
}

impl<SPI, DC, RST, BL, E> DisplayDriver<SPI, DC, RST, BL>
where
    SPI: SpiDevice<Error = E>,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, bl: BL) -> Self {
        Self {
            spi,
            dc,
            rst,
            bl,
            rotation: Rotation::Deg0,
            display_on: false,
            init_done: false,
        }
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
        if self.init_done {
            self.send_command(cmd::MADCTL);
            self.send_data(&[rotation.madctl()]);
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Logical screen size under the current rotation.
    pub fn size(&self) -> Size {
        match self.rotation {
            Rotation::Deg0 | Rotation::Deg180 => Size::new(WIDTH as u32, HEIGHT as u32),
            Rotation::Deg90 | Rotation::Deg270 => Size::new(HEIGHT as u32, WIDTH as u32),
        }
    }

    pub fn width(&self) -> u16 {
        self.size().width as u16
    }

    pub fn height(&self) -> u16 {
        self.size().height as u16
    }

    pub fn reset(&mut self, delay: &mut Delay) {
        let _ = self.rst.set_high();
        delay.delay_millis(RESET_TIME_MS);
        let _ = self.rst.set_low();
        delay.delay_millis(RESET_TIME_MS);
        let _ = self.rst.set_high();
        delay.delay_millis(RESET_TIME_MS);
    }

    pub fn init(&mut self, delay: &mut Delay) {
        self.reset(delay);

        self.send_command(cmd::SW_RESET);
        delay.delay_millis(RESET_TIME_MS);

        self.send_command(cmd::SLEEP_OUT);
        delay.delay_millis(SLPOUT_TIME_MS);

        // 16-bit RGB565
        self.send_command(cmd::PIXEL_FORMAT);
        self.send_data(&[0x55]);

        self.send_command(cmd::MADCTL);
        self.send_data(&[self.rotation.madctl()]);

        // this panel wants inverted polarity for correct colors
        self.send_command(cmd::INVERSION_ON);
        self.send_command(cmd::NORMAL_MODE);

        self.init_done = true;
        self.fill_screen(0x0000);

        self.set_power(true);
        self.set_backlight(true);
    }

    /// Frame boundary. The controller scans its RAM continuously, so
    /// there is nothing to latch; a NOP terminates any open RAM write.
    pub fn finish_frame(&mut self) {
        self.send_command(cmd::NOP);
    }

    /// Display ON/OFF without losing controller RAM.
    pub fn set_power(&mut self, on: bool) {
        if on == self.display_on {
            return;
        }
        self.send_command(if on { cmd::DISPLAY_ON } else { cmd::DISPLAY_OFF });
        self.display_on = on;
    }

    pub fn is_powered(&self) -> bool {
        self.display_on
    }

    pub fn set_backlight(&mut self, on: bool) {
        if on {
            let _ = self.bl.set_high();
        } else {
            let _ = self.bl.set_low();
        }
    }

    pub fn fill_screen(&mut self, color: u16) {
        let (w, h) = (self.width(), self.height());
        self.fill_rect(0, 0, w, h, color);
    }

    pub fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, color: u16) {
        let (sw, sh) = (self.width(), self.height());
        if x >= sw || y >= sh || w == 0 || h == 0 {
            return;
        }
        let w = w.min(sw - x);
        let h = h.min(sh - y);

        self.set_window(x, y, w, h);
        self.send_command(cmd::RAM_WRITE);

        let be = color.to_be_bytes();
        let mut chunk = [0u8; CHUNK_PIXELS * 2];
        for px in chunk.chunks_exact_mut(2) {
            px.copy_from_slice(&be);
        }

        let mut remaining = w as usize * h as usize;
        while remaining > 0 {
            let n = remaining.min(CHUNK_PIXELS);
            self.send_data(&chunk[..n * 2]);
            remaining -= n;
        }
    }

    /// Write one horizontal run of RGB565 pixels at (x, y). The run is
    /// clipped to the screen.
    pub fn blit_row(&mut self, x: u16, y: u16, pixels: &[u16]) {
        let (sw, sh) = (self.width(), self.height());
        if y >= sh || x >= sw || pixels.is_empty() {
            return;
        }
        let len = pixels.len().min((sw - x) as usize);

        self.set_window(x, y, len as u16, 1);
        self.send_command(cmd::RAM_WRITE);

        let mut chunk = [0u8; CHUNK_PIXELS * 2];
        for part in pixels[..len].chunks(CHUNK_PIXELS) {
            for (src, dst) in part.iter().zip(chunk.chunks_exact_mut(2)) {
                dst.copy_from_slice(&src.to_be_bytes());
            }
            self.send_data(&chunk[..part.len() * 2]);
        }
    }

    pub fn set_pixel(&mut self, x: u16, y: u16, color: u16) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        self.set_window(x, y, 1, 1);
        self.send_command(cmd::RAM_WRITE);
        self.send_data(&color.to_be_bytes());
    }

    fn set_window(&mut self, x: u16, y: u16, w: u16, h: u16) {
        let x1 = x + w - 1;
        let y1 = y + h - 1;

        self.send_command(cmd::COLUMN_RANGE);
        self.send_data(&[(x >> 8) as u8, (x & 0xFF) as u8, (x1 >> 8) as u8, (x1 & 0xFF) as u8]);

        self.send_command(cmd::ROW_RANGE);
        self.send_data(&[(y >> 8) as u8, (y & 0xFF) as u8, (y1 >> 8) as u8, (y1 & 0xFF) as u8]);
    }

    fn send_command(&mut self, cmd: u8) {
        let _ = self.dc.set_low();
        let _ = self.spi.write(&[cmd]);
        let _ = self.dc.set_high();
    }

    fn send_data(&mut self, data: &[u8]) {
        let _ = self.dc.set_high();
        let _ = self.spi.write(data);
    }
}

// embedded-graphics integration for text and fills; bulk image data
// goes through blit_row

impl<SPI, DC, RST, BL, E> OriginDimensions for DisplayDriver<SPI, DC, RST, BL>
where
    SPI: SpiDevice<Error = E>,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
{
    fn size(&self) -> Size {
        self.size()
    }
}

impl<SPI, DC, RST, BL, E> DrawTarget for DisplayDriver<SPI, DC, RST, BL>
where
    SPI: SpiDevice<Error = E>,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
{
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.set_pixel(point.x as u16, point.y as u16, color.into_storage());
            }
        }
        Ok(())
    }
}
