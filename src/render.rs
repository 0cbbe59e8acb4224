// Slideshow orchestration: scan the card, decode, paint the panel.
//
// The scan job re-lists the SD root every pass and redraws only when
// the first image file differs from what is already on screen, so a
// card swap shows up within one scan interval and an unchanged card
// costs one directory listing.
//
// JPEG decodes into a screen-sized RGB565 grid (the block decoder picks
// a power-of-two downscale) which is then blitted centred. PNG streams
// straight to the panel row by row through an aspect-fit plan; nearest
// neighbour with run replication, so upscales leave no holes.

use alloc::vec::Vec;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use log::{info, warn};

use smol_pix::jpeg::{BlockSink, JpegDecoder, JpegSource};
use smol_pix::png::{PngHandler, stream_png};
use smol_pix::{DecodeError, FitPlan, ImageFormat, JpegScale, PixelGrid, rgb565};

use crate::board::display::{HEIGHT, WIDTH};
use crate::board::{Lcd, SdStorage, SharedSpiDevice};
use crate::drivers::storage::{self, ImageFile};

// JPEG marker segments (including EXIF) must fit here
const JPEG_HEADER_ARENA: usize = 32 * 1024;

const BLACK: u16 = 0x0000;

pub struct Renderer {
    last: Option<ImageFile>,
    placeholder_shown: bool,
}

impl Renderer {
    pub const fn new() -> Self {
        Self {
            last: None,
            placeholder_shown: false,
        }
    }

    /// One scan pass: list the card, redraw if the selected file changed.
    pub fn scan_and_show(&mut self, lcd: &mut Lcd, sd: &SdStorage<SharedSpiDevice>) {
        let found = match storage::find_first_image(sd) {
            Ok(f) => f,
            Err(e) => {
                warn!("scan: {}", e);
                return;
            }
        };

        let Some(img) = found else {
            if !self.placeholder_shown {
                self.show_placeholder(lcd);
                self.placeholder_shown = true;
                self.last = None;
            }
            return;
        };

        if let Some(ref last) = self.last
            && last.same_file(&img)
        {
            return;
        }

        info!(
            "render: {} ({} bytes, {:?})",
            img.name_str(),
            img.size,
            img.format
        );
        let result = match img.format {
            ImageFormat::Jpeg => show_jpeg(lcd, sd, &img),
            ImageFormat::Png => show_png(lcd, sd, &img),
        };
        if let Err(e) = result {
            warn!("render: {}: {}", img.name_str(), e);
        }

        // remember the file either way so a broken one is not retried
        // on every scan; it is picked up again after a card change
        self.last = Some(img);
        self.placeholder_shown = false;
    }

    fn show_placeholder(&self, lcd: &mut Lcd) {
        lcd.fill_screen(BLACK);
        let style = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);
        Text::new("NO IMAGES", Point::new(70, 160), style)
            .draw(lcd)
            .unwrap();
        info!("render: no images on card");
    }
}

// sequential reads over stateless SD chunk reads
struct SdSource<'a> {
    sd: &'a SdStorage<SharedSpiDevice>,
    file: ImageFile,
    offset: u32,
}

impl<'a> SdSource<'a> {
    fn new(sd: &'a SdStorage<SharedSpiDevice>, file: ImageFile) -> Self {
        Self {
            sd,
            file,
            offset: 0,
        }
    }
}

impl JpegSource for SdSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
        let name = self.file;
        let n = storage::read_file_chunk(self.sd, name.name_str(), self.offset, buf)
            .map_err(|e| {
                warn!("sd read: {}", e);
                DecodeError::NotFound
            })?;
        self.offset += n as u32;
        Ok(n)
    }
}

struct GridSink<'a> {
    grid: &'a mut PixelGrid,
}

impl BlockSink for GridSink<'_> {
    fn block(&mut self, x: u16, y: u16, w: u16, h: u16, rgb: &[u8]) {
        let mut i = 0usize;
        for dy in 0..h {
            for dx in 0..w {
                let c = rgb565(rgb[i], rgb[i + 1], rgb[i + 2]);
                self.grid.set(x + dx, y + dy, c);
                i += 3;
            }
        }
    }
}

fn show_jpeg(
    lcd: &mut Lcd,
    sd: &SdStorage<SharedSpiDevice>,
    img: &ImageFile,
) -> Result<(), DecodeError> {
    let mut arena = Vec::new();
    arena
        .try_reserve_exact(JPEG_HEADER_ARENA)
        .map_err(|_| DecodeError::AllocationFailure)?;
    arena.resize(JPEG_HEADER_ARENA, 0u8);

    let mut source = SdSource::new(sd, *img);
    let dec = JpegDecoder::prepare(&mut source, &mut arena)?;
    let (w, h) = (dec.width(), dec.height());

    let scale = JpegScale::for_size(w, h, WIDTH, HEIGHT);
    let gw = scale.apply(w).min(WIDTH);
    let gh = scale.apply(h).min(HEIGHT);
    let mut grid = PixelGrid::new(gw, gh)?;

    dec.decode(&mut source, scale, &mut GridSink { grid: &mut grid })?;

    lcd.fill_screen(BLACK);
    let x0 = (WIDTH - gw) / 2;
    let y0 = (HEIGHT - gh) / 2;
    for y in 0..gh {
        lcd.blit_row(x0, y0 + y, grid.row(y));
    }
    lcd.finish_frame();
    Ok(())
}

// paints decoded PNG rows directly onto the panel through a fit plan
struct ScreenSink<'a> {
    lcd: &'a mut Lcd,
    plan: Option<FitPlan>,
    row: [u16; WIDTH as usize],
}

impl PngHandler for ScreenSink<'_> {
    fn on_header(&mut self, width: u32, height: u32) -> Result<(), DecodeError> {
        self.plan = Some(FitPlan::compute(width, height, WIDTH, HEIGHT));
        Ok(())
    }

    fn on_pixels(&mut self, _x: u32, y: u32, w: u32, _h: u32, rgba: &[u8]) {
        let Some(plan) = self.plan else { return };
        let dw = plan.dest_w as usize;
        if dw == 0 {
            return;
        }

        let dy0 = (y as f32 * plan.scale) as u32;
        if dy0 >= plan.dest_h as u32 {
            return;
        }
        let mut dy1 = ((y + 1) as f32 * plan.scale) as u32;
        if dy1 <= dy0 {
            dy1 = dy0 + 1;
        }
        let dy1 = dy1.min(plan.dest_h as u32);

        self.row[..dw].fill(BLACK);
        for sx in 0..w as usize {
            let p = &rgba[sx * 4..sx * 4 + 4];
            let c = rgb565(p[0], p[1], p[2]);
            let dx0 = (sx as f32 * plan.scale) as usize;
            if dx0 >= dw {
                continue;
            }
            let mut dx1 = ((sx + 1) as f32 * plan.scale) as usize;
            if dx1 <= dx0 {
                dx1 = dx0 + 1;
            }
            self.row[dx0..dx1.min(dw)].fill(c);
        }

        for dy in dy0..dy1 {
            self.lcd
                .blit_row(plan.col_offset, plan.row_offset + dy as u16, &self.row[..dw]);
        }
    }
}

fn show_png(
    lcd: &mut Lcd,
    sd: &SdStorage<SharedSpiDevice>,
    img: &ImageFile,
) -> Result<(), DecodeError> {
    lcd.fill_screen(BLACK);

    let mut source = SdSource::new(sd, *img);
    let mut sink = ScreenSink {
        lcd,
        plan: None,
        row: [BLACK; WIDTH as usize],
    };
    stream_png(|buf| source.read(buf), &mut sink)?;
    lcd.finish_frame();
    Ok(())
}
