//! Push-fed streaming PNG decoder yielding RGBA rows.
//!
//! The caller feeds arbitrary byte slices with [`PngDecoder::feed`]; the
//! decoder reports how many bytes it consumed and the caller carries the
//! remainder into the next feed. [`stream_png`] wraps that contract
//! around a pull-based reader with a small staging buffer.
//!
//! The inflate window is a 32 KiB circular dictionary shared with
//! miniz_oxide, so IDAT never needs a whole-image buffer. Rows are
//! unfiltered and converted to RGBA8 as they complete, then handed to a
//! [`PngHandler`] one at a time. Chunk CRCs are skipped, not verified.
//! Interlaced (Adam7) images are not supported.

use alloc::boxed::Box;
use alloc::vec::Vec;

use miniz_oxide::inflate::TINFLStatus;
use miniz_oxide::inflate::core::inflate_flags::{
    TINFL_FLAG_HAS_MORE_INPUT, TINFL_FLAG_PARSE_ZLIB_HEADER,
};
use miniz_oxide::inflate::core::{DecompressorOxide, decompress};

use crate::DecodeError;

const PNG_SIG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const DICT_SIZE: usize = 32768;
const MAX_PIXELS: u32 = 2048 * 2048;
const FEED_BUF: usize = 1024;

/// Receives decoded output. Rows arrive in order with `x == 0` and
/// `h == 1`; `rgba` holds `w` RGBA8 samples.
pub trait PngHandler {
    /// Image dimensions, before any pixel data. Returning an error
    /// aborts the decode.
    fn on_header(&mut self, width: u32, height: u32) -> Result<(), DecodeError>;

    fn on_pixels(&mut self, x: u32, y: u32, w: u32, h: u32, rgba: &[u8]);

    fn on_complete(&mut self) {}
}

#[derive(Clone, Copy)]
struct PngHeader {
    width: u32,
    height: u32,
    depth: u8,
    color_type: u8,
}

impl PngHeader {
    fn channels(&self) -> usize {
        match self.color_type {
            0 | 3 => 1,
            4 => 2,
            2 => 3,
            _ => 4,
        }
    }

    // filter distance in whole bytes, 1 for sub-byte depths
    fn bytes_per_pixel(&self) -> usize {
        let bits = self.channels() * self.depth as usize;
        if bits < 8 { 1 } else { bits / 8 }
    }

    fn scanline_bytes(&self) -> usize {
        let bits = self.width as usize * self.channels() * self.depth as usize;
        (bits + 7) / 8
    }
}

fn valid_combo(color_type: u8, depth: u8) -> bool {
    match color_type {
        0 => matches!(depth, 1 | 2 | 4 | 8 | 16),
        2 | 4 | 6 => matches!(depth, 8 | 16),
        3 => matches!(depth, 1 | 2 | 4 | 8),
        _ => false,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Signature,
    ChunkHead,
    ChunkData,
    ChunkCrc,
    Finished,
}

pub struct PngDecoder {
    stage: Stage,
    header: Option<PngHeader>,

    head_buf: [u8; 8],
    head_len: usize,
    chunk_type: [u8; 4],
    chunk_remaining: usize,
    crc_skip: usize,

    palette: [u8; 768],
    palette_len: usize,

    inflator: Box<DecompressorOxide>,
    dict: Vec<u8>,
    dict_pos: usize,
    inflate_done: bool,

    // filter byte + one scanline
    curr_row: Vec<u8>,
    prev_row: Vec<u8>,
    row_fill: usize,
    rgba: Vec<u8>,
    src_y: u32,
}

impl PngDecoder {
    pub fn new() -> Result<Self, DecodeError> {
        let mut dict = Vec::new();
        dict.try_reserve_exact(DICT_SIZE)
            .map_err(|_| DecodeError::AllocationFailure)?;
        dict.resize(DICT_SIZE, 0u8);

        Ok(Self {
            stage: Stage::Signature,
            header: None,
            head_buf: [0; 8],
            head_len: 0,
            chunk_type: [0; 4],
            chunk_remaining: 0,
            crc_skip: 0,
            palette: [0; 768],
            palette_len: 0,
            inflator: Box::default(),
            dict,
            dict_pos: 0,
            inflate_done: false,
            curr_row: Vec::new(),
            prev_row: Vec::new(),
            row_fill: 0,
            rgba: Vec::new(),
            src_y: 0,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// Consume as much of `data` as the current stage allows and return
    /// the number of bytes taken. Unconsumed bytes must be fed again,
    /// with more data appended, on the next call.
    pub fn feed<H: PngHandler>(
        &mut self,
        data: &[u8],
        handler: &mut H,
    ) -> Result<usize, DecodeError> {
        let mut pos = 0usize;

        loop {
            match self.stage {
                Stage::Signature => {
                    if data.len() - pos < PNG_SIG.len() {
                        return Ok(pos);
                    }
                    if data[pos..pos + 8] != PNG_SIG {
                        return Err(DecodeError::Unsupported("png: invalid signature"));
                    }
                    pos += 8;
                    self.stage = Stage::ChunkHead;
                }

                Stage::ChunkHead => {
                    let take = (8 - self.head_len).min(data.len() - pos);
                    self.head_buf[self.head_len..self.head_len + take]
                        .copy_from_slice(&data[pos..pos + take]);
                    self.head_len += take;
                    pos += take;
                    if self.head_len < 8 {
                        return Ok(pos);
                    }
                    self.head_len = 0;

                    let len = u32::from_be_bytes([
                        self.head_buf[0],
                        self.head_buf[1],
                        self.head_buf[2],
                        self.head_buf[3],
                    ]);
                    if len >= 0x8000_0000 {
                        return Err(DecodeError::Unsupported("png: chunk length out of range"));
                    }
                    self.chunk_type.copy_from_slice(&self.head_buf[4..8]);
                    self.chunk_remaining = len as usize;
                    self.stage = Stage::ChunkData;
                }

                Stage::ChunkData => {
                    if self.chunk_remaining == 0 {
                        self.crc_skip = 4;
                        self.stage = Stage::ChunkCrc;
                        continue;
                    }
                    let avail = self.chunk_remaining.min(data.len() - pos);
                    if avail == 0 {
                        return Ok(pos);
                    }
                    let taken = match &self.chunk_type {
                        b"IHDR" => self.take_ihdr(&data[pos..pos + avail], handler)?,
                        b"PLTE" => self.take_plte(&data[pos..pos + avail])?,
                        b"IDAT" => self.take_idat(&data[pos..pos + avail], handler)?,
                        _ => avail, // ancillary chunks are skipped
                    };
                    pos += taken;
                    self.chunk_remaining -= taken;
                    if taken == 0 {
                        // needs more contiguous bytes than this feed holds
                        return Ok(pos);
                    }
                }

                Stage::ChunkCrc => {
                    let take = self.crc_skip.min(data.len() - pos);
                    self.crc_skip -= take;
                    pos += take;
                    if self.crc_skip > 0 {
                        return Ok(pos);
                    }
                    if &self.chunk_type == b"IEND" {
                        self.finish(handler)?;
                        self.stage = Stage::Finished;
                    } else {
                        self.stage = Stage::ChunkHead;
                    }
                }

                Stage::Finished => return Ok(pos),
            }

            if pos == data.len() && self.stage != Stage::ChunkData && self.stage != Stage::ChunkCrc
            {
                return Ok(pos);
            }
        }
    }

    fn take_ihdr<H: PngHandler>(
        &mut self,
        data: &[u8],
        handler: &mut H,
    ) -> Result<usize, DecodeError> {
        if self.header.is_some() {
            return Err(DecodeError::Unsupported("png: duplicate IHDR"));
        }
        if self.chunk_remaining != 13 {
            return Err(DecodeError::Unsupported("png: bad IHDR length"));
        }
        if data.len() < 13 {
            return Ok(0);
        }

        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let depth = data[8];
        let color_type = data[9];
        let compression = data[10];
        let filter = data[11];
        let interlace = data[12];

        if width == 0 || height == 0 {
            return Err(DecodeError::Unsupported("png: zero dimensions"));
        }
        if width.checked_mul(height).map_or(true, |n| n > MAX_PIXELS) {
            return Err(DecodeError::Unsupported("png: exceeds pixel limit"));
        }
        if compression != 0 || filter != 0 {
            return Err(DecodeError::Unsupported("png: unknown compression method"));
        }
        if interlace != 0 {
            return Err(DecodeError::Unsupported("png: interlaced images not supported"));
        }
        if !valid_combo(color_type, depth) {
            return Err(DecodeError::Unsupported("png: invalid depth for color type"));
        }

        let hdr = PngHeader {
            width,
            height,
            depth,
            color_type,
        };
        log::debug!(
            "png: {}x{} depth {} color type {}",
            width,
            height,
            depth,
            color_type
        );

        let scanline = hdr.scanline_bytes();
        try_resize(&mut self.curr_row, 1 + scanline)?;
        try_resize(&mut self.prev_row, scanline)?;
        try_resize(&mut self.rgba, width as usize * 4)?;

        handler.on_header(width, height)?;
        self.header = Some(hdr);
        Ok(13)
    }

    fn take_plte(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        if self.palette_len + self.chunk_remaining > 768 {
            return Err(DecodeError::Unsupported("png: palette too large"));
        }
        let take = data.len();
        self.palette[self.palette_len..self.palette_len + take].copy_from_slice(data);
        self.palette_len += take;
        Ok(take)
    }

    fn take_idat<H: PngHandler>(
        &mut self,
        data: &[u8],
        handler: &mut H,
    ) -> Result<usize, DecodeError> {
        if self.header.is_none() {
            return Err(DecodeError::Unsupported("png: IDAT before IHDR"));
        }
        if self.inflate_done {
            return Ok(data.len());
        }

        let mut input = data;
        let mut consumed_total = 0usize;
        loop {
            let write_pos = self.dict_pos & (DICT_SIZE - 1);
            let (status, consumed, produced) = decompress(
                &mut self.inflator,
                input,
                &mut self.dict,
                write_pos,
                TINFL_FLAG_PARSE_ZLIB_HEADER | TINFL_FLAG_HAS_MORE_INPUT,
            );
            match status {
                TINFLStatus::Done
                | TINFLStatus::NeedsMoreInput
                | TINFLStatus::HasMoreOutput => {}
                _ => return Err(DecodeError::Unsupported("png: corrupt deflate stream")),
            }

            self.push_decompressed(write_pos, produced, handler)?;
            self.dict_pos = write_pos + produced;
            consumed_total += consumed;
            input = &input[consumed..];

            if status == TINFLStatus::Done {
                self.inflate_done = true;
                // trailing bytes inside IDAT are skipped
                return Ok(data.len());
            }
            if input.is_empty() {
                return Ok(consumed_total);
            }
            if consumed == 0 && produced == 0 {
                return Err(DecodeError::Unsupported("png: inflate stalled"));
            }
        }
    }

    // route freshly inflated bytes into the row accumulator
    fn push_decompressed<H: PngHandler>(
        &mut self,
        start: usize,
        len: usize,
        handler: &mut H,
    ) -> Result<(), DecodeError> {
        let hdr = match self.header {
            Some(h) => h,
            None => return Err(DecodeError::Unsupported("png: IDAT before IHDR")),
        };
        let row_len = self.curr_row.len();
        let mut off = start;
        let end = start + len;

        while off < end {
            if self.src_y >= hdr.height {
                // surplus image data, drop it
                return Ok(());
            }
            let want = row_len - self.row_fill;
            let take = want.min(end - off);
            self.curr_row[self.row_fill..self.row_fill + take]
                .copy_from_slice(&self.dict[off..off + take]);
            self.row_fill += take;
            off += take;

            if self.row_fill == row_len {
                self.emit_row(&hdr, handler)?;
            }
        }
        Ok(())
    }

    fn emit_row<H: PngHandler>(
        &mut self,
        hdr: &PngHeader,
        handler: &mut H,
    ) -> Result<(), DecodeError> {
        let filter = self.curr_row[0];
        unfilter_row(
            filter,
            &mut self.curr_row[1..],
            &self.prev_row,
            hdr.bytes_per_pixel(),
        )?;
        row_to_rgba(
            hdr,
            &self.curr_row[1..],
            &self.palette[..self.palette_len],
            &mut self.rgba,
        )?;
        handler.on_pixels(0, self.src_y, hdr.width, 1, &self.rgba);

        self.prev_row.copy_from_slice(&self.curr_row[1..]);
        self.row_fill = 0;
        self.src_y += 1;
        Ok(())
    }

    fn finish<H: PngHandler>(&mut self, handler: &mut H) -> Result<(), DecodeError> {
        let hdr = match self.header {
            Some(h) => h,
            None => return Err(DecodeError::Unsupported("png: missing IHDR")),
        };
        if self.src_y < hdr.height {
            return Err(DecodeError::Unsupported("png: truncated image data"));
        }
        handler.on_complete();
        Ok(())
    }
}

/// Pull bytes from `read` and feed them through a [`PngDecoder`],
/// carrying unconsumed bytes between reads. `read` fills as much of the
/// slice as it can; `Ok(0)` means end of stream.
pub fn stream_png<F, H>(read: F, handler: &mut H) -> Result<(), DecodeError>
where
    F: FnMut(&mut [u8]) -> Result<usize, DecodeError>,
    H: PngHandler,
{
    let mut dec = PngDecoder::new()?;
    let done = feed_loop(read, |chunk| {
        let fed = dec.feed(chunk, handler)?;
        Ok((fed, dec.is_finished()))
    })?;
    if done {
        Ok(())
    } else {
        Err(DecodeError::Unsupported("png: truncated stream"))
    }
}

// Carry-over loop: read into a fixed buffer, hand the filled prefix to
// `step` (which reports bytes consumed and whether the image is
// complete), keep the unconsumed remainder at the front. A step that
// cannot consume a full buffer is stuck, so that aborts with
// `Overflow` instead of spinning. `Ok(false)` means the reader ran out
// first.
fn feed_loop<F, D>(mut read: F, mut step: D) -> Result<bool, DecodeError>
where
    F: FnMut(&mut [u8]) -> Result<usize, DecodeError>,
    D: FnMut(&[u8]) -> Result<(usize, bool), DecodeError>,
{
    let mut buf = [0u8; FEED_BUF];
    let mut remain = 0usize;

    loop {
        if remain >= buf.len() {
            return Err(DecodeError::Overflow);
        }
        let n = read(&mut buf[remain..])?;
        if n == 0 {
            return Ok(false);
        }
        let total = remain + n;
        let (fed, finished) = step(&buf[..total])?;
        remain = total - fed;
        if remain > 0 {
            buf.copy_within(fed..total, 0);
        }
        if finished {
            return Ok(true);
        }
    }
}

// row unfiltering (PNG filter method 0)

fn unfilter_row(
    filter: u8,
    curr: &mut [u8],
    prev: &[u8],
    bpp: usize,
) -> Result<(), DecodeError> {
    match filter {
        0 => {}
        1 => {
            for i in bpp..curr.len() {
                curr[i] = curr[i].wrapping_add(curr[i - bpp]);
            }
        }
        2 => {
            for i in 0..curr.len() {
                curr[i] = curr[i].wrapping_add(prev[i]);
            }
        }
        3 => {
            for i in 0..curr.len() {
                let left = if i >= bpp { curr[i - bpp] as u16 } else { 0 };
                let avg = ((left + prev[i] as u16) / 2) as u8;
                curr[i] = curr[i].wrapping_add(avg);
            }
        }
        4 => {
            for i in 0..curr.len() {
                let a = if i >= bpp { curr[i - bpp] } else { 0 };
                let c = if i >= bpp { prev[i - bpp] } else { 0 };
                curr[i] = curr[i].wrapping_add(paeth(a, prev[i], c));
            }
        }
        _ => return Err(DecodeError::Unsupported("png: unknown filter type")),
    }
    Ok(())
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

// scanline to RGBA8 conversion; 16-bit samples keep the high byte

fn row_to_rgba(
    hdr: &PngHeader,
    row: &[u8],
    palette: &[u8],
    rgba: &mut [u8],
) -> Result<(), DecodeError> {
    let w = hdr.width as usize;
    match (hdr.color_type, hdr.depth) {
        (0, 8) => {
            for x in 0..w {
                let g = row[x];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[g, g, g, 255]);
            }
        }
        (0, 16) => {
            for x in 0..w {
                let g = row[x * 2];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[g, g, g, 255]);
            }
        }
        (0, d) => {
            let max = (1u16 << d) - 1;
            for x in 0..w {
                let v = unpack(row, x, d) as u16;
                let g = (v * 255 / max) as u8;
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[g, g, g, 255]);
            }
        }
        (2, 8) => {
            for x in 0..w {
                let s = &row[x * 3..x * 3 + 3];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[s[0], s[1], s[2], 255]);
            }
        }
        (2, 16) => {
            for x in 0..w {
                let s = &row[x * 6..x * 6 + 6];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[s[0], s[2], s[4], 255]);
            }
        }
        (3, d) => {
            for x in 0..w {
                let idx = if d == 8 {
                    row[x] as usize
                } else {
                    unpack(row, x, d) as usize
                };
                if idx * 3 + 3 > palette.len() {
                    return Err(DecodeError::Unsupported("png: palette index out of range"));
                }
                let p = &palette[idx * 3..idx * 3 + 3];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[p[0], p[1], p[2], 255]);
            }
        }
        (4, 8) => {
            for x in 0..w {
                let g = row[x * 2];
                let a = row[x * 2 + 1];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[g, g, g, a]);
            }
        }
        (4, 16) => {
            for x in 0..w {
                let g = row[x * 4];
                let a = row[x * 4 + 2];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[g, g, g, a]);
            }
        }
        (6, 8) => rgba.copy_from_slice(&row[..w * 4]),
        (6, 16) => {
            for x in 0..w {
                let s = &row[x * 8..x * 8 + 8];
                rgba[x * 4..x * 4 + 4].copy_from_slice(&[s[0], s[2], s[4], s[6]]);
            }
        }
        _ => return Err(DecodeError::Unsupported("png: invalid depth for color type")),
    }
    Ok(())
}

// extract the x-th sub-byte sample, MSB first
#[inline]
fn unpack(row: &[u8], x: usize, depth: u8) -> u8 {
    let per = 8 / depth as usize;
    let byte = row[x / per];
    let slot = per - 1 - (x % per);
    (byte >> (slot * depth as usize)) & ((1u16 << depth) - 1) as u8
}

fn try_resize(v: &mut Vec<u8>, len: usize) -> Result<(), DecodeError> {
    v.clear();
    v.try_reserve_exact(len)
        .map_err(|_| DecodeError::AllocationFailure)?;
    v.resize(len, 0u8);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniz_oxide::deflate::compress_to_vec_zlib;

    struct Collect {
        width: u32,
        height: u32,
        rows: Vec<Vec<u8>>,
        complete: bool,
    }

    impl Collect {
        fn new() -> Self {
            Self {
                width: 0,
                height: 0,
                rows: Vec::new(),
                complete: false,
            }
        }
    }

    impl PngHandler for Collect {
        fn on_header(&mut self, width: u32, height: u32) -> Result<(), DecodeError> {
            self.width = width;
            self.height = height;
            Ok(())
        }

        fn on_pixels(&mut self, x: u32, y: u32, w: u32, h: u32, rgba: &[u8]) {
            assert_eq!((x, h), (0, 1));
            assert_eq!(y as usize, self.rows.len());
            assert_eq!(rgba.len(), w as usize * 4);
            self.rows.push(rgba.to_vec());
        }

        fn on_complete(&mut self) {
            self.complete = true;
        }
    }

    // chunk with a garbage CRC; CRCs are skipped
    fn chunk(ty: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(ty);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0u8; 4]);
        out
    }

    fn build_png(
        w: u32,
        h: u32,
        depth: u8,
        color_type: u8,
        raw_scanlines: &[u8],
        plte: Option<&[u8]>,
    ) -> Vec<u8> {
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&w.to_be_bytes());
        ihdr.extend_from_slice(&h.to_be_bytes());
        ihdr.extend_from_slice(&[depth, color_type, 0, 0, 0]);

        let mut png = PNG_SIG.to_vec();
        png.extend_from_slice(&chunk(b"IHDR", &ihdr));
        if let Some(p) = plte {
            png.extend_from_slice(&chunk(b"PLTE", p));
        }
        let idat = compress_to_vec_zlib(raw_scanlines, 6);
        png.extend_from_slice(&chunk(b"IDAT", &idat));
        png.extend_from_slice(&chunk(b"IEND", &[]));
        png
    }

    #[test]
    fn decodes_2x2_truecolor() {
        #[rustfmt::skip]
        let raw = [
            0, 255, 0, 0,  0, 255, 0,
            0, 0, 0, 255,  255, 255, 255,
        ];
        let png = build_png(2, 2, 8, 2, &raw, None);

        let mut sink = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        let fed = dec.feed(&png, &mut sink).unwrap();
        assert_eq!(fed, png.len());
        assert!(dec.is_finished());
        assert!(sink.complete);

        assert_eq!((sink.width, sink.height), (2, 2));
        assert_eq!(sink.rows[0], [255, 0, 0, 255, 0, 255, 0, 255]);
        assert_eq!(sink.rows[1], [0, 0, 255, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn up_filter_accumulates_previous_row() {
        #[rustfmt::skip]
        let raw = [
            0, 10, 20, 30,  40, 50, 60,
            2,  5,  5,  5,   5,  5,  5,
        ];
        let png = build_png(2, 2, 8, 2, &raw, None);

        let mut sink = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        dec.feed(&png, &mut sink).unwrap();

        assert_eq!(sink.rows[1], [15, 25, 35, 255, 45, 55, 65, 255]);
    }

    #[test]
    fn indexed_color_uses_palette() {
        let raw = [0u8, 0, 1]; // two 8-bit indices
        let palette = [255u8, 0, 0, 0, 0, 255];
        let png = build_png(2, 1, 8, 3, &raw, Some(&palette));

        let mut sink = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        dec.feed(&png, &mut sink).unwrap();

        assert_eq!(sink.rows[0], [255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn one_byte_reads_match_oneshot() {
        #[rustfmt::skip]
        let raw = [
            0, 1, 2, 3,  4, 5, 6,
            0, 7, 8, 9,  10, 11, 12,
        ];
        let png = build_png(2, 2, 8, 2, &raw, None);

        let mut oneshot = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        dec.feed(&png, &mut oneshot).unwrap();

        let mut trickled = Collect::new();
        let mut off = 0usize;
        stream_png(
            |buf| {
                if off >= png.len() {
                    return Ok(0);
                }
                buf[0] = png[off];
                off += 1;
                Ok(1)
            },
            &mut trickled,
        )
        .unwrap();

        assert_eq!(oneshot.rows, trickled.rows);
        assert!(trickled.complete);
    }

    #[test]
    fn partial_signature_consumes_nothing() {
        let mut sink = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        assert_eq!(dec.feed(&PNG_SIG[..5], &mut sink).unwrap(), 0);
        // the full signature plus more still works afterwards
        let png = build_png(1, 1, 8, 0, &[0, 128], None);
        assert_eq!(dec.feed(&png, &mut sink).unwrap(), png.len());
        assert_eq!(sink.rows[0], [128, 128, 128, 255]);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut sink = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        let err = dec.feed(&[0u8; 16], &mut sink).unwrap_err();
        assert_eq!(err, DecodeError::Unsupported("png: invalid signature"));
    }

    #[test]
    fn rejects_interlaced() {
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&2u32.to_be_bytes());
        ihdr.extend_from_slice(&2u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 2, 0, 0, 1]);
        let mut png = PNG_SIG.to_vec();
        png.extend_from_slice(&chunk(b"IHDR", &ihdr));

        let mut sink = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        let err = dec.feed(&png, &mut sink).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Unsupported("png: interlaced images not supported")
        );
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let raw = [0u8, 1, 2, 3, 4, 5, 6];
        let png = build_png(2, 1, 8, 2, &raw, None);
        let cut = &png[..png.len() - 20];

        let mut sink = Collect::new();
        let mut off = 0usize;
        let err = stream_png(
            |buf| {
                let n = buf.len().min(cut.len() - off);
                buf[..n].copy_from_slice(&cut[off..off + n]);
                off += n;
                Ok(n)
            },
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
    }

    #[test]
    fn stuck_feed_overflows_instead_of_spinning() {
        // a step that never consumes must abort once the carry-over
        // buffer is full of unconsumed bytes
        let mut served = 0usize;
        let err = feed_loop(
            |buf| {
                served += buf.len();
                Ok(buf.len())
            },
            |_chunk| Ok((0, false)),
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::Overflow);
        assert_eq!(served, FEED_BUF);
    }

    #[test]
    fn grayscale_one_bit_expands() {
        // 4x1, bits 1010 -> white black white black
        let raw = [0u8, 0b1010_0000];
        let png = build_png(4, 1, 1, 0, &raw, None);

        let mut sink = Collect::new();
        let mut dec = PngDecoder::new().unwrap();
        dec.feed(&png, &mut sink).unwrap();

        assert_eq!(
            sink.rows[0],
            [255, 255, 255, 255, 0, 0, 0, 255, 255, 255, 255, 255, 0, 0, 0, 255]
        );
    }
}
