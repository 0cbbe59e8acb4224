//! Baseline JPEG block decoder producing RGB888 rectangles.
//!
//! The caller supplies a pull-based [`JpegSource`] for the bitstream and
//! a push-based [`BlockSink`] that receives one downscaled block per MCU.
//! Header parsing is confined to a caller-provided scratch arena; a
//! header that does not fit the arena is rejected, never retried with a
//! larger buffer.
//!
//! Downscale happens inside the decoder by box-averaging each MCU at one
//! of the power-of-two factors in [`JpegScale`]. Progressive JPEG (SOF2)
//! is not supported.

use alloc::boxed::Box;

use crate::DecodeError;
use crate::scale::JpegScale;

// JPEG marker bytes

const M_SOF0: u8 = 0xC0;
const M_SOF2: u8 = 0xC2;
const M_DHT: u8 = 0xC4;
const M_SOI: u8 = 0xD8;
const M_EOI: u8 = 0xD9;
const M_SOS: u8 = 0xDA;
const M_DQT: u8 = 0xDB;
const M_DRI: u8 = 0xDD;
const M_RST0: u8 = 0xD0;
const M_RST7: u8 = 0xD7;

// limits

const MAX_COMP: usize = 4;
const MAX_PIXELS: u32 = 2048 * 2048;

// chunk size for buffered source reads during MCU decode
const SCAN_BUF: usize = 1024;

// per-component sample stride inside one MCU (max sampling factor 2)
const MCU_STRIDE: usize = 16;

// zig-zag scan order

#[rustfmt::skip]
const ZZ: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

// IDCT constants (IJG ISLOW, CONST_BITS = 13)

const CB: i32 = 13;
const P1: i32 = 2;
const F0298: i32 = 2446;
const F0390: i32 = 3196;
const F0541: i32 = 4433;
const F0765: i32 = 6270;
const F0899: i32 = 7373;
const F1175: i32 = 9633;
const F1501: i32 = 12299;
const F1847: i32 = 15137;
const F1961: i32 = 16069;
const F2053: i32 = 16819;
const F2562: i32 = 20995;
const F3072: i32 = 25172;

// YCbCr -> RGB (JFIF), fixed point with 10 fractional bits

const C_CR_R: i32 = 1436;
const C_CB_G: i32 = 352;
const C_CR_G: i32 = 731;
const C_CB_B: i32 = 1815;

// public traits

/// Sequential byte source for the JPEG bitstream. `Ok(0)` means end of
/// stream.
pub trait JpegSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError>;
}

impl JpegSource for &[u8] {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
        let n = buf.len().min(self.len());
        buf[..n].copy_from_slice(&self[..n]);
        *self = &self[n..];
        Ok(n)
    }
}

/// Receives decoded blocks. Coordinates and sizes are post-downscale;
/// `rgb` holds `w * h` RGB888 samples, row-major.
pub trait BlockSink {
    fn block(&mut self, x: u16, y: u16, w: u16, h: u16, rgb: &[u8]);
}

// types

#[derive(Clone, Copy, Default)]
struct Component {
    id: u8,
    h_samp: u8,
    v_samp: u8,
    qt_idx: u8,
    dc_tbl: u8,
    ac_tbl: u8,
}

struct HuffTable {
    lut: [(u8, u8); 256],
    mincode: [i32; 17],
    maxcode: [i32; 17],
    valptr: [usize; 17],
    values: [u8; 256],
}

struct JpegState {
    width: u16,
    height: u16,
    num_comp: u8,
    comp: [Component; MAX_COMP],
    max_h: u8,
    max_v: u8,
    qt: [[u16; 64]; 4],
    qt_ok: [bool; 4],
    dc_huff: [HuffTable; 4],
    ac_huff: [HuffTable; 4],
    dc_ok: [bool; 4],
    ac_ok: [bool; 4],
    restart_interval: u16,
    // byte offset of entropy data (relative to start of JPEG data)
    scan_start: usize,
    scan_num_comp: u8,
    scan_order: [u8; MAX_COMP],
}

impl JpegState {
    fn heap_new() -> Result<Box<Self>, DecodeError> {
        let layout = core::alloc::Layout::new::<Self>();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(DecodeError::AllocationFailure);
        }
        let mut st = unsafe { Box::from_raw(ptr as *mut Self) };
        st.max_h = 1;
        st.max_v = 1;
        for ht in st.dc_huff.iter_mut().chain(st.ac_huff.iter_mut()) {
            ht.maxcode.fill(-1);
        }
        Ok(st)
    }
}

// byte source plumbing: header-arena tail first, then buffered reads

struct ScanReader<'a, S> {
    tail: &'a [u8],
    tpos: usize,
    source: &'a mut S,
    buf: [u8; SCAN_BUF],
    pos: usize,
    len: usize,
    eof: bool,
}

impl<'a, S: JpegSource> ScanReader<'a, S> {
    fn new(tail: &'a [u8], source: &'a mut S) -> Self {
        Self {
            tail,
            tpos: 0,
            source,
            buf: [0u8; SCAN_BUF],
            pos: 0,
            len: 0,
            eof: false,
        }
    }

    // next entropy byte; at end of stream yields 0 (bit padding) and
    // flips the eof flag
    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        if self.tpos < self.tail.len() {
            let b = self.tail[self.tpos];
            self.tpos += 1;
            return Ok(b);
        }
        if self.pos >= self.len {
            if self.eof {
                return Ok(0);
            }
            let n = self.source.read(&mut self.buf)?;
            if n == 0 {
                self.eof = true;
                return Ok(0);
            }
            self.pos = 0;
            self.len = n;
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn is_eof(&self) -> bool {
        self.tpos >= self.tail.len() && self.pos >= self.len && self.eof
    }
}

// bit reader over the entropy stream, with marker stashing

struct BitReader<'a, S> {
    source: ScanReader<'a, S>,
    buf: u32,
    avail: u8,
    marker: u8, // stashed marker byte (non-zero = encountered during next_byte)
}

impl<'a, S: JpegSource> BitReader<'a, S> {
    fn new(source: ScanReader<'a, S>) -> Self {
        Self {
            source,
            buf: 0,
            avail: 0,
            marker: 0,
        }
    }

    // fetch next entropy-coded byte, handling JPEG byte stuffing
    fn next_byte(&mut self) -> Result<u8, DecodeError> {
        if self.marker != 0 {
            return Ok(0);
        }
        let b = self.source.read_byte()?;
        if b != 0xFF {
            return Ok(b);
        }
        loop {
            if self.source.is_eof() {
                return Ok(0);
            }
            let next = self.source.read_byte()?;
            match next {
                0x00 => return Ok(0xFF),
                0xFF => continue,
                _ => {
                    self.marker = next;
                    return Ok(0);
                }
            }
        }
    }

    fn ensure(&mut self, n: u8) -> Result<(), DecodeError> {
        while self.avail < n {
            let b = self.next_byte()?;
            self.buf |= (b as u32) << (24 - self.avail);
            self.avail += 8;
        }
        Ok(())
    }

    #[inline]
    fn peek(&mut self, n: u8) -> Result<u32, DecodeError> {
        self.ensure(n)?;
        Ok(self.buf >> (32 - n as u32))
    }

    #[inline]
    fn drop_bits(&mut self, n: u8) {
        self.buf <<= n as u32;
        self.avail -= n;
    }

    #[inline]
    fn read_bits(&mut self, n: u8) -> Result<u32, DecodeError> {
        if n == 0 {
            return Ok(0);
        }
        self.ensure(n)?;
        let val = self.buf >> (32 - n as u32);
        self.buf <<= n as u32;
        self.avail -= n;
        Ok(val)
    }

    // true once a byte had to be synthesized past the end of the input;
    // a complete scan ends at its EOI marker without ever reaching here
    fn ran_dry(&self) -> bool {
        self.source.eof
    }

    // discard remaining bits, advance past the next restart marker
    fn consume_restart(&mut self) -> Result<(), DecodeError> {
        self.buf = 0;
        self.avail = 0;

        // if next_byte already stashed a marker, check it now
        if self.marker != 0 {
            self.marker = 0;
            return Ok(());
        }

        // scan forward for the restart marker
        loop {
            if self.source.is_eof() {
                return Ok(());
            }
            let b = self.source.read_byte()?;
            if b != 0xFF {
                continue;
            }
            loop {
                if self.source.is_eof() {
                    return Ok(());
                }
                let m = self.source.read_byte()?;
                match m {
                    0xFF => continue,
                    0x00 => break,
                    M_RST0..=M_RST7 => return Ok(()),
                    _ => return Ok(()),
                }
            }
        }
    }
}

// public API

/// A parsed JPEG header, ready to decode its scan data.
///
/// `prepare` reads the header through the supplied scratch arena; the
/// arena must stay alive until `decode` because the first entropy bytes
/// usually land in it.
pub struct JpegDecoder<'a> {
    st: Box<JpegState>,
    tail: &'a [u8],
}

impl<'a> JpegDecoder<'a> {
    /// Parse markers up to and including SOS. All marker segments must
    /// fit inside `arena`; `Unsupported` otherwise.
    pub fn prepare<S: JpegSource>(
        source: &mut S,
        arena: &'a mut [u8],
    ) -> Result<Self, DecodeError> {
        let mut filled = 0usize;
        while filled < arena.len() {
            let n = source.read(&mut arena[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let st = parse_markers(&arena[..filled])?;
        validate(&st)?;

        let arena: &'a [u8] = arena;
        Ok(Self {
            tail: &arena[st.scan_start..filled],
            st,
        })
    }

    /// Source image width in pixels, before any downscale.
    pub fn width(&self) -> u16 {
        self.st.width
    }

    pub fn height(&self) -> u16 {
        self.st.height
    }

    /// Decode the whole scan, delivering one downscaled RGB888 block per
    /// MCU to `sink`. Consumes the decoder; a failed decode releases
    /// everything on unwind-free drop.
    pub fn decode<S: JpegSource, K: BlockSink>(
        self,
        source: &mut S,
        scale: JpegScale,
        sink: &mut K,
    ) -> Result<(), DecodeError> {
        let reader = BitReader::new(ScanReader::new(self.tail, source));
        decode_baseline(&self.st, reader, scale, sink)
    }
}

fn validate(st: &JpegState) -> Result<(), DecodeError> {
    if st.width == 0 || st.height == 0 {
        return Err(DecodeError::Unsupported("jpeg: zero dimensions"));
    }
    if (st.width as u32) * (st.height as u32) > MAX_PIXELS {
        return Err(DecodeError::Unsupported("jpeg: exceeds pixel limit"));
    }
    if st.num_comp != 1 && st.num_comp != 3 {
        return Err(DecodeError::Unsupported("jpeg: unsupported component count"));
    }
    if st.scan_num_comp != st.num_comp {
        return Err(DecodeError::Unsupported("jpeg: non-interleaved scan"));
    }
    if st.max_h > 2 || st.max_v > 2 {
        return Err(DecodeError::Unsupported("jpeg: sampling factor > 2"));
    }
    for sci in 0..st.scan_num_comp as usize {
        let ci = st.scan_order[sci] as usize;
        let c = &st.comp[ci];
        if !st.qt_ok[c.qt_idx as usize] {
            return Err(DecodeError::Unsupported("jpeg: missing quant table"));
        }
        if !st.dc_ok[c.dc_tbl as usize] {
            return Err(DecodeError::Unsupported("jpeg: missing DC Huffman table"));
        }
        if !st.ac_ok[c.ac_tbl as usize] {
            return Err(DecodeError::Unsupported("jpeg: missing AC Huffman table"));
        }
    }
    Ok(())
}

// baseline decode core

fn decode_baseline<S: JpegSource, K: BlockSink>(
    st: &JpegState,
    mut reader: BitReader<'_, S>,
    scale: JpegScale,
    sink: &mut K,
) -> Result<(), DecodeError> {
    let w = st.width as usize;
    let h = st.height as usize;
    let shift = scale.shift() as usize;
    let f = 1usize << shift;

    let mcu_w = st.max_h as usize * 8;
    let mcu_h = st.max_v as usize * 8;
    let mcus_x = (w + mcu_w - 1) / mcu_w;
    let mcus_y = (h + mcu_h - 1) / mcu_h;

    log::info!(
        "jpeg: baseline {}x{} -> {}x{} (1/{})",
        w,
        h,
        scale.apply(st.width),
        scale.apply(st.height),
        f
    );

    // per-component sample planes for one MCU, fixed 16-byte stride
    let mut planes = [[128u8; MCU_STRIDE * MCU_STRIDE]; 3];
    let mut rgb = [0u8; MCU_STRIDE * MCU_STRIDE * 3];

    let mut dc_pred = [0i32; MAX_COMP];
    let mut block = [0i32; 64];
    let mut pix = [0u8; 64];
    let mut mcu_cnt: u32 = 0;
    let total_mcus = (mcus_x * mcus_y) as u32;

    for mcu_row in 0..mcus_y {
        for mcu_col in 0..mcus_x {
            for sci in 0..st.scan_num_comp as usize {
                let ci = st.scan_order[sci] as usize;
                let c = &st.comp[ci];

                for bv in 0..c.v_samp as usize {
                    for bh in 0..c.h_samp as usize {
                        decode_block(
                            &mut reader,
                            &st.dc_huff[c.dc_tbl as usize],
                            &st.ac_huff[c.ac_tbl as usize],
                            &mut dc_pred[ci],
                            &st.qt[c.qt_idx as usize],
                            &mut block,
                        )?;
                        idct(&block, &mut pix);
                        let plane = &mut planes[ci];
                        for r in 0..8 {
                            let dst = (bv * 8 + r) * MCU_STRIDE + bh * 8;
                            plane[dst..dst + 8].copy_from_slice(&pix[r * 8..r * 8 + 8]);
                        }
                    }
                }
            }

            emit_mcu(
                st, &planes, &mut rgb, mcu_col, mcu_row, mcu_w, mcu_h, w, h, shift, sink,
            );

            mcu_cnt += 1;

            if st.restart_interval > 0
                && mcu_cnt % st.restart_interval as u32 == 0
                && mcu_cnt < total_mcus
            {
                reader.consume_restart()?;
                dc_pred.fill(0);
            }
        }
    }

    // MCUs decoded from zero padding are not a successful frame
    if reader.ran_dry() {
        return Err(DecodeError::Unsupported("jpeg: truncated scan"));
    }

    Ok(())
}

// convert one decoded MCU to RGB888, box-average down by 1 << shift and
// hand the resulting block to the sink
#[allow(clippy::too_many_arguments)]
fn emit_mcu<K: BlockSink>(
    st: &JpegState,
    planes: &[[u8; MCU_STRIDE * MCU_STRIDE]; 3],
    rgb: &mut [u8; MCU_STRIDE * MCU_STRIDE * 3],
    mcu_col: usize,
    mcu_row: usize,
    mcu_w: usize,
    mcu_h: usize,
    w: usize,
    h: usize,
    shift: usize,
    sink: &mut K,
) {
    let x0 = mcu_col * mcu_w;
    let y0 = mcu_row * mcu_h;
    if x0 >= w || y0 >= h {
        return;
    }
    // clip the MCU to the image, then downscale
    let bw = mcu_w.min(w - x0);
    let bh = mcu_h.min(h - y0);
    let f = 1usize << shift;
    let out_bw = (bw + f - 1) >> shift;
    let out_bh = (bh + f - 1) >> shift;

    let color = st.num_comp == 3;
    let mut out = 0usize;
    for v in 0..out_bh {
        let sy0 = v << shift;
        let sy1 = (sy0 + f).min(bh);
        for u in 0..out_bw {
            let sx0 = u << shift;
            let sx1 = (sx0 + f).min(bw);

            // box-average each component in its own sampling grid
            let (mut sum_y, mut sum_cb, mut sum_cr) = (0u32, 0u32, 0u32);
            let mut cnt = 0u32;
            for py in sy0..sy1 {
                for px in sx0..sx1 {
                    sum_y += sample(planes, st, 0, px, py) as u32;
                    if color {
                        sum_cb += sample(planes, st, 1, px, py) as u32;
                        sum_cr += sample(planes, st, 2, px, py) as u32;
                    }
                    cnt += 1;
                }
            }
            let y = (sum_y / cnt) as i32;
            let (r, g, b) = if color {
                ycbcr_to_rgb(y, (sum_cb / cnt) as i32, (sum_cr / cnt) as i32)
            } else {
                (y as u8, y as u8, y as u8)
            };
            rgb[out] = r;
            rgb[out + 1] = g;
            rgb[out + 2] = b;
            out += 3;
        }
    }

    sink.block(
        (x0 >> shift) as u16,
        (y0 >> shift) as u16,
        out_bw as u16,
        out_bh as u16,
        &rgb[..out],
    );
}

// sample component ci at full-resolution MCU position (px, py);
// subsampled chroma is upsampled by replication
#[inline]
fn sample(
    planes: &[[u8; MCU_STRIDE * MCU_STRIDE]; 3],
    st: &JpegState,
    ci: usize,
    px: usize,
    py: usize,
) -> u8 {
    let c = &st.comp[ci];
    let sx = px * c.h_samp as usize / st.max_h as usize;
    let sy = py * c.v_samp as usize / st.max_v as usize;
    planes[ci][sy * MCU_STRIDE + sx]
}

#[inline]
fn ycbcr_to_rgb(y: i32, cb: i32, cr: i32) -> (u8, u8, u8) {
    let cb = cb - 128;
    let cr = cr - 128;
    let r = y + ((C_CR_R * cr) >> 10);
    let g = y - ((C_CB_G * cb + C_CR_G * cr) >> 10);
    let b = y + ((C_CB_B * cb) >> 10);
    (clamp(r), clamp(g), clamp(b))
}

// marker parsing (operates on the header arena)

fn parse_markers(data: &[u8]) -> Result<Box<JpegState>, DecodeError> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != M_SOI {
        return Err(DecodeError::Unsupported("jpeg: invalid signature"));
    }
    let mut st = JpegState::heap_new()?;
    let mut pos = 2usize;
    let len = data.len();

    loop {
        while pos < len && data[pos] != 0xFF {
            pos += 1;
        }
        while pos < len && data[pos] == 0xFF {
            pos += 1;
        }
        if pos >= len {
            return Err(DecodeError::Unsupported("jpeg: header exceeds arena"));
        }
        let marker = data[pos];
        pos += 1;

        match marker {
            0x00 | M_RST0..=M_RST7 => continue,

            M_SOF0 => parse_sof(data, &mut pos, &mut st)?,
            M_SOF2 => return Err(DecodeError::Unsupported("jpeg: progressive not supported")),
            0xC1 | 0xC3 | 0xC5..=0xCB | 0xCD..=0xCF => {
                return Err(DecodeError::Unsupported("jpeg: unsupported SOF variant"));
            }
            M_DHT => parse_dht(data, &mut pos, &mut st)?,
            M_DQT => parse_dqt(data, &mut pos, &mut st)?,
            M_DRI => parse_dri(data, &mut pos, &mut st)?,
            M_SOS => {
                parse_sos(data, &mut pos, &mut st)?;
                st.scan_start = pos;
                return Ok(st);
            }
            M_EOI => return Err(DecodeError::Unsupported("jpeg: EOI before SOS")),
            _ => {
                if pos + 2 > len {
                    return Err(DecodeError::Unsupported("jpeg: header exceeds arena"));
                }
                let seg = be_u16(data, pos) as usize;
                if seg < 2 || pos + seg > len {
                    return Err(DecodeError::Unsupported("jpeg: header exceeds arena"));
                }
                pos += seg;
            }
        }
    }
}

fn parse_sof(data: &[u8], pos: &mut usize, st: &mut JpegState) -> Result<(), DecodeError> {
    const TRUNC: DecodeError = DecodeError::Unsupported("jpeg: SOF truncated");
    if *pos + 2 > data.len() {
        return Err(TRUNC);
    }
    let seg = be_u16(data, *pos) as usize;
    *pos += 2;
    // shortest legal SOF: length + precision + dimensions + count
    if seg < 8 || *pos + seg - 2 > data.len() {
        return Err(TRUNC);
    }
    let p = *pos;
    if data[p] != 8 {
        return Err(DecodeError::Unsupported("jpeg: only 8-bit precision"));
    }
    st.height = be_u16(data, p + 1);
    st.width = be_u16(data, p + 3);
    st.num_comp = data[p + 5];
    if st.num_comp == 0 || st.num_comp as usize > MAX_COMP {
        return Err(DecodeError::Unsupported("jpeg: bad component count"));
    }
    if seg < 8 + 3 * st.num_comp as usize {
        return Err(TRUNC);
    }
    let mut off = p + 6;
    st.max_h = 1;
    st.max_v = 1;
    for i in 0..st.num_comp as usize {
        st.comp[i].id = data[off];
        let samp = data[off + 1];
        st.comp[i].h_samp = samp >> 4;
        st.comp[i].v_samp = samp & 0x0F;
        st.comp[i].qt_idx = data[off + 2];
        if st.comp[i].h_samp == 0 || st.comp[i].v_samp == 0 {
            return Err(DecodeError::Unsupported("jpeg: zero sampling factor"));
        }
        st.max_h = st.max_h.max(st.comp[i].h_samp);
        st.max_v = st.max_v.max(st.comp[i].v_samp);
        off += 3;
    }
    *pos += seg - 2;
    Ok(())
}

fn parse_dqt(data: &[u8], pos: &mut usize, st: &mut JpegState) -> Result<(), DecodeError> {
    const TRUNC: DecodeError = DecodeError::Unsupported("jpeg: DQT truncated");
    if *pos + 2 > data.len() {
        return Err(TRUNC);
    }
    let seg = be_u16(data, *pos) as usize;
    let end = *pos + seg;
    *pos += 2;
    if end > data.len() {
        return Err(TRUNC);
    }
    while *pos < end {
        let info = data[*pos];
        *pos += 1;
        let prec = info >> 4;
        let id = (info & 0x0F) as usize;
        if id >= 4 {
            return Err(DecodeError::Unsupported("jpeg: DQT id out of range"));
        }
        if prec == 0 {
            if *pos + 64 > end {
                return Err(TRUNC);
            }
            for i in 0..64 {
                st.qt[id][i] = data[*pos] as u16;
                *pos += 1;
            }
        } else {
            if *pos + 128 > end {
                return Err(TRUNC);
            }
            for i in 0..64 {
                st.qt[id][i] = be_u16(data, *pos);
                *pos += 2;
            }
        }
        st.qt_ok[id] = true;
    }
    Ok(())
}

fn parse_dht(data: &[u8], pos: &mut usize, st: &mut JpegState) -> Result<(), DecodeError> {
    const TRUNC: DecodeError = DecodeError::Unsupported("jpeg: DHT truncated");
    if *pos + 2 > data.len() {
        return Err(TRUNC);
    }
    let seg = be_u16(data, *pos) as usize;
    let end = *pos + seg;
    *pos += 2;
    if end > data.len() {
        return Err(TRUNC);
    }
    while *pos < end {
        if *pos + 17 > end {
            return Err(TRUNC);
        }
        let info = data[*pos];
        *pos += 1;
        let class = info >> 4;
        let id = (info & 0x0F) as usize;
        if id >= 4 {
            return Err(DecodeError::Unsupported("jpeg: DHT id out of range"));
        }
        let mut bits = [0u8; 16];
        bits.copy_from_slice(&data[*pos..*pos + 16]);
        *pos += 16;
        let total: usize = bits.iter().map(|&b| b as usize).sum();
        if total > 256 || *pos + total > end {
            return Err(DecodeError::Unsupported("jpeg: DHT value overflow"));
        }
        let vals = &data[*pos..*pos + total];
        *pos += total;
        if class == 0 {
            build_huff_table(&mut st.dc_huff[id], &bits, vals);
            st.dc_ok[id] = true;
        } else {
            build_huff_table(&mut st.ac_huff[id], &bits, vals);
            st.ac_ok[id] = true;
        }
    }
    Ok(())
}

fn parse_dri(data: &[u8], pos: &mut usize, st: &mut JpegState) -> Result<(), DecodeError> {
    if *pos + 4 > data.len() {
        return Err(DecodeError::Unsupported("jpeg: DRI truncated"));
    }
    *pos += 2;
    st.restart_interval = be_u16(data, *pos);
    *pos += 2;
    Ok(())
}

fn parse_sos(data: &[u8], pos: &mut usize, st: &mut JpegState) -> Result<(), DecodeError> {
    const TRUNC: DecodeError = DecodeError::Unsupported("jpeg: SOS truncated");
    if *pos + 2 > data.len() {
        return Err(TRUNC);
    }
    let seg = be_u16(data, *pos) as usize;
    // shortest legal SOS: length + count + one component pair + trailer
    if seg < 8 || *pos + seg > data.len() {
        return Err(TRUNC);
    }
    *pos += 2;
    st.scan_num_comp = data[*pos];
    *pos += 1;
    if st.scan_num_comp == 0 || st.scan_num_comp > st.num_comp {
        return Err(DecodeError::Unsupported("jpeg: bad SOS component count"));
    }
    if seg < 6 + 2 * st.scan_num_comp as usize {
        return Err(TRUNC);
    }
    for sci in 0..st.scan_num_comp as usize {
        let cs = data[*pos];
        let td_ta = data[*pos + 1];
        *pos += 2;
        let mut found = false;
        for j in 0..st.num_comp as usize {
            if st.comp[j].id == cs {
                st.comp[j].dc_tbl = td_ta >> 4;
                st.comp[j].ac_tbl = td_ta & 0x0F;
                st.scan_order[sci] = j as u8;
                found = true;
                break;
            }
        }
        if !found {
            return Err(DecodeError::Unsupported(
                "jpeg: SOS references unknown component",
            ));
        }
    }
    // spectral selection / successive approximation; fixed for baseline
    *pos += 3;
    Ok(())
}

// Huffman table construction

fn build_huff_table(table: &mut HuffTable, bits: &[u8; 16], vals: &[u8]) {
    let total: usize = bits.iter().map(|&b| b as usize).sum();
    table.values[..total].copy_from_slice(&vals[..total]);
    table.lut.fill((0, 0));
    table.maxcode.fill(-1);

    let mut code: u32 = 0;
    let mut si: usize = 0;

    for bl in 1..=16usize {
        let cnt = bits[bl - 1] as usize;
        if cnt > 0 {
            table.valptr[bl] = si;
            table.mincode[bl] = code as i32;
            for _ in 0..cnt {
                if bl <= 8 {
                    let prefix = (code << (8 - bl)) as usize;
                    let fill = 1usize << (8 - bl);
                    for k in 0..fill {
                        if prefix + k < 256 {
                            table.lut[prefix + k] = (vals[si], bl as u8);
                        }
                    }
                }
                si += 1;
                code += 1;
            }
            table.maxcode[bl] = (code - 1) as i32;
        }
        code <<= 1;
    }
}

// Huffman decode

fn huff_decode<S: JpegSource>(
    r: &mut BitReader<'_, S>,
    t: &HuffTable,
) -> Result<u8, DecodeError> {
    let peek8 = r.peek(8)? as usize;
    let (sym, nb) = t.lut[peek8];
    if nb > 0 {
        r.drop_bits(nb);
        return Ok(sym);
    }
    let peek16 = r.peek(16)? as i32;
    for bl in 9..=16u8 {
        let code = peek16 >> (16 - bl);
        if t.maxcode[bl as usize] >= 0 && code <= t.maxcode[bl as usize] {
            r.drop_bits(bl);
            let idx = t.valptr[bl as usize] as i32 + code - t.mincode[bl as usize];
            return Ok(t.values[idx as usize]);
        }
    }
    Err(DecodeError::Unsupported("jpeg: invalid Huffman code"))
}

#[inline]
fn extend(bits: u32, size: u8) -> i32 {
    let half = 1u32 << (size as u32 - 1);
    if bits < half {
        bits as i32 - ((1u32 << size as u32) as i32 - 1)
    } else {
        bits as i32
    }
}

fn decode_block<S: JpegSource>(
    r: &mut BitReader<'_, S>,
    dc_ht: &HuffTable,
    ac_ht: &HuffTable,
    dc_pred: &mut i32,
    qt: &[u16; 64],
    blk: &mut [i32; 64],
) -> Result<(), DecodeError> {
    blk.fill(0);

    let dc_size = huff_decode(r, dc_ht)?;
    if dc_size > 0 {
        if dc_size > 11 {
            return Err(DecodeError::Unsupported("jpeg: DC size > 11"));
        }
        let bits = r.read_bits(dc_size)?;
        *dc_pred += extend(bits, dc_size);
    }
    blk[0] = (*dc_pred).wrapping_mul(qt[0] as i32);

    let mut k: usize = 1;
    while k <= 63 {
        let sym = huff_decode(r, ac_ht)?;
        let run = (sym >> 4) as usize;
        let size = sym & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16;
            } else {
                break;
            }
        } else {
            k += run;
            if k > 63 {
                return Err(DecodeError::Unsupported("jpeg: AC index overflow"));
            }
            let bits = r.read_bits(size)?;
            let val = extend(bits, size);
            blk[ZZ[k]] = val.wrapping_mul(qt[k] as i32);
            k += 1;
        }
    }
    Ok(())
}

// integer IDCT (IJG ISLOW, two-pass row + col)

fn idct(block: &[i32; 64], out: &mut [u8; 64]) {
    let mut ws = [0i32; 64];

    for row in 0..8 {
        let b = row * 8;
        let (d0, d1, d2, d3) = (block[b], block[b + 1], block[b + 2], block[b + 3]);
        let (d4, d5, d6, d7) = (block[b + 4], block[b + 5], block[b + 6], block[b + 7]);

        if d1 == 0 && d2 == 0 && d3 == 0 && d4 == 0 && d5 == 0 && d6 == 0 && d7 == 0 {
            let dc = d0 << P1;
            ws[b..b + 8].fill(dc);
            continue;
        }

        let z1 = (d2 + d6).wrapping_mul(F0541);
        let tmp2 = z1 + d6.wrapping_mul(-F1847);
        let tmp3 = z1 + d2.wrapping_mul(F0765);
        let tmp0 = (d0 + d4) << CB;
        let tmp1 = (d0 - d4) << CB;
        let (t10, t13) = (tmp0 + tmp3, tmp0 - tmp3);
        let (t11, t12) = (tmp1 + tmp2, tmp1 - tmp2);

        let (zz1, zz2, zz3, zz4) = (d7 + d1, d5 + d3, d7 + d3, d5 + d1);
        let z5 = (zz3 + zz4).wrapping_mul(F1175);
        let mut o0 = d7.wrapping_mul(F0298);
        let mut o1 = d5.wrapping_mul(F2053);
        let mut o2 = d3.wrapping_mul(F3072);
        let mut o3 = d1.wrapping_mul(F1501);
        let (s1, s2) = (zz1.wrapping_mul(-F0899), zz2.wrapping_mul(-F2562));
        let s3 = zz3.wrapping_mul(-F1961) + z5;
        let s4 = zz4.wrapping_mul(-F0390) + z5;
        o0 += s1 + s3;
        o1 += s2 + s4;
        o2 += s2 + s3;
        o3 += s1 + s4;

        let sh = CB - P1;
        ws[b] = descale(t10 + o3, sh);
        ws[b + 7] = descale(t10 - o3, sh);
        ws[b + 1] = descale(t11 + o2, sh);
        ws[b + 6] = descale(t11 - o2, sh);
        ws[b + 2] = descale(t12 + o1, sh);
        ws[b + 5] = descale(t12 - o1, sh);
        ws[b + 3] = descale(t13 + o0, sh);
        ws[b + 4] = descale(t13 - o0, sh);
    }

    for col in 0..8 {
        let (d0, d1, d2, d3) = (ws[col], ws[col + 8], ws[col + 16], ws[col + 24]);
        let (d4, d5, d6, d7) = (ws[col + 32], ws[col + 40], ws[col + 48], ws[col + 56]);

        if d1 == 0 && d2 == 0 && d3 == 0 && d4 == 0 && d5 == 0 && d6 == 0 && d7 == 0 {
            let v = clamp(descale(d0, P1 + 3) + 128);
            out[col] = v;
            out[col + 8] = v;
            out[col + 16] = v;
            out[col + 24] = v;
            out[col + 32] = v;
            out[col + 40] = v;
            out[col + 48] = v;
            out[col + 56] = v;
            continue;
        }

        let z1 = (d2 + d6).wrapping_mul(F0541);
        let tmp2 = z1 + d6.wrapping_mul(-F1847);
        let tmp3 = z1 + d2.wrapping_mul(F0765);
        let tmp0 = (d0 + d4) << CB;
        let tmp1 = (d0 - d4) << CB;
        let (t10, t13) = (tmp0 + tmp3, tmp0 - tmp3);
        let (t11, t12) = (tmp1 + tmp2, tmp1 - tmp2);

        let (zz1, zz2, zz3, zz4) = (d7 + d1, d5 + d3, d7 + d3, d5 + d1);
        let z5 = (zz3 + zz4).wrapping_mul(F1175);
        let mut o0 = d7.wrapping_mul(F0298);
        let mut o1 = d5.wrapping_mul(F2053);
        let mut o2 = d3.wrapping_mul(F3072);
        let mut o3 = d1.wrapping_mul(F1501);
        let (s1, s2) = (zz1.wrapping_mul(-F0899), zz2.wrapping_mul(-F2562));
        let s3 = zz3.wrapping_mul(-F1961) + z5;
        let s4 = zz4.wrapping_mul(-F0390) + z5;
        o0 += s1 + s3;
        o1 += s2 + s4;
        o2 += s2 + s3;
        o3 += s1 + s4;

        let sh = CB + P1 + 3;
        out[col] = clamp(descale(t10 + o3, sh) + 128);
        out[col + 56] = clamp(descale(t10 - o3, sh) + 128);
        out[col + 8] = clamp(descale(t11 + o2, sh) + 128);
        out[col + 48] = clamp(descale(t11 - o2, sh) + 128);
        out[col + 16] = clamp(descale(t12 + o1, sh) + 128);
        out[col + 40] = clamp(descale(t12 - o1, sh) + 128);
        out[col + 24] = clamp(descale(t13 + o0, sh) + 128);
        out[col + 32] = clamp(descale(t13 - o0, sh) + 128);
    }
}

// helpers

#[inline]
fn descale(x: i32, n: i32) -> i32 {
    (x + (1 << (n - 1))) >> n
}

#[inline]
fn clamp(x: i32) -> u8 {
    x.clamp(0, 255) as u8
}

#[inline]
fn be_u16(d: &[u8], o: usize) -> u16 {
    u16::from_be_bytes([d[o], d[o + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct CollectSink {
        blocks: Vec<(u16, u16, u16, u16, Vec<u8>)>,
    }

    impl CollectSink {
        fn new() -> Self {
            Self { blocks: Vec::new() }
        }
    }

    impl BlockSink for CollectSink {
        fn block(&mut self, x: u16, y: u16, w: u16, h: u16, rgb: &[u8]) {
            self.blocks.push((x, y, w, h, rgb.to_vec()));
        }
    }

    // trivial one-symbol Huffman table: a single 1-bit code for value 0
    fn dht_segment(class_id: u8) -> Vec<u8> {
        let mut seg = alloc::vec![0xFF, M_DHT, 0x00, 0x14, class_id];
        seg.push(1); // one code of length 1
        seg.extend_from_slice(&[0u8; 15]);
        seg.push(0x00); // the value it decodes to
        seg
    }

    fn dqt_flat() -> Vec<u8> {
        let mut seg = alloc::vec![0xFF, M_DQT, 0x00, 0x43, 0x00];
        seg.extend_from_slice(&[1u8; 64]);
        seg
    }

    // 8x8 single-component baseline JPEG; every block is DC 0 + EOB,
    // which decodes to uniform mid-grey 128
    fn grey_jpeg_8x8() -> Vec<u8> {
        let mut j = alloc::vec![0xFF, M_SOI];
        j.extend_from_slice(&dqt_flat());
        j.extend_from_slice(&[
            0xFF, M_SOF0, 0x00, 0x0B, 8, 0x00, 0x08, 0x00, 0x08, 1, 0x01, 0x11, 0x00,
        ]);
        j.extend_from_slice(&dht_segment(0x00));
        j.extend_from_slice(&dht_segment(0x10));
        j.extend_from_slice(&[0xFF, M_SOS, 0x00, 0x08, 1, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        // two 1-bit codes (DC size 0, AC EOB) padded with ones
        j.push(0x3F);
        j.extend_from_slice(&[0xFF, M_EOI]);
        j
    }

    // 8x8 three-component 4:4:4 baseline JPEG, all blocks DC 0 + EOB
    fn grey_jpeg_8x8_color() -> Vec<u8> {
        let mut j = alloc::vec![0xFF, M_SOI];
        j.extend_from_slice(&dqt_flat());
        j.extend_from_slice(&[
            0xFF, M_SOF0, 0x00, 0x11, 8, 0x00, 0x08, 0x00, 0x08, 3, 0x01, 0x11, 0x00, 0x02,
            0x11, 0x00, 0x03, 0x11, 0x00,
        ]);
        j.extend_from_slice(&dht_segment(0x00));
        j.extend_from_slice(&dht_segment(0x10));
        j.extend_from_slice(&[
            0xFF, M_SOS, 0x00, 0x0C, 3, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x3F, 0x00,
        ]);
        // six 1-bit codes padded with ones
        j.push(0x03);
        j.extend_from_slice(&[0xFF, M_EOI]);
        j
    }

    #[test]
    fn decodes_minimal_grey_jpeg() {
        let data = grey_jpeg_8x8();
        let mut src = data.as_slice();
        let mut arena = [0u8; 512];
        let dec = JpegDecoder::prepare(&mut src, &mut arena).unwrap();
        assert_eq!((dec.width(), dec.height()), (8, 8));

        let mut sink = CollectSink::new();
        dec.decode(&mut src, JpegScale::Full, &mut sink).unwrap();

        assert_eq!(sink.blocks.len(), 1);
        let (x, y, w, h, ref rgb) = sink.blocks[0];
        assert_eq!((x, y, w, h), (0, 0, 8, 8));
        assert_eq!(rgb.len(), 8 * 8 * 3);
        assert!(rgb.iter().all(|&c| c == 128));
    }

    #[test]
    fn decodes_interleaved_color_jpeg() {
        let data = grey_jpeg_8x8_color();
        let mut src = data.as_slice();
        let mut arena = [0u8; 512];
        let dec = JpegDecoder::prepare(&mut src, &mut arena).unwrap();
        assert_eq!((dec.width(), dec.height()), (8, 8));

        let mut sink = CollectSink::new();
        dec.decode(&mut src, JpegScale::Full, &mut sink).unwrap();

        // neutral chroma keeps every channel at mid-grey
        let (_, _, w, h, ref rgb) = sink.blocks[0];
        assert_eq!((w, h), (8, 8));
        assert!(rgb.iter().all(|&c| c == 128));
    }

    #[test]
    fn downscale_by_eight_averages_to_one_pixel() {
        let data = grey_jpeg_8x8();
        let mut src = data.as_slice();
        let mut arena = [0u8; 512];
        let dec = JpegDecoder::prepare(&mut src, &mut arena).unwrap();

        let mut sink = CollectSink::new();
        dec.decode(&mut src, JpegScale::Eighth, &mut sink).unwrap();

        assert_eq!(sink.blocks.len(), 1);
        let (x, y, w, h, ref rgb) = sink.blocks[0];
        assert_eq!((x, y, w, h), (0, 0, 1, 1));
        assert_eq!(rgb.as_slice(), &[128, 128, 128]);
    }

    #[test]
    fn rejects_garbage() {
        let data = [0x00u8; 64];
        let mut src = data.as_slice();
        let mut arena = [0u8; 128];
        match JpegDecoder::prepare(&mut src, &mut arena) {
            Err(DecodeError::Unsupported(_)) => {}
            other => panic!("expected Unsupported, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn header_must_fit_arena() {
        let data = grey_jpeg_8x8();
        let mut src = data.as_slice();
        // too small to reach SOS
        let mut arena = [0u8; 16];
        match JpegDecoder::prepare(&mut src, &mut arena) {
            Err(DecodeError::Unsupported(_)) => {}
            other => panic!("expected Unsupported, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_sos_with_lying_length() {
        // declared length 2 leaves no room for the component count
        let j = [0xFF, M_SOI, 0xFF, M_SOS, 0x00, 0x02];
        let mut src = j.as_slice();
        let mut arena = [0u8; 64];
        assert_eq!(
            JpegDecoder::prepare(&mut src, &mut arena).err(),
            Some(DecodeError::Unsupported("jpeg: SOS truncated"))
        );
    }

    #[test]
    fn rejects_sof_with_lying_length() {
        // declared length 3 ends before the image dimensions
        let j = [0xFF, M_SOI, 0xFF, M_SOF0, 0x00, 0x03, 8];
        let mut src = j.as_slice();
        let mut arena = [0u8; 64];
        assert_eq!(
            JpegDecoder::prepare(&mut src, &mut arena).err(),
            Some(DecodeError::Unsupported("jpeg: SOF truncated"))
        );
    }

    #[test]
    fn rejects_sof_component_list_past_segment_end() {
        // three components declared but only one fits the segment
        let j = [
            0xFF, M_SOI, 0xFF, M_SOF0, 0x00, 0x0B, 8, 0x00, 0x08, 0x00, 0x08, 3, 0x01, 0x11,
            0x00,
        ];
        let mut src = j.as_slice();
        let mut arena = [0u8; 64];
        assert_eq!(
            JpegDecoder::prepare(&mut src, &mut arena).err(),
            Some(DecodeError::Unsupported("jpeg: SOF truncated"))
        );
    }

    #[test]
    fn truncated_scan_is_an_error() {
        let mut data = grey_jpeg_8x8();
        // drop the entropy byte and the EOI marker
        data.truncate(data.len() - 3);
        let mut src = data.as_slice();
        let mut arena = [0u8; 512];
        let dec = JpegDecoder::prepare(&mut src, &mut arena).unwrap();

        let mut sink = CollectSink::new();
        assert_eq!(
            dec.decode(&mut src, JpegScale::Full, &mut sink).err(),
            Some(DecodeError::Unsupported("jpeg: truncated scan"))
        );
    }

    #[test]
    fn rejects_progressive() {
        let mut j = alloc::vec![0xFF, M_SOI];
        j.extend_from_slice(&dqt_flat());
        j.extend_from_slice(&[
            0xFF, M_SOF2, 0x00, 0x0B, 8, 0x00, 0x08, 0x00, 0x08, 1, 0x01, 0x11, 0x00,
        ]);
        let mut src = j.as_slice();
        let mut arena = [0u8; 256];
        assert_eq!(
            JpegDecoder::prepare(&mut src, &mut arena).err(),
            Some(DecodeError::Unsupported("jpeg: progressive not supported"))
        );
    }
}
