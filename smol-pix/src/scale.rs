// Aspect-fit planning for the two decode paths.
//
// PNG uses a float scale with forward pixel mapping at draw time, so any
// ratio (including upscale) works. JPEG downscales inside the block
// decoder, which only knows power-of-two factors; the bucket choice can
// leave a frame smaller than the screen, and the caller centres it.

/// Float fit plan: scale factor, clamped destination size and centred
/// top-left offsets inside a screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPlan {
    pub scale: f32,
    pub dest_w: u16,
    pub dest_h: u16,
    pub col_offset: u16,
    pub row_offset: u16,
}

impl FitPlan {
    /// Fit `src_w` x `src_h` into `screen_w` x `screen_h`, preserving
    /// aspect ratio. The smaller of the two axis ratios wins, so the
    /// scaled image never exceeds the screen on either axis.
    pub fn compute(src_w: u32, src_h: u32, screen_w: u16, screen_h: u16) -> Self {
        let ratio_w = screen_w as f32 / src_w as f32;
        let ratio_h = screen_h as f32 / src_h as f32;
        let scale = if ratio_w < ratio_h { ratio_w } else { ratio_h };

        let dest_w = ((src_w as f32 * scale) as u32).min(screen_w as u32) as u16;
        let dest_h = ((src_h as f32 * scale) as u32).min(screen_h as u32) as u16;

        FitPlan {
            scale,
            dest_w,
            dest_h,
            col_offset: (screen_w - dest_w) / 2,
            row_offset: (screen_h - dest_h) / 2,
        }
    }

    /// Map a source pixel to its screen position (forward mapping,
    /// truncating). Source coordinates within bounds always land inside
    /// the screen.
    #[inline]
    pub fn map(&self, x: u32, y: u32) -> (u16, u16) {
        let dx = self.col_offset as u32 + (x as f32 * self.scale) as u32;
        let dy = self.row_offset as u32 + (y as f32 * self.scale) as u32;
        (dx as u16, dy as u16)
    }
}

/// Power-of-two downscale buckets of the JPEG block decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegScale {
    Full,
    Half,
    Quarter,
    Eighth,
}

impl JpegScale {
    /// Pick the bucket from the larger shrink ratio required on either
    /// axis: 1 when the source already fits, 1/2 up to 2x, 1/4 up to 4x,
    /// 1/8 beyond that. Ratios past 8 still get 1/8; the oversized
    /// remainder is clipped at the sink.
    pub fn for_size(src_w: u16, src_h: u16, screen_w: u16, screen_h: u16) -> Self {
        if src_w <= screen_w && src_h <= screen_h {
            return JpegScale::Full;
        }
        let rw = src_w as f32 / screen_w as f32;
        let rh = src_h as f32 / screen_h as f32;
        let r = if rw > rh { rw } else { rh };
        if r <= 2.0 {
            JpegScale::Half
        } else if r <= 4.0 {
            JpegScale::Quarter
        } else {
            JpegScale::Eighth
        }
    }

    /// log2 of the divisor.
    pub const fn shift(self) -> u8 {
        match self {
            JpegScale::Full => 0,
            JpegScale::Half => 1,
            JpegScale::Quarter => 2,
            JpegScale::Eighth => 3,
        }
    }

    pub const fn divisor(self) -> u16 {
        1 << self.shift()
    }

    /// Downscaled span of a source dimension (floored, like the decoder).
    #[inline]
    pub const fn apply(self, dim: u16) -> u16 {
        let d = dim >> self.shift();
        if d == 0 { 1 } else { d }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_fit_small_source_upscales() {
        let plan = FitPlan::compute(100, 100, 240, 320);
        assert_eq!(plan.scale, 2.4);
        assert_eq!((plan.dest_w, plan.dest_h), (240, 240));
        assert_eq!((plan.col_offset, plan.row_offset), (0, 40));
    }

    #[test]
    fn png_fit_wide_source() {
        let plan = FitPlan::compute(480, 320, 240, 320);
        assert_eq!(plan.scale, 0.5);
        assert_eq!((plan.dest_w, plan.dest_h), (240, 160));
        assert_eq!((plan.col_offset, plan.row_offset), (0, 80));
    }

    #[test]
    fn png_fit_exact_match_is_identity() {
        let plan = FitPlan::compute(240, 320, 240, 320);
        assert_eq!(plan.scale, 1.0);
        assert_eq!((plan.dest_w, plan.dest_h), (240, 320));
        assert_eq!((plan.col_offset, plan.row_offset), (0, 0));
    }

    #[test]
    fn png_fit_never_exceeds_screen() {
        for &(sw, sh) in &[(1u32, 1u32), (3, 7), (99, 13), (641, 479), (2000, 5)] {
            for &(dw, dh) in &[(240u16, 320u16), (320, 240), (128, 160)] {
                let plan = FitPlan::compute(sw, sh, dw, dh);
                assert!(plan.dest_w <= dw && plan.dest_h <= dh);
                assert!(plan.col_offset as u32 + plan.dest_w as u32 <= dw as u32);
                assert!(plan.row_offset as u32 + plan.dest_h as u32 <= dh as u32);
                // every in-bounds source pixel maps inside the screen
                let (mx, my) = plan.map(sw - 1, sh - 1);
                assert!(mx < dw && my < dh);
            }
        }
    }

    #[test]
    fn jpeg_bucket_fits_picks_full() {
        assert_eq!(JpegScale::for_size(240, 320, 240, 320), JpegScale::Full);
        assert_eq!(JpegScale::for_size(100, 100, 240, 320), JpegScale::Full);
    }

    #[test]
    fn jpeg_bucket_thresholds() {
        // one axis oversized is enough to leave Full
        assert_eq!(JpegScale::for_size(241, 100, 240, 320), JpegScale::Half);
        assert_eq!(JpegScale::for_size(480, 640, 240, 320), JpegScale::Half);
        assert_eq!(JpegScale::for_size(481, 640, 240, 320), JpegScale::Quarter);
        assert_eq!(JpegScale::for_size(960, 1280, 240, 320), JpegScale::Quarter);
        assert_eq!(JpegScale::for_size(961, 1280, 240, 320), JpegScale::Eighth);
        // past 8x still Eighth; the sink clips the remainder
        assert_eq!(JpegScale::for_size(4000, 4000, 240, 320), JpegScale::Eighth);
    }

    #[test]
    fn jpeg_bucket_large_landscape() {
        let s = JpegScale::for_size(1000, 800, 240, 320);
        assert_eq!(s, JpegScale::Eighth);
        assert_eq!(s.divisor(), 8);
        assert_eq!(s.apply(1000), 125);
        assert_eq!(s.apply(800), 100);
    }

    #[test]
    fn jpeg_apply_never_zero() {
        assert_eq!(JpegScale::Eighth.apply(5), 1);
        assert_eq!(JpegScale::Full.apply(1), 1);
    }
}
