// Contiguous RGB565 pixel grid, indexed row-then-column.
//
// One allocation for the whole frame; failure surfaces before any pixel
// is written and release happens in Drop, so a partially-built grid is
// never observable.

use alloc::vec::Vec;

use crate::DecodeError;

// same ceiling as the decoders; a larger request is a corrupt header
const MAX_PIXELS: usize = 2048 * 2048;

pub struct PixelGrid {
    width: u16,
    height: u16,
    data: Vec<u16>,
}

impl PixelGrid {
    /// Allocate a `width` x `height` grid cleared to zero. Absurd
    /// dimensions fail with `AllocationFailure` before touching the
    /// allocator.
    pub fn new(width: u16, height: u16) -> Result<Self, DecodeError> {
        let len = width as usize * height as usize;
        if len > MAX_PIXELS {
            return Err(DecodeError::AllocationFailure);
        }
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| DecodeError::AllocationFailure)?;
        data.resize(len, 0u16);
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Write one pixel; coordinates outside the grid are dropped.
    #[inline]
    pub fn set(&mut self, x: u16, y: u16, color: u16) {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = color;
        }
    }

    #[inline]
    pub fn get(&self, x: u16, y: u16) -> u16 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// One full row, for bulk blits.
    pub fn row(&self, y: u16) -> &[u16] {
        let w = self.width as usize;
        let off = y as usize * w;
        &self.data[off..off + w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_stride_indexing() {
        let mut g = PixelGrid::new(4, 3).unwrap();
        g.set(0, 0, 0x1111);
        g.set(3, 2, 0x2222);
        g.set(1, 1, 0x3333);
        assert_eq!(g.get(0, 0), 0x1111);
        assert_eq!(g.get(3, 2), 0x2222);
        assert_eq!(g.row(1), &[0, 0x3333, 0, 0]);
        assert_eq!(g.row(0), &[0x1111, 0, 0, 0]);
    }

    #[test]
    fn out_of_bounds_writes_are_dropped() {
        let mut g = PixelGrid::new(2, 2).unwrap();
        g.set(2, 0, 0xFFFF);
        g.set(0, 2, 0xFFFF);
        g.set(500, 500, 0xFFFF);
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(g.get(x, y), 0);
            }
        }
    }

    #[test]
    fn starts_cleared() {
        let g = PixelGrid::new(16, 16).unwrap();
        assert!(g.row(7).iter().all(|&p| p == 0));
        assert_eq!((g.width(), g.height()), (16, 16));
    }

    #[test]
    fn zero_sized_grid_is_fine() {
        let g = PixelGrid::new(0, 5).unwrap();
        assert_eq!(g.width(), 0);
    }

    #[test]
    fn absurd_dimensions_allocate_nothing() {
        assert_eq!(
            PixelGrid::new(u16::MAX, u16::MAX).err(),
            Some(DecodeError::AllocationFailure)
        );
        // the largest grid either decoder can request still works
        assert!(PixelGrid::new(2048, 2048).is_ok());
    }
}
