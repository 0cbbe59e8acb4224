// smol-pix: minimal no_std image decoding for small RGB565 displays.
// scale: aspect-fit planning (float fit for PNG, power-of-two buckets for JPEG)
// grid:  contiguous RGB565 pixel grid with row-stride indexing
// jpeg:  baseline JPEG block decoder (pull-based source, push-based sink)
// png:   push-fed streaming PNG decoder yielding RGBA rows

#![no_std]

extern crate alloc;

pub mod grid;
pub mod jpeg;
pub mod png;
pub mod scale;

pub use grid::PixelGrid;
pub use scale::{FitPlan, JpegScale};

/// Recoverable decode failures. Every variant leaves the caller free to
/// try the next image; none poisons decoder or display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Source file or directory does not exist.
    NotFound,
    /// A required buffer could not be allocated.
    AllocationFailure,
    /// Malformed or out-of-capability input; the message names the cause.
    Unsupported(&'static str),
    /// A bounded buffer filled without forward progress.
    Overflow,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::NotFound => f.write_str("not found"),
            DecodeError::AllocationFailure => f.write_str("allocation failure"),
            DecodeError::Unsupported(msg) => f.write_str(msg),
            DecodeError::Overflow => f.write_str("buffer overflow without progress"),
        }
    }
}

/// Image container formats recognised by filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Tag a filename by its extension, case-insensitive.
    /// `.png`, `.jpg` and `.jpeg` match; anything else is `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        if ext.eq_ignore_ascii_case("png") {
            Some(ImageFormat::Png)
        } else if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }
}

/// Pack 8-bit RGB into RGB565: 5 high bits of red, 6 of green, 5 of blue.
#[inline]
pub fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tagging() {
        assert_eq!(ImageFormat::from_name("a.png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_name("b.jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_name("b.JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_name("B.PnG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_name("c.txt"), None);
        assert_eq!(ImageFormat::from_name("noext"), None);
        assert_eq!(ImageFormat::from_name("jpeg"), None);
    }

    #[test]
    fn rgb565_packing() {
        assert_eq!(rgb565(0, 0, 0), 0x0000);
        assert_eq!(rgb565(255, 255, 255), 0xFFFF);
        assert_eq!(rgb565(255, 0, 0), 0xF800);
        assert_eq!(rgb565(0, 255, 0), 0x07E0);
        assert_eq!(rgb565(0, 0, 255), 0x001F);
        assert_eq!(rgb565(128, 128, 128), 0x8410);
    }
}
