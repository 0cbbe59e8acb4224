// SD card file operations for the slideshow.
//
// The card is opened fresh for every operation (volume -> root -> file);
// embedded-sdmmc handles are RAII and close on drop, so nothing stays
// borrowed between scheduler jobs.

use embedded_sdmmc::{Mode, VolumeIdx};

use smol_pix::ImageFormat;

use crate::board::sdcard::SdStorage;

// longest 8.3 name plus the dot
pub const NAME_CAP: usize = 13;

/// One displayable file found in the SD root.
#[derive(Clone, Copy)]
pub struct ImageFile {
    pub name: [u8; NAME_CAP],
    pub name_len: u8,
    pub format: ImageFormat,
    pub size: u32,
}

impl ImageFile {
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("?")
    }

    pub fn same_file(&self, other: &ImageFile) -> bool {
        self.name_len == other.name_len
            && self.name[..self.name_len as usize] == other.name[..other.name_len as usize]
    }
}

/// Scan the SD root and return the first regular file with a recognized
/// image extension. "First" is FAT directory order, which follows
/// creation order on a card written once and is otherwise unspecified.
pub fn find_first_image<SPI>(sd: &SdStorage<SPI>) -> Result<Option<ImageFile>, &'static str>
where
    SPI: embedded_hal::spi::SpiDevice,
{
    let volume = sd
        .volume_mgr
        .open_volume(VolumeIdx(0))
        .map_err(|_| "open volume failed")?;
    let root = volume.open_root_dir().map_err(|_| "open root dir failed")?;

    let mut found: Option<ImageFile> = None;
    root.iterate_dir(|entry| {
        if found.is_some() || entry.attributes.is_directory() {
            return;
        }
        if matches!(entry.name.base_name()[0], b'.' | b'_') {
            return;
        }

        let mut name_buf = [0u8; NAME_CAP];
        let name_len = format_83_name(&entry.name, &mut name_buf);
        let name_str = match core::str::from_utf8(&name_buf[..name_len]) {
            Ok(s) => s,
            Err(_) => return,
        };
        if let Some(format) = ImageFormat::from_name(name_str) {
            found = Some(ImageFile {
                name: name_buf,
                name_len: name_len as u8,
                format,
                size: entry.size,
            });
        }
    })
    .map_err(|_| "iterate dir failed")?;

    Ok(found)
}

/// Read up to `buf.len()` bytes starting at `offset`. Returns the byte
/// count; 0 past end of file.
pub fn read_file_chunk<SPI>(
    sd: &SdStorage<SPI>,
    name: &str,
    offset: u32,
    buf: &mut [u8],
) -> Result<usize, &'static str>
where
    SPI: embedded_hal::spi::SpiDevice,
{
    let volume = sd
        .volume_mgr
        .open_volume(VolumeIdx(0))
        .map_err(|_| "open volume failed")?;
    let root = volume.open_root_dir().map_err(|_| "open root dir failed")?;
    let file = root
        .open_file_in_dir(name, Mode::ReadOnly)
        .map_err(|_| "open file failed")?;

    file.seek_from_start(offset).map_err(|_| "seek failed")?;

    let mut total = 0;
    while !file.is_eof() && total < buf.len() {
        let n = file.read(&mut buf[total..]).map_err(|_| "read failed")?;
        if n == 0 {
            break;
        }
        total += n;
    }

    Ok(total)
}

fn format_83_name(sfn: &embedded_sdmmc::ShortFileName, out: &mut [u8; NAME_CAP]) -> usize {
    let base = sfn.base_name();
    let ext = sfn.extension();

    let mut pos = 0;

    for &b in base.iter() {
        if b == b' ' {
            break;
        }
        out[pos] = b;
        pos += 1;
    }

    let ext_trimmed: &[u8] = &ext[..ext.iter().position(|&b| b == b' ').unwrap_or(ext.len())];
    if !ext_trimmed.is_empty() {
        out[pos] = b'.';
        pos += 1;
        for &b in ext_trimmed {
            out[pos] = b;
            pos += 1;
        }
    }

    pos
}
