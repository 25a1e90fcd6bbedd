//! Streaming reader for uncompressed Windows bitmaps.
//!
//! Only the 14-byte file header and the 40-byte `BITMAPINFOHEADER` are
//! understood. Rows are handed out in the order they are stored on disk;
//! turning them the right way up is the compositor's job.

extern crate alloc;

use alloc::vec::Vec;

use embedded_io::{ErrorKind, Read, ReadExactError, Seek, SeekFrom};
use log::debug;
use thiserror::Error;

pub const SIGNATURE: [u8; 2] = *b"BM";
pub const FILE_HEADER_LEN: usize = 14;
pub const INFO_HEADER_LEN: usize = 40;
/// Smallest legal pixel data offset: both headers, no palette.
pub const HEADERS_LEN: u32 = (FILE_HEADER_LEN + INFO_HEADER_LEN) as u32;

const COMPRESSION_NONE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("not a bitmap (signature {0:02x?})")]
    BadSignature([u8; 2]),
    #[error("bitmap headers are truncated")]
    ShortHeader,
    #[error("unsupported compression mode {0}")]
    UnsupportedCompression(u32),
    #[error("unsupported bit depth {0}")]
    UnsupportedBitDepth(u16),
    #[error("invalid image width {0}")]
    InvalidWidth(i32),
    #[error("pixel data offset {0} overlaps the headers")]
    DataOffset(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("i/o error: {0:?}")]
    Io(ErrorKind),
    #[error("file ends inside row {row}")]
    Truncated { row: u32 },
    #[error("cannot allocate a {bytes} byte row buffer")]
    Allocation { bytes: usize },
}

/// Storage order of the pixel rows, encoded by the sign of the height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// First row on disk is the bottom of the picture (positive height).
    BottomUp,
    /// First row on disk is the top of the picture (negative height).
    TopDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmpHeader {
    pub file_size: u32,
    pub data_offset: u32,
    pub info_size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub image_size: u32,
    pub x_pixels_per_meter: i32,
    pub y_pixels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
}

impl BmpHeader {
    /// Header for an uncompressed image whose pixel data follows the headers
    /// directly. Rows are `width * bpp / 8` bytes with no alignment padding.
    /// Sizes too large for the header fields saturate at `u32::MAX`.
    pub fn uncompressed(width: i32, height: i32, bits_per_pixel: u16) -> Self {
        let row_bytes = u64::from(width.max(0).unsigned_abs()) * u64::from(bits_per_pixel) / 8;
        let image_size = row_bytes.saturating_mul(u64::from(height.unsigned_abs()));
        let image_size = u32::try_from(image_size).unwrap_or(u32::MAX);
        Self {
            file_size: HEADERS_LEN.saturating_add(image_size),
            data_offset: HEADERS_LEN,
            info_size: INFO_HEADER_LEN as u32,
            width,
            height,
            planes: 1,
            bits_per_pixel,
            compression: COMPRESSION_NONE,
            image_size,
            x_pixels_per_meter: 2835,
            y_pixels_per_meter: 2835,
            colors_used: 0,
            colors_important: 0,
        }
    }

    /// Decodes both headers and checks the invariants the blitter relies on.
    pub fn parse(
        file: &[u8; FILE_HEADER_LEN],
        info: &[u8; INFO_HEADER_LEN],
    ) -> Result<Self, FormatError> {
        let signature = [file[0], file[1]];
        if signature != SIGNATURE {
            return Err(FormatError::BadSignature(signature));
        }

        let header = Self {
            file_size: le_u32(file, 2),
            data_offset: le_u32(file, 10),
            info_size: le_u32(info, 0),
            width: le_u32(info, 4) as i32,
            height: le_u32(info, 8) as i32,
            planes: le_u16(info, 12),
            bits_per_pixel: le_u16(info, 14),
            compression: le_u32(info, 16),
            image_size: le_u32(info, 20),
            x_pixels_per_meter: le_u32(info, 24) as i32,
            y_pixels_per_meter: le_u32(info, 28) as i32,
            colors_used: le_u32(info, 32),
            colors_important: le_u32(info, 36),
        };

        if header.compression != COMPRESSION_NONE {
            return Err(FormatError::UnsupportedCompression(header.compression));
        }
        if !matches!(header.bits_per_pixel, 16 | 24 | 32) {
            return Err(FormatError::UnsupportedBitDepth(header.bits_per_pixel));
        }
        if header.width <= 0 || header.width.checked_mul(4).is_none() {
            return Err(FormatError::InvalidWidth(header.width));
        }
        if header.data_offset < HEADERS_LEN {
            return Err(FormatError::DataOffset(header.data_offset));
        }
        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; HEADERS_LEN as usize] {
        let mut out = [0u8; HEADERS_LEN as usize];
        out[0..2].copy_from_slice(&SIGNATURE);
        out[2..6].copy_from_slice(&self.file_size.to_le_bytes());
        out[10..14].copy_from_slice(&self.data_offset.to_le_bytes());
        let info = &mut out[FILE_HEADER_LEN..];
        info[0..4].copy_from_slice(&self.info_size.to_le_bytes());
        info[4..8].copy_from_slice(&self.width.to_le_bytes());
        info[8..12].copy_from_slice(&self.height.to_le_bytes());
        info[12..14].copy_from_slice(&self.planes.to_le_bytes());
        info[14..16].copy_from_slice(&self.bits_per_pixel.to_le_bytes());
        info[16..20].copy_from_slice(&self.compression.to_le_bytes());
        info[20..24].copy_from_slice(&self.image_size.to_le_bytes());
        info[24..28].copy_from_slice(&self.x_pixels_per_meter.to_le_bytes());
        info[28..32].copy_from_slice(&self.y_pixels_per_meter.to_le_bytes());
        info[32..36].copy_from_slice(&self.colors_used.to_le_bytes());
        info[36..40].copy_from_slice(&self.colors_important.to_le_bytes());
        out
    }

    pub fn row_order(&self) -> RowOrder {
        if self.height > 0 {
            RowOrder::BottomUp
        } else {
            RowOrder::TopDown
        }
    }

    /// Number of rows stored in the file.
    pub fn rows(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Bytes per stored row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * usize::from(self.bits_per_pixel) / 8
    }
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Sequential row source over one bitmap.
///
/// The row buffer is allocated once in [`BmpReader::open`] and overwritten by
/// every row; it goes away with the reader. It is only allocated once the
/// source is known to hold at least one full row. Rows cannot be re-read: a new
/// reader has to be opened to decode the image again.
pub struct BmpReader<R> {
    source: R,
    header: BmpHeader,
    row: Vec<u8>,
    next_row: u32,
}

impl<R: Read + Seek> BmpReader<R> {
    pub fn open(mut source: R) -> Result<Self, DecodeError> {
        let mut file = [0u8; FILE_HEADER_LEN];
        read_header(&mut source, &mut file)?;
        if file[0..2] != SIGNATURE {
            return Err(FormatError::BadSignature([file[0], file[1]]).into());
        }
        let mut info = [0u8; INFO_HEADER_LEN];
        read_header(&mut source, &mut info)?;
        let header = BmpHeader::parse(&file, &info)?;
        debug!(
            "bitmap {}x{} @ {} bpp, data at {}, file size {}",
            header.width, header.height, header.bits_per_pixel, header.data_offset, header.file_size
        );

        let start = u64::from(header.data_offset);
        let end = source.seek(SeekFrom::End(0)).map_err(io_error)?;
        source.seek(SeekFrom::Start(start)).map_err(io_error)?;

        let bytes = if header.rows() == 0 { 0 } else { header.row_bytes() };
        if end.saturating_sub(start) < bytes as u64 {
            return Err(DecodeError::Truncated { row: 0 });
        }
        let mut row = Vec::new();
        row.try_reserve_exact(bytes)
            .map_err(|_| DecodeError::Allocation { bytes })?;
        row.resize(bytes, 0);

        Ok(Self {
            source,
            header,
            row,
            next_row: 0,
        })
    }

    pub fn header(&self) -> &BmpHeader {
        &self.header
    }

    /// Rows not yet read or skipped.
    pub fn remaining(&self) -> u32 {
        self.header.rows() - self.next_row
    }

    /// Moves past `count` rows without reading them.
    pub fn skip_rows(&mut self, count: u32) -> Result<(), DecodeError> {
        let count = count.min(self.remaining());
        if count == 0 {
            return Ok(());
        }
        let bytes = i64::from(count) * self.row.len() as i64;
        self.source.seek(SeekFrom::Current(bytes)).map_err(io_error)?;
        self.next_row += count;
        Ok(())
    }

    /// Reads the next stored row, or `None` once every row has been consumed.
    ///
    /// After an error the reader is exhausted.
    pub fn next_row(&mut self) -> Result<Option<&[u8]>, DecodeError> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        let row = self.next_row;
        if let Err(err) = self.source.read_exact(&mut self.row) {
            self.next_row = self.header.rows();
            return Err(match err {
                ReadExactError::UnexpectedEof => DecodeError::Truncated { row },
                ReadExactError::Other(err) => io_error(err),
            });
        }
        self.next_row += 1;
        Ok(Some(&self.row))
    }

    /// Feeds at most `limit` rows to `visitor` in storage order and returns
    /// how many were visited.
    pub fn for_each_row<F>(mut self, limit: u32, mut visitor: F) -> Result<u32, DecodeError>
    where
        F: FnMut(u32, &[u8]),
    {
        let mut visited = 0;
        while visited < limit {
            let Some(row) = self.next_row()? else {
                break;
            };
            visitor(visited, row);
            visited += 1;
        }
        Ok(visited)
    }
}

fn read_header<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), DecodeError> {
    source.read_exact(buf).map_err(|err| match err {
        ReadExactError::UnexpectedEof => FormatError::ShortHeader.into(),
        ReadExactError::Other(err) => io_error(err),
    })
}

fn io_error<E: embedded_io::Error>(err: E) -> DecodeError {
    DecodeError::Io(err.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFile;
    use embedded_io::ErrorType;

    fn bitmap(width: i32, height: i32, bpp: u16, rows: &[&[u8]]) -> Vec<u8> {
        let mut data = BmpHeader::uncompressed(width, height, bpp).to_bytes().to_vec();
        for row in rows {
            data.extend_from_slice(row);
        }
        data
    }

    #[test]
    fn parses_headers() {
        let data = bitmap(2, -3, 16, &[&[0; 4], &[0; 4], &[0; 4]]);
        let reader = BmpReader::open(MemoryFile::new(&data)).unwrap();
        let header = reader.header();
        assert_eq!(header.width, 2);
        assert_eq!(header.height, -3);
        assert_eq!(header.bits_per_pixel, 16);
        assert_eq!(header.data_offset, HEADERS_LEN);
        assert_eq!(header.file_size, data.len() as u32);
        assert_eq!(header.row_order(), RowOrder::TopDown);
        assert_eq!(header.rows(), 3);
        assert_eq!(header.row_bytes(), 4);
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut data = bitmap(1, 1, 24, &[&[1, 2, 3]]);
        data[0] = b'P';
        data[1] = b'6';
        let err = BmpReader::open(MemoryFile::new(&data)).err();
        assert_eq!(err, Some(DecodeError::Format(FormatError::BadSignature(*b"P6"))));
    }

    #[test]
    fn rejects_compressed_images() {
        let mut header = BmpHeader::uncompressed(1, 1, 24);
        header.compression = 1;
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[0, 0, 0]);
        let err = BmpReader::open(MemoryFile::new(&data)).err();
        assert_eq!(
            err,
            Some(DecodeError::Format(FormatError::UnsupportedCompression(1)))
        );
    }

    #[test]
    fn rejects_indexed_and_zero_width_images() {
        let data = BmpHeader::uncompressed(4, 4, 8).to_bytes();
        assert_eq!(
            BmpReader::open(MemoryFile::new(&data)).err(),
            Some(DecodeError::Format(FormatError::UnsupportedBitDepth(8)))
        );

        let data = BmpHeader::uncompressed(0, 4, 24).to_bytes();
        assert_eq!(
            BmpReader::open(MemoryFile::new(&data)).err(),
            Some(DecodeError::Format(FormatError::InvalidWidth(0)))
        );
    }

    #[test]
    fn rejects_offset_inside_headers() {
        let mut header = BmpHeader::uncompressed(1, 1, 32);
        header.data_offset = 20;
        let data = header.to_bytes();
        assert_eq!(
            BmpReader::open(MemoryFile::new(&data)).err(),
            Some(DecodeError::Format(FormatError::DataOffset(20)))
        );
    }

    #[test]
    fn short_header_is_a_format_error() {
        let data = bitmap(1, 1, 24, &[]);
        assert_eq!(
            BmpReader::open(MemoryFile::new(&data[..30])).err(),
            Some(DecodeError::Format(FormatError::ShortHeader))
        );
    }

    #[test]
    fn honours_data_offset() {
        let mut header = BmpHeader::uncompressed(1, 1, 24);
        header.data_offset = HEADERS_LEN + 6;
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[0xEE; 6]);
        data.extend_from_slice(&[1, 2, 3]);

        let mut reader = BmpReader::open(MemoryFile::new(&data)).unwrap();
        assert_eq!(reader.next_row().unwrap(), Some(&[1u8, 2, 3][..]));
        assert_eq!(reader.next_row().unwrap(), None);
    }

    #[test]
    fn yields_rows_in_storage_order_and_skips() {
        let data = bitmap(1, 3, 24, &[&[1, 1, 1], &[2, 2, 2], &[3, 3, 3]]);
        let mut reader = BmpReader::open(MemoryFile::new(&data)).unwrap();
        reader.skip_rows(1).unwrap();
        assert_eq!(reader.remaining(), 2);

        let mut seen = Vec::new();
        let count = reader
            .for_each_row(u32::MAX, |index, row| seen.push((index, row[0])))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen, [(0, 2), (1, 3)]);
    }

    #[test]
    fn short_row_is_truncation() {
        let data = bitmap(1, 3, 24, &[&[1, 1, 1], &[2, 2]]);
        let mut reader = BmpReader::open(MemoryFile::new(&data)).unwrap();
        assert!(reader.next_row().unwrap().is_some());
        assert_eq!(reader.next_row(), Err(DecodeError::Truncated { row: 1 }));
        assert_eq!(reader.next_row(), Ok(None));
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let header = BmpHeader::uncompressed(640, -480, 32);
        let bytes = header.to_bytes();
        let file: &[u8; FILE_HEADER_LEN] = bytes[..FILE_HEADER_LEN].try_into().unwrap();
        let info: &[u8; INFO_HEADER_LEN] = bytes[FILE_HEADER_LEN..].try_into().unwrap();
        assert_eq!(BmpHeader::parse(file, info), Ok(header));
    }

    #[test]
    fn uncompressed_header_saturates_sizes() {
        let header = BmpHeader::uncompressed(0x1FFF_FFFF, 4, 32);
        assert_eq!(header.image_size, u32::MAX);
        assert_eq!(header.file_size, u32::MAX);
        assert_eq!(BmpHeader::uncompressed(0x1FFF_FFFF, -1, 32).image_size, 0x7FFF_FFFC);
    }

    #[test]
    fn row_wider_than_the_file_is_rejected_before_allocating() {
        let data = BmpHeader::uncompressed(0x1FFF_FFFF, -1, 32).to_bytes();
        assert_eq!(
            BmpReader::open(MemoryFile::new(&data)).err(),
            Some(DecodeError::Truncated { row: 0 })
        );

        let data = bitmap(4, 2, 24, &[&[0; 11]]);
        assert_eq!(
            BmpReader::open(MemoryFile::new(&data)).err(),
            Some(DecodeError::Truncated { row: 0 })
        );
    }

    #[test]
    fn zero_height_has_no_rows() {
        let data = BmpHeader::uncompressed(0x1FFF_FFFF, 0, 32).to_bytes();
        let mut reader = BmpReader::open(MemoryFile::new(&data)).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.next_row(), Ok(None));
        assert_eq!(reader.skip_rows(3), Ok(()));
    }

    /// Serves `data` until `fail_at`, then reports a device error.
    struct Faulty<'a> {
        inner: MemoryFile<'a>,
        fail_at: u64,
        seek_fails: bool,
    }

    impl ErrorType for Faulty<'_> {
        type Error = ErrorKind;
    }

    impl Read for Faulty<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let left = self.fail_at.saturating_sub(self.inner.position());
            if left == 0 {
                return Err(ErrorKind::Other);
            }
            let len = buf.len().min(left as usize);
            self.inner.read(&mut buf[..len])
        }
    }

    impl Seek for Faulty<'_> {
        fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
            if self.seek_fails {
                return Err(ErrorKind::Unsupported);
            }
            self.inner.seek(pos)
        }
    }

    #[test]
    fn device_errors_keep_their_kind() {
        let data = bitmap(1, 2, 24, &[&[1, 1, 1], &[2, 2, 2]]);
        let bytes = data.as_slice();
        let faulty = |fail_at: u64, seek_fails: bool| Faulty {
            inner: MemoryFile::new(bytes),
            fail_at,
            seek_fails,
        };

        let mut reader = BmpReader::open(faulty(u64::from(HEADERS_LEN) + 3, false)).unwrap();
        assert!(reader.next_row().unwrap().is_some());
        assert_eq!(reader.next_row(), Err(DecodeError::Io(ErrorKind::Other)));
        assert_eq!(reader.next_row(), Ok(None));

        assert_eq!(
            BmpReader::open(faulty(20, false)).err(),
            Some(DecodeError::Io(ErrorKind::Other))
        );
        assert_eq!(
            BmpReader::open(faulty(u64::MAX, true)).err(),
            Some(DecodeError::Io(ErrorKind::Unsupported))
        );
    }
}
