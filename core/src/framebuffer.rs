use core::ops::DerefMut;

use embedded_io::{Read, Seek};
use log::trace;
use thiserror::Error;

use crate::bmp::{BmpReader, DecodeError, RowOrder};

/// Fixed geometry of a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Visible pixels per row.
    pub width: u32,
    /// Visible rows.
    pub height: u32,
    pub bytes_per_pixel: u32,
    /// Bytes between the starts of two consecutive rows, padding included.
    pub stride: usize,
}

impl SurfaceInfo {
    /// Geometry without row padding.
    pub fn packed(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
            stride: width as usize * bytes_per_pixel as usize,
        }
    }

    /// Size of the pixel store in bytes.
    pub fn len(&self) -> usize {
        self.stride * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixels per row including the padding.
    pub fn row_pixels(&self) -> usize {
        self.stride / self.bytes_per_pixel.max(1) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("surface has zero bytes per pixel")]
    ZeroDepth,
    #[error("stride {stride} cannot hold {width} pixels of {bytes_per_pixel} bytes")]
    NarrowStride {
        stride: usize,
        width: u32,
        bytes_per_pixel: u32,
    },
    #[error("pixel store holds {actual} bytes, geometry needs {required}")]
    ShortStore { required: usize, actual: usize },
}

/// A pixel store with known geometry.
///
/// `B` is whatever owns the bytes: a `Vec<u8>` for an off-screen surface, a
/// memory map for a real framebuffer. Every write goes through [`Surface::row_mut`],
/// so nothing outside `stride * height` is ever touched.
pub struct Surface<B> {
    info: SurfaceInfo,
    pixels: B,
}

impl<B: DerefMut<Target = [u8]>> Surface<B> {
    pub fn new(info: SurfaceInfo, pixels: B) -> Result<Self, SurfaceError> {
        if info.bytes_per_pixel == 0 {
            return Err(SurfaceError::ZeroDepth);
        }
        if info.stride < info.width as usize * info.bytes_per_pixel as usize {
            return Err(SurfaceError::NarrowStride {
                stride: info.stride,
                width: info.width,
                bytes_per_pixel: info.bytes_per_pixel,
            });
        }
        if pixels.len() < info.len() {
            return Err(SurfaceError::ShortStore {
                required: info.len(),
                actual: pixels.len(),
            });
        }
        Ok(Self { info, pixels })
    }

    pub fn info(&self) -> SurfaceInfo {
        self.info
    }

    pub fn clear(&mut self, value: u8) {
        let len = self.info.len();
        self.pixels[..len].fill(value);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels[..self.info.len()]
    }

    /// The `stride` bytes of row `y`.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let start = self.row_start(y)?;
        Some(&self.pixels[start..start + self.info.stride])
    }

    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        let start = self.row_start(y)?;
        let stride = self.info.stride;
        Some(&mut self.pixels[start..start + stride])
    }

    fn row_start(&self, y: u32) -> Option<usize> {
        (y < self.info.height).then(|| y as usize * self.info.stride)
    }
}

/// Summary of a finished blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitReport {
    pub order: RowOrder,
    /// Rows written to the surface.
    pub rows: u32,
    /// Bytes copied into each of those rows.
    pub row_bytes: usize,
}

/// Copies the bitmap behind `reader` onto `surface`, cropping to its size.
///
/// Row bytes are copied verbatim, at most `min(stride, row_bytes)` per row;
/// anything to the right of that is left as it was. Bottom-up images are
/// anchored to the bottom edge of the surface; when taller than it, the first
/// `height - vres` stored rows are seeked over and the rest fill the surface.
/// Top-down images are anchored to the top edge and rows past the surface's
/// last row are never read. If reading fails midway, the rows already copied
/// stay on the surface.
pub fn blit<R, B>(
    mut reader: BmpReader<R>,
    surface: &mut Surface<B>,
) -> Result<BlitReport, DecodeError>
where
    R: Read + Seek,
    B: DerefMut<Target = [u8]>,
{
    let header = *reader.header();
    let info = surface.info();
    let order = header.row_order();
    let row_bytes = header.row_bytes().min(info.stride);
    let stored = header.rows();
    let visible = stored.min(info.height);

    if order == RowOrder::BottomUp && stored > info.height {
        reader.skip_rows(stored - info.height)?;
    }

    trace!(
        "blit {:?}: {} of {} rows, {} bytes each, onto {}x{} stride {}",
        order, visible, stored, row_bytes, info.width, info.height, info.stride
    );

    let rows = reader.for_each_row(visible, |index, row| {
        let y = match order {
            RowOrder::BottomUp => info.height - 1 - index,
            RowOrder::TopDown => index,
        };
        if let Some(dst) = surface.row_mut(y) {
            dst[..row_bytes].copy_from_slice(&row[..row_bytes]);
        }
    })?;

    Ok(BlitReport {
        order,
        rows,
        row_bytes,
    })
}
