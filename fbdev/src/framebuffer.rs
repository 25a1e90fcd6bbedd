use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use album_core::framebuffer::{Surface, SurfaceError, SurfaceInfo};
use log::{debug, info};
use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

/// `struct fb_bitfield`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FbBitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

/// `struct fb_var_screeninfo`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FbVarScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: FbBitfield,
    pub green: FbBitfield,
    pub blue: FbBitfield,
    pub transp: FbBitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FbFixScreenInfo {
    pub id: [u8; 16],
    pub smem_start: libc::c_ulong,
    pub smem_len: u32,
    pub type_: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: libc::c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("{request} failed on {}: {source}", .path.display())]
    Query {
        path: PathBuf,
        request: &'static str,
        source: io::Error,
    },
    #[error("cannot map {len} bytes of {}: {source}", .path.display())]
    Map {
        path: PathBuf,
        len: usize,
        source: io::Error,
    },
    #[error("unsupported depth of {0} bits per pixel")]
    Depth(u32),
    #[error(transparent)]
    Geometry(#[from] SurfaceError),
}

/// Surface geometry described by the two screeninfo blocks.
pub fn surface_info(
    var: &FbVarScreenInfo,
    fix: &FbFixScreenInfo,
) -> Result<SurfaceInfo, DeviceError> {
    if var.bits_per_pixel == 0 || var.bits_per_pixel % 8 != 0 {
        return Err(DeviceError::Depth(var.bits_per_pixel));
    }
    Ok(SurfaceInfo {
        width: var.xres,
        height: var.yres,
        bytes_per_pixel: var.bits_per_pixel / 8,
        stride: fix.line_length as usize,
    })
}

/// Opens a framebuffer device and maps its visible area read/write, shared.
pub fn open_surface(path: &Path) -> Result<Surface<MmapMut>, DeviceError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let var: FbVarScreenInfo = query(&file, path, FBIOGET_VSCREENINFO, "FBIOGET_VSCREENINFO")?;
    let fix: FbFixScreenInfo = query(&file, path, FBIOGET_FSCREENINFO, "FBIOGET_FSCREENINFO")?;
    let info = surface_info(&var, &fix)?;
    info!(
        "{}: {}x{} @ {} bpp, stride {}, RGB offsets {}/{}/{}",
        path.display(),
        var.xres,
        var.yres,
        var.bits_per_pixel,
        fix.line_length,
        var.red.offset,
        var.green.offset,
        var.blue.offset
    );
    debug!("{:?}", var);

    let len = info.len();
    // SAFETY: the mapping is only ever accessed through the returned surface;
    // other writers to the framebuffer can at worst garble the picture.
    let map = unsafe { MmapOptions::new().len(len).map_mut(&file) }.map_err(|source| {
        DeviceError::Map {
            path: path.to_path_buf(),
            len,
            source,
        }
    })?;
    Ok(Surface::new(info, map)?)
}

fn query<T: Default>(
    file: &File,
    path: &Path,
    request: libc::c_ulong,
    name: &'static str,
) -> Result<T, DeviceError> {
    let mut value = T::default();
    // SAFETY: `T` mirrors the kernel structure `request` fills in.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), request as _, &mut value as *mut T) };
    if ret < 0 {
        return Err(DeviceError::Query {
            path: path.to_path_buf(),
            request: name,
            source: io::Error::last_os_error(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screeninfo_layouts_match_the_kernel() {
        assert_eq!(std::mem::size_of::<FbVarScreenInfo>(), 160);
        if cfg!(target_pointer_width = "64") {
            assert_eq!(std::mem::size_of::<FbFixScreenInfo>(), 80);
        } else {
            assert_eq!(std::mem::size_of::<FbFixScreenInfo>(), 68);
        }
    }

    #[test]
    fn geometry_comes_from_visible_resolution_and_line_length() {
        let var = FbVarScreenInfo {
            xres: 1024,
            yres: 600,
            xres_virtual: 1024,
            yres_virtual: 1200,
            bits_per_pixel: 16,
            ..Default::default()
        };
        let fix = FbFixScreenInfo {
            line_length: 2080,
            ..Default::default()
        };
        let info = surface_info(&var, &fix).unwrap();
        assert_eq!(
            info,
            SurfaceInfo {
                width: 1024,
                height: 600,
                bytes_per_pixel: 2,
                stride: 2080,
            }
        );
        assert_eq!(info.row_pixels(), 1040);
    }

    #[test]
    fn rejects_sub_byte_depths() {
        let var = FbVarScreenInfo {
            bits_per_pixel: 1,
            ..Default::default()
        };
        assert!(matches!(
            surface_info(&var, &FbFixScreenInfo::default()),
            Err(DeviceError::Depth(1))
        ));
    }

    #[test]
    fn missing_device_is_an_open_error() {
        let err = open_surface(Path::new("/nonexistent/fb9")).err();
        assert!(matches!(err, Some(DeviceError::Open { .. })));
    }
}
