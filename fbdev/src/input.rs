use std::fs::File;
use std::io::{self, Read};
use std::mem::size_of;
use std::path::Path;
use std::ptr;
use std::time::Duration;

use album_core::input::{Axis, TouchInput, TouchSample};
use log::{info, trace};

use crate::framebuffer::DeviceError;

pub const EV_ABS: u16 = 0x03;
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;

const EVENT_SIZE: usize = size_of::<libc::input_event>();

/// Maps one evdev record onto a touch sample. Anything other than an
/// absolute X or Y report is of no interest.
pub fn decode_event(
    kind: u16,
    code: u16,
    value: i32,
    timestamp: Duration,
) -> Option<TouchSample> {
    if kind != EV_ABS {
        return None;
    }
    let axis = match code {
        ABS_X => Axis::X,
        ABS_Y => Axis::Y,
        _ => return None,
    };
    Some(TouchSample {
        axis,
        value,
        timestamp,
    })
}

fn timestamp(time: &libc::timeval) -> Duration {
    let secs = u64::try_from(time.tv_sec).unwrap_or(0);
    let micros = u32::try_from(time.tv_usec.clamp(0, 999_999)).unwrap_or(0);
    Duration::new(secs, micros * 1_000)
}

/// A Linux input event node read as a stream of fixed-size records.
pub struct EventDevice<R = File> {
    reader: R,
    buf: [u8; EVENT_SIZE],
}

impl EventDevice<File> {
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = File::open(path).map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Reading touches from {}", path.display());
        Ok(Self::new(file))
    }
}

impl<R: Read> EventDevice<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: [0; EVENT_SIZE],
        }
    }

    /// Blocks until the next complete record.
    pub fn next_event(&mut self) -> io::Result<libc::input_event> {
        self.reader.read_exact(&mut self.buf)?;
        // SAFETY: `buf` holds exactly one `input_event`, which is plain data.
        Ok(unsafe { ptr::read_unaligned(self.buf.as_ptr().cast::<libc::input_event>()) })
    }
}

impl<R: Read> TouchInput for EventDevice<R> {
    type Error = io::Error;

    fn next_sample(&mut self) -> Result<TouchSample, Self::Error> {
        loop {
            let event = self.next_event()?;
            let at = timestamp(&event.time);
            match decode_event(event.type_, event.code, event.value, at) {
                Some(sample) => return Ok(sample),
                None => trace!(
                    "skipping event type {} code {} value {}",
                    event.type_, event.code, event.value
                ),
            }
        }
    }
}
