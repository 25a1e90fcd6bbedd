use std::ops::DerefMut;
use std::time::Duration;

use album_core::{
    framebuffer::Surface,
    input::{Axis, TouchSample},
};

/// Bytes per pixel of the simulated panel: little-endian XRGB, the layout of
/// a 32 bpp Linux framebuffer.
pub const BYTES_PER_PIXEL: u32 = 4;

/// A window standing in for the framebuffer, with the mouse as touch panel.
pub struct MinifbDisplay {
    window: minifb::Window,
    width: usize,
    height: usize,
    frame: Vec<u32>,
    pointer: PointerEdge,
}

impl MinifbDisplay {
    pub fn new(window: minifb::Window, width: usize, height: usize) -> Self {
        Self {
            window,
            width,
            height,
            frame: vec![0; width * height],
            pointer: PointerEdge::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(minifb::Key::Escape)
    }

    /// Touch samples for a click that started since the last call.
    pub fn poll_touches(&mut self, now: Duration) -> Option<[TouchSample; 2]> {
        let down = self.window.get_mouse_down(minifb::MouseButton::Left);
        let pressed = self.pointer.update(down);
        let (x, y) = self.window.get_mouse_pos(minifb::MouseMode::Discard)?;
        pressed.then(|| touch_samples(x as i32, y as i32, now))
    }

    /// Shows `surface` and pumps window events.
    pub fn present<B: DerefMut<Target = [u8]>>(
        &mut self,
        surface: &Surface<B>,
    ) -> Result<(), minifb::Error> {
        to_pixels(surface, &mut self.frame, self.width);
        self.window
            .update_with_buffer(&self.frame, self.width, self.height)
    }
}

/// Tracks the left button so a held click counts once.
#[derive(Debug, Default, Clone, Copy)]
struct PointerEdge {
    was_down: bool,
}

impl PointerEdge {
    fn update(&mut self, down: bool) -> bool {
        let pressed = down && !self.was_down;
        self.was_down = down;
        pressed
    }
}

/// The X then Y report a touch panel sends for one contact.
pub fn touch_samples(x: i32, y: i32, timestamp: Duration) -> [TouchSample; 2] {
    [
        TouchSample {
            axis: Axis::X,
            value: x,
            timestamp,
        },
        TouchSample {
            axis: Axis::Y,
            value: y,
            timestamp,
        },
    ]
}

/// Converts the surface's XRGB rows into window pixels, `width` per row.
pub fn to_pixels<B: DerefMut<Target = [u8]>>(
    surface: &Surface<B>,
    frame: &mut [u32],
    width: usize,
) {
    let height = surface.info().height;
    for (y, out) in (0..height).zip(frame.chunks_exact_mut(width)) {
        let Some(row) = surface.row(y) else {
            break;
        };
        for (pixel, bytes) in out.iter_mut().zip(row.chunks_exact(BYTES_PER_PIXEL as usize)) {
            *pixel = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use album_core::framebuffer::SurfaceInfo;

    #[test]
    fn click_counts_once_until_released() {
        let mut edge = PointerEdge::default();
        assert!(!edge.update(false));
        assert!(edge.update(true));
        assert!(!edge.update(true));
        assert!(!edge.update(false));
        assert!(edge.update(true));
    }

    #[test]
    fn click_becomes_an_x_then_y_report() {
        let at = Duration::from_millis(42);
        let [x, y] = touch_samples(700, 20, at);
        assert_eq!((x.axis, x.value, x.timestamp), (Axis::X, 700, at));
        assert_eq!((y.axis, y.value, y.timestamp), (Axis::Y, 20, at));
    }

    #[test]
    fn surface_bytes_are_little_endian_xrgb() {
        let info = SurfaceInfo::packed(2, 2, BYTES_PER_PIXEL);
        let mut surface = Surface::new(info, vec![0u8; info.len()]).unwrap();
        surface
            .row_mut(0)
            .unwrap()
            .copy_from_slice(&[0x11, 0x22, 0x33, 0xFF, 1, 2, 3, 4]);
        surface.row_mut(1).unwrap().fill(0xFF);

        let mut frame = vec![0u32; 4];
        to_pixels(&surface, &mut frame, 2);
        assert_eq!(frame, [0x0033_2211, 0x0003_0201, 0x00FF_FFFF, 0x00FF_FFFF]);
    }
}
