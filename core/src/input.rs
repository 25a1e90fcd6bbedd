extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use core::time::Duration;

use log::trace;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// One absolute-axis report from the touch device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSample {
    pub axis: Axis,
    pub value: i32,
    /// Monotonic time of the report, used for debouncing.
    pub timestamp: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub x: i32,
    pub y: i32,
}

/// Half of a touch point waiting for the other axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPoint {
    #[default]
    Idle,
    OneAxisPending { axis: Axis, value: i32 },
}

impl PendingPoint {
    /// Records one axis value. Returns the completed point once both axes have
    /// arrived, after which the accumulator is idle again. A second report for
    /// the axis already pending replaces it.
    pub fn push(&mut self, axis: Axis, value: i32) -> Option<TouchPoint> {
        match *self {
            PendingPoint::OneAxisPending {
                axis: pending_axis,
                value: pending,
            } if pending_axis != axis => {
                *self = PendingPoint::Idle;
                let (x, y) = match axis {
                    Axis::X => (value, pending),
                    Axis::Y => (pending, value),
                };
                Some(TouchPoint { x, y })
            }
            _ => {
                *self = PendingPoint::OneAxisPending { axis, value };
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Advance,
    Retreat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchConfig {
    /// Width of the touchable area in device units. Touches right of the
    /// middle advance, the rest go back.
    pub region_width: u32,
    /// Quiet period after a navigation during which touches are ignored.
    pub debounce: Duration,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            region_width: 1024,
            debounce: Duration::from_millis(500),
        }
    }
}

/// Turns raw axis samples into debounced navigation events.
#[derive(Debug, Clone)]
pub struct TouchNavigator {
    config: TouchConfig,
    pending: PendingPoint,
    last_emitted: Option<Duration>,
}

impl TouchNavigator {
    pub fn new(config: TouchConfig) -> Self {
        Self {
            config,
            pending: PendingPoint::Idle,
            last_emitted: None,
        }
    }

    pub fn pending(&self) -> PendingPoint {
        self.pending
    }

    pub fn classify(&self, point: TouchPoint) -> Navigation {
        if i64::from(point.x) > i64::from(self.config.region_width / 2) {
            Navigation::Advance
        } else {
            Navigation::Retreat
        }
    }

    pub fn feed(&mut self, sample: TouchSample) -> Option<Navigation> {
        let point = self.pending.push(sample.axis, sample.value)?;
        if self.cooling_down(sample.timestamp) {
            trace!("touch ({}, {}) ignored during cooldown", point.x, point.y);
            return None;
        }
        let navigation = self.classify(point);
        trace!("touch ({}, {}) -> {:?}", point.x, point.y, navigation);
        self.last_emitted = Some(sample.timestamp);
        Some(navigation)
    }

    fn cooling_down(&self, now: Duration) -> bool {
        // A clock that went backwards does not extend the cooldown.
        self.last_emitted
            .is_some_and(|at| now >= at && now - at < self.config.debounce)
    }
}

/// Blocking source of touch samples.
pub trait TouchInput {
    type Error: core::fmt::Debug;

    fn next_sample(&mut self) -> Result<TouchSample, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AlbumError {
    #[error("at least one image path is required")]
    Empty,
}

/// The fixed, ordered list of images being browsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    paths: Vec<String>,
}

impl Album {
    pub fn new<I, S>(paths: I) -> Result<Self, AlbumError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(AlbumError::Empty);
        }
        Ok(Self { paths })
    }

    pub fn len(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.paths.len()).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn path(&self, index: usize) -> Option<&str> {
        self.paths.get(index).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

/// Circular position in an album.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    len: NonZeroUsize,
}

impl Cursor {
    pub fn new(len: NonZeroUsize) -> Self {
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> NonZeroUsize {
        self.len
    }

    pub fn apply(&mut self, navigation: Navigation) -> usize {
        let len = self.len.get();
        self.index = match navigation {
            Navigation::Advance => (self.index + 1) % len,
            Navigation::Retreat => (self.index + len - 1) % len,
        };
        self.index
    }
}
