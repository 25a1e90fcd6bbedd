extern crate alloc;

use alloc::string::{String, ToString};
use core::convert::Infallible;
use core::ops::DerefMut;

use embedded_io::{Error as _, ErrorKind};
use log::{info, warn};
use thiserror::Error;

use crate::{
    bmp::{BmpReader, DecodeError},
    framebuffer::{BlitReport, Surface, blit},
    fs::ImageStore,
    input::{Album, Cursor, Navigation, TouchConfig, TouchInput, TouchNavigator, TouchSample},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub touch: TouchConfig,
    /// Byte written over the whole surface before each image.
    pub background: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            touch: TouchConfig::default(),
            background: 0xFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("no image at index {0}")]
    Missing(usize),
    #[error("cannot open {path}: {kind:?}")]
    Open { path: String, kind: ErrorKind },
    #[error("cannot display {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },
}

/// Opens `path` in `store` and validates its bitmap headers.
pub fn open_bitmap<'s, S: ImageStore>(
    store: &'s S,
    path: &str,
) -> Result<BmpReader<S::File<'s>>, DisplayError> {
    let file = store.open_image(path).map_err(|err| DisplayError::Open {
        path: path.to_string(),
        kind: err.kind(),
    })?;
    BmpReader::open(file).map_err(|source| DisplayError::Decode {
        path: path.to_string(),
        source,
    })
}

/// Shows one image of an album at a time and flips through it on touch.
pub struct Session<'a, S: ImageStore, B> {
    surface: &'a mut Surface<B>,
    store: &'a S,
    album: Album,
    cursor: Cursor,
    navigator: TouchNavigator,
    background: u8,
}

impl<'a, S, B> Session<'a, S, B>
where
    S: ImageStore,
    B: DerefMut<Target = [u8]>,
{
    pub fn new(
        surface: &'a mut Surface<B>,
        store: &'a S,
        album: Album,
        config: SessionConfig,
    ) -> Self {
        let cursor = Cursor::new(album.len());
        Self {
            surface,
            store,
            album,
            cursor,
            navigator: TouchNavigator::new(config.touch),
            background: config.background,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor.index()
    }

    pub fn surface(&self) -> &Surface<B> {
        &*self.surface
    }

    /// Clears the surface and shows the first image.
    pub fn start(&mut self) -> Result<BlitReport, DisplayError> {
        self.surface.clear(self.background);
        self.show(self.cursor.index())
    }

    /// Redraws the image under the cursor.
    pub fn show_current(&mut self) -> Result<BlitReport, DisplayError> {
        self.show(self.cursor.index())
    }

    /// Feeds one touch sample; on a navigation event moves the cursor and
    /// draws the newly selected image. A failure to draw is logged and
    /// otherwise ignored so the user can move on to another image.
    pub fn handle_sample(&mut self, sample: TouchSample) -> Option<Navigation> {
        let navigation = self.navigator.feed(sample)?;
        let index = self.cursor.apply(navigation);
        info!(
            "{:?} to image {}/{}",
            navigation,
            index + 1,
            self.album.len()
        );
        if let Err(err) = self.show(index) {
            warn!("{}", err);
        }
        Some(navigation)
    }

    /// Shows the first image, then follows touches until `input` fails.
    pub fn run<I: TouchInput>(&mut self, input: &mut I) -> Result<Infallible, I::Error> {
        if let Err(err) = self.start() {
            warn!("{}", err);
        }
        loop {
            let sample = input.next_sample()?;
            self.handle_sample(sample);
        }
    }

    /// The surface is only cleared once the bitmap headers have been
    /// accepted, so an unreadable file leaves the previous picture in place.
    fn show(&mut self, index: usize) -> Result<BlitReport, DisplayError> {
        let path = self.album.path(index).ok_or(DisplayError::Missing(index))?;
        let reader = open_bitmap(self.store, path)?;
        self.surface.clear(self.background);
        let report = blit(reader, self.surface).map_err(|source| DisplayError::Decode {
            path: path.to_string(),
            source,
        })?;
        info!(
            "Showing {} ({} rows of {} bytes, {:?})",
            path, report.rows, report.row_bytes, report.order
        );
        Ok(report)
    }
}
