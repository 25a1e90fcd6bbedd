use std::time::{Duration, Instant};

use album_core::{
    application::{Session, SessionConfig},
    framebuffer::{Surface, SurfaceInfo},
    fs::StdStore,
    input::{Album, TouchConfig},
};
use anyhow::Context;
use clap::Parser;

use crate::display::{BYTES_PER_PIXEL, MinifbDisplay};

mod display;

/// Desktop stand-in for the framebuffer viewer: a window for the screen and
/// mouse clicks for touches.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[arg(long, default_value_t = 1024)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Milliseconds during which clicks are ignored after a page turn.
    #[arg(long, default_value_t = 500)]
    debounce_ms: u64,

    /// Byte the window is filled with before each image.
    #[arg(long, default_value_t = 0xFF)]
    background: u8,

    /// Images to show, in order.
    #[arg(required = true)]
    images: Vec<String>,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            touch: TouchConfig {
                region_width: self.width,
                debounce: Duration::from_millis(self.debounce_ms),
            },
            background: self.background,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.session_config();
    let (width, height) = (cli.width as usize, cli.height as usize);
    let album = Album::new(cli.images).context("no images given")?;

    log::info!("Album desktop started with {} images", album.len());

    let mut window = minifb::Window::new("Album", width, height, minifb::WindowOptions::default())
        .context("unable to open window")?;
    window.set_target_fps(60);
    let mut display = MinifbDisplay::new(window, width, height);

    let info = SurfaceInfo::packed(cli.width, cli.height, BYTES_PER_PIXEL);
    let mut surface = Surface::new(info, vec![0u8; info.len()])?;
    let mut session = Session::new(&mut surface, &StdStore, album, config);
    if let Err(err) = session.start() {
        log::warn!("{}", err);
    }

    let epoch = Instant::now();
    while display.is_open() {
        if let Some(samples) = display.poll_touches(epoch.elapsed()) {
            for sample in samples {
                session.handle_sample(sample);
            }
        }
        display.present(session.surface())?;
    }
    Ok(())
}
