use std::path::PathBuf;
use std::time::Duration;

use album_core::{
    application::{Session, SessionConfig},
    fs::StdStore,
    input::{Album, TouchConfig},
};
use anyhow::Context;
use clap::Parser;

use crate::{framebuffer::open_surface, input::EventDevice};

mod framebuffer;
mod input;

/// Shows BMP images full screen on a Linux framebuffer and flips through
/// them with touches on the right or left half of the panel.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Framebuffer device.
    #[arg(long, default_value = "/dev/fb0")]
    fb: PathBuf,

    /// Touch input event device.
    #[arg(long, default_value = "/dev/input/event0")]
    input: PathBuf,

    /// Horizontal range of the touch panel in device units.
    #[arg(long, default_value_t = 1024)]
    touch_width: u32,

    /// Milliseconds during which touches are ignored after a page turn.
    #[arg(long, default_value_t = 500)]
    debounce_ms: u64,

    /// Byte the screen is filled with before each image (decimal or 0x hex).
    #[arg(long, default_value = "0xff", value_parser = parse_byte)]
    background: u8,

    /// Images to show, in order.
    #[arg(required = true)]
    images: Vec<String>,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            touch: TouchConfig {
                region_width: self.touch_width,
                debounce: Duration::from_millis(self.debounce_ms),
            },
            background: self.background,
        }
    }
}

fn parse_byte(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("`{value}` is not a byte: {err}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.session_config();
    let album = Album::new(cli.images).context("no images given")?;
    log::info!("Album of {} images", album.len());

    let mut surface = open_surface(&cli.fb)
        .with_context(|| format!("unable to use framebuffer {}", cli.fb.display()))?;
    let mut touch = EventDevice::open(&cli.input)
        .with_context(|| format!("unable to use touch input {}", cli.input.display()))?;

    let mut session = Session::new(&mut surface, &StdStore, album, config);
    let Err(err) = session.run(&mut touch);
    Err(err).context("touch input closed")
}
