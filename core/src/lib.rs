#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod application;
pub mod bmp;
pub mod framebuffer;
pub mod fs;
pub mod input;
