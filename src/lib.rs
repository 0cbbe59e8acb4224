// SD-card photo frame firmware (ESP32-C3, ST7789)

#![no_std]

extern crate alloc;

pub mod board;
pub mod drivers;
pub mod kernel;
pub mod render;
