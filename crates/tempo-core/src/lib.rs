//! Hardware-independent core library for tempo
//!
//! This crate contains all platform-agnostic logic for the tempo field logger:
//! the GPS/pulse time discipline engine, the interrupt-fed sampling ring, the
//! rotating record logger, the console-driven session controller and the
//! device context that ties them together in one cooperative main tick.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod device;
pub mod logging;
pub mod sampling;
pub mod session;
pub mod time;
