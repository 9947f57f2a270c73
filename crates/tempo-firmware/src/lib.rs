//! ESP32-S3 firmware-specific modules for tempo
//!
//! This crate contains the hardware bindings that cannot compile on desktop
//! targets: UART, ADC, RTC, flash and LED drivers behind the core's
//! peripheral traits.

#![no_std]

extern crate alloc;

pub mod board;
