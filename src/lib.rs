//! This is a [bit banging] I2C master implementing the [`embedded-hal`] traits.
//!
//! Two open-drain GPIO lines and a blocking delay are all it needs. The
//! protocol engine is exposed both as raw bus primitives (start, stop, byte
//! and acknowledge framing) in [`i2c`] and through the embedded-hal
//! [`I2c`](embedded_hal::i2c::I2c) traits in [`hal`].
//!
//! [bit banging]: https://en.wikipedia.org/wiki/Bit_banging
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal
//!
//! ## Features
//!
//! - `defmt`: log bus events and derive `defmt::Format` for public types.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

mod fmt;

pub mod config;
pub mod hal;
pub mod i2c;


pub use config::Config;
pub use hal::{address_byte, Direction};
pub use i2c::{Acknowledge, BitBangI2c, Error, Recovery};
