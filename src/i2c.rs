/*!
# Blocking I2C master based on GPIO bitbang

This implementation consumes the following hardware resources:
- A blocking delay provider to pace every pin operation
- Two GPIO pins for SDA and SCL lines.

Note that the current implementation does not support I2C clock stretching.

## Hardware requirements

1. Configure GPIO pins as Open-Drain outputs with pull-ups on both lines.
2. Pick a settle delay matching the bus speed, see [`Config`].

The engine is layered. The pin driver ([`BitBangI2c::write_clock`],
[`BitBangI2c::write_data`], [`BitBangI2c::read_data`]) pauses for the settle
delay after every access. The bus primitives ([`start`](BitBangI2c::start),
[`stop`](BitBangI2c::stop)), byte framing and acknowledge signaling are
built on top of it. The embedded-hal [`I2c`](embedded_hal::i2c::I2c) traits
are implemented on the same primitives.

## Blue Pill example

```ignore
  use stm32f1xx_hal as hal;
  use hal::{pac, prelude::*};
  use bitbang_i2c_master::{i2c::BitBangI2c, Config};

  // ...

  let dp = pac::Peripherals::take().unwrap();
  let cp = cortex_m::Peripherals::take().unwrap();

  let mut flash = dp.FLASH.constrain();
  let rcc = dp.RCC.constrain();
  let clocks = rcc.cfgr.freeze(&mut flash.acr);
  let mut gpiob = dp.GPIOB.split();

  let scl = gpiob.pb8.into_open_drain_output(&mut gpiob.crh);
  let sda = gpiob.pb9.into_open_drain_output(&mut gpiob.crh);
  let delay = cp.SYST.delay(&clocks);

  let mut i2c = BitBangI2c::new(scl, sda, delay, Config::default());
  i2c.init().unwrap();

  i2c.start().unwrap();
  i2c.send_byte(0x3c).unwrap();
  let ack = i2c.receive_ack().unwrap();
  i2c.stop().unwrap();

  //...
```
*/

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

use crate::config::Config;

/// I2C error
#[derive(Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// GPIO error
    Bus(E),
    /// No ack received
    NoAck(NoAcknowledgeSource),
    /// Invalid input
    InvalidData,
    /// No acknowledge within the configured number of samples
    BusTimeout,
    /// Data line still held low after the configured recovery clocks
    BusUnrecoverable,
}

impl<E: core::fmt::Debug> embedded_hal::i2c::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Bus(_) => ErrorKind::Bus,
            Error::NoAck(source) => ErrorKind::NoAcknowledge(*source),
            Error::InvalidData => ErrorKind::Other,
            Error::BusTimeout => ErrorKind::Other,
            Error::BusUnrecoverable => ErrorKind::Bus,
        }
    }
}

/// Acknowledge bit exchanged after every byte.
///
/// On the wire `Ack` is a low data line (bit 0) and `Nack` a released,
/// high data line (bit 1).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Acknowledge {
    /// Acknowledged, bit 0
    Ack = 0,
    /// Not acknowledged, bit 1
    Nack = 1,
}

impl Acknowledge {
    /// Interpret a raw bit, any non-zero value is a NACK
    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Acknowledge::Ack
        } else {
            Acknowledge::Nack
        }
    }

    /// Raw bit value, 0 or 1
    pub fn bit(self) -> u8 {
        self as u8
    }

    /// `true` for [`Acknowledge::Ack`]
    pub fn is_ack(self) -> bool {
        self == Acknowledge::Ack
    }
}

impl From<PinState> for Acknowledge {
    fn from(level: PinState) -> Self {
        match level {
            PinState::Low => Acknowledge::Ack,
            PinState::High => Acknowledge::Nack,
        }
    }
}

impl From<Acknowledge> for PinState {
    fn from(ack: Acknowledge) -> Self {
        match ack {
            Acknowledge::Ack => PinState::Low,
            Acknowledge::Nack => PinState::High,
        }
    }
}

/// Outcome of [`BitBangI2c::recover`]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recovery {
    /// The data line was released, nothing to do
    NotHung,
    /// A target held the data line and let go after some clock pulses
    Recovered,
}

/// Bit banging I2C master
pub struct BitBangI2c<SCL, SDA, DELAY>
where
    SCL: OutputPin,
    SDA: OutputPin + InputPin,
    DELAY: DelayNs,
{
    scl: SCL,
    sda: SDA,
    delay: DELAY,
    config: Config,
}

impl<SCL, SDA, DELAY, E> BitBangI2c<SCL, SDA, DELAY>
where
    SCL: OutputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    DELAY: DelayNs,
{
    /// Create instance
    ///
    /// The lines are not touched until [`init`](Self::init) or the first
    /// transfer.
    pub fn new(scl: SCL, sda: SDA, delay: DELAY, config: Config) -> Self {
        BitBangI2c {
            scl,
            sda,
            delay,
            config,
        }
    }

    /// Active timing configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Release the pins and the delay provider
    pub fn free(self) -> (SCL, SDA, DELAY) {
        (self.scl, self.sda, self.delay)
    }

    /// Drive the clock line and wait for it to settle.
    #[inline]
    pub fn write_clock(&mut self, level: PinState) -> Result<(), Error<E>> {
        self.scl.set_state(level).map_err(Error::Bus)?;
        self.settle();
        Ok(())
    }

    /// Drive the data line and wait for it to settle.
    #[inline]
    pub fn write_data(&mut self, level: PinState) -> Result<(), Error<E>> {
        self.sda.set_state(level).map_err(Error::Bus)?;
        self.settle();
        Ok(())
    }

    /// Sample the data line, then wait for the settle delay.
    ///
    /// The master must have released the line beforehand, otherwise its
    /// own low drive is read back.
    #[inline]
    pub fn read_data(&mut self) -> Result<PinState, Error<E>> {
        let level = PinState::from(self.sda.is_high().map_err(Error::Bus)?);
        self.settle();
        Ok(level)
    }

    /// Release both lines and wait for the bus to stabilize.
    ///
    /// Safe to call any number of times.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.write_clock(PinState::High)?;
        self.write_data(PinState::High)?;
        self.delay.delay_ms(self.config.stabilization.to_millis());
        trace!("i2c: bus released");
        Ok(())
    }

    /// Send a raw I2C start.
    ///
    /// **This is a low-level control function.** For normal I2C devices,
    /// please use the embedded-hal [`I2c`](embedded_hal::i2c::I2c) trait.
    ///
    /// The bus must be idle, or held by this master with the clock low
    /// (repeated start). Leaves the clock low.
    pub fn start(&mut self) -> Result<(), Error<E>> {
        self.write_data(PinState::High)?;
        self.write_clock(PinState::High)?;

        // SDA falls while SCL is high
        self.write_data(PinState::Low)?;
        self.write_clock(PinState::Low)?;

        trace!("i2c: start");
        Ok(())
    }

    /// Send a raw I2C stop.
    ///
    /// **This is a low-level control function.** For normal I2C devices,
    /// please use the embedded-hal [`I2c`](embedded_hal::i2c::I2c) trait.
    ///
    /// Expects the clock to be low, as left by every other primitive.
    pub fn stop(&mut self) -> Result<(), Error<E>> {
        self.write_data(PinState::Low)?;
        self.write_clock(PinState::High)?;

        // SDA rises while SCL is high
        self.write_data(PinState::High)?;

        trace!("i2c: stop");
        Ok(())
    }

    /// Clock the acknowledge slot without driving or sampling the data line.
    pub fn wait_ack(&mut self) -> Result<(), Error<E>> {
        self.write_clock(PinState::High)?;
        self.write_clock(PinState::Low)
    }

    /// Send 8 bits, MSB first.
    pub fn send_byte(&mut self, byte: u8) -> Result<(), Error<E>> {
        for bit_offset in 0..8 {
            let out_bit = byte & (0x80 >> bit_offset) != 0;

            self.write_data(PinState::from(out_bit))?;

            // the target samples while SCL is high
            self.write_clock(PinState::High)?;
            self.write_clock(PinState::Low)?;
        }

        Ok(())
    }

    /// Receive 8 bits, MSB first.
    pub fn receive_byte(&mut self) -> Result<u8, Error<E>> {
        let mut byte: u8 = 0;

        self.write_data(PinState::High)?;

        for bit_offset in 0..8 {
            self.write_clock(PinState::High)?;

            if self.read_data()? == PinState::High {
                byte |= 0x80 >> bit_offset;
            }

            self.write_clock(PinState::Low)?;
        }

        Ok(byte)
    }

    /// Answer a received byte with an ACK or NACK.
    pub fn send_ack(&mut self, ack: Acknowledge) -> Result<(), Error<E>> {
        self.write_data(ack.into())?;
        self.write_clock(PinState::High)?;
        self.write_clock(PinState::Low)
    }

    /// Sample the acknowledge bit after a sent byte.
    ///
    /// A NACK is returned as data, it is up to the caller to treat it as an
    /// error.
    pub fn receive_ack(&mut self) -> Result<Acknowledge, Error<E>> {
        self.write_data(PinState::High)?;
        self.write_clock(PinState::High)?;

        let ack = Acknowledge::from(self.read_data()?);

        self.write_clock(PinState::Low)?;

        if !ack.is_ack() {
            debug!("i2c: nack");
        }
        Ok(ack)
    }

    /// Wait for the acknowledge bit, sampling the data line up to
    /// [`Config::ack_polls`] times while the clock is high.
    ///
    /// Returns [`Error::BusTimeout`] if no target pulled the line low.
    pub fn await_ack(&mut self) -> Result<(), Error<E>> {
        self.write_data(PinState::High)?;
        self.write_clock(PinState::High)?;

        let polls = self.config.ack_polls.max(1);
        let mut ack = Acknowledge::Nack;
        for _ in 0..polls {
            if self.read_data()? == PinState::Low {
                ack = Acknowledge::Ack;
                break;
            }
        }

        self.write_clock(PinState::Low)?;

        match ack {
            Acknowledge::Ack => Ok(()),
            Acknowledge::Nack => {
                warn!("i2c: no ack after {=u8} samples", polls);
                Err(Error::BusTimeout)
            }
        }
    }

    /// Free a bus whose data line is held low by a target, e.g. after the
    /// master was reset in the middle of a read.
    ///
    /// Clocks SCL until the target releases SDA, at most
    /// [`Config::recovery_clocks`] times, then issues a stop. Cheap to run
    /// on every boot: a healthy bus costs a single sample.
    pub fn recover(&mut self) -> Result<Recovery, Error<E>> {
        self.write_data(PinState::High)?;
        self.write_clock(PinState::High)?;

        let mut was_hung = false;
        for _ in 0..self.config.recovery_clocks {
            if self.read_data()? == PinState::High {
                return self.finish_recovery(was_hung);
            }
            was_hung = true;

            self.write_clock(PinState::Low)?;
            self.write_clock(PinState::High)?;
        }

        if self.read_data()? == PinState::High {
            return self.finish_recovery(was_hung);
        }

        warn!(
            "i2c: data line stuck low after {=u8} clocks",
            self.config.recovery_clocks
        );
        Err(Error::BusUnrecoverable)
    }

    fn finish_recovery(&mut self, was_hung: bool) -> Result<Recovery, Error<E>> {
        if !was_hung {
            return Ok(Recovery::NotHung);
        }

        // the target may still be mid-frame, end it explicitly
        self.write_clock(PinState::Low)?;
        self.stop()?;

        warn!("i2c: recovered hung bus");
        Ok(Recovery::Recovered)
    }

    #[inline]
    fn settle(&mut self) {
        self.delay.delay_us(self.config.settle.to_micros());
    }
}
