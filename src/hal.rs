//! embedded-hal I2C traits on top of the bitbang primitives
//!
//! Both the blocking [`embedded_hal::i2c::I2c`] and the async
//! [`embedded_hal_async::i2c::I2c`] traits are implemented. The async variant
//! runs the same blocking sequence to completion without yielding.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::{ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};

use crate::i2c::{Acknowledge, BitBangI2c, Error};

/// Transfer direction, the R/W bit of the address byte
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master to target, R/W = 0
    Write,
    /// Target to master, R/W = 1
    Read,
}

/// First byte of a frame: the 7-bit address followed by the R/W bit.
#[inline]
pub fn address_byte(address: SevenBitAddress, direction: Direction) -> u8 {
    let rw = match direction {
        Direction::Write => 0x0,
        Direction::Read => 0x1,
    };
    (address << 1) | rw
}

/// Zero-length reads are skipped, a write of zero bytes still addresses
/// the target.
fn is_empty_read(operation: &Operation<'_>) -> bool {
    matches!(operation, Operation::Read(buffer) if buffer.is_empty())
}

impl<SCL, SDA, DELAY, E> BitBangI2c<SCL, SDA, DELAY>
where
    SCL: OutputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    DELAY: DelayNs,
{
    #[inline]
    fn check_ack(&mut self, source: NoAcknowledgeSource) -> Result<(), Error<E>> {
        match self.receive_ack()? {
            Acknowledge::Ack => Ok(()),
            Acknowledge::Nack => Err(Error::NoAck(source)),
        }
    }

    fn run_transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Error<E>> {
        if address > 0x7F {
            return Err(Error::InvalidData);
        }
        if operations.iter().all(is_empty_read) {
            return Ok(());
        }

        match self.run_operations(address, operations) {
            // SP
            Ok(()) => self.stop(),
            // never leave the bus captured
            Err(error) => {
                // best effort, the protocol error is what the caller needs
                let _ = self.stop();
                Err(error)
            }
        }
    }

    fn run_operations(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Error<E>> {
        let mut previous: Option<Direction> = None;

        for index in 0..operations.len() {
            // nothing to clock in, and an addressed target would hold SDA
            if is_empty_read(&operations[index]) {
                continue;
            }

            let direction = match operations[index] {
                Operation::Read(_) => Direction::Read,
                Operation::Write(_) => Direction::Write,
            };
            let next_is_read = matches!(
                operations[index + 1..].iter().find(|op| !is_empty_read(op)),
                Some(Operation::Read(_))
            );

            if previous != Some(direction) {
                // ST or SR, then SAD + R/W
                self.start()?;
                self.send_byte(address_byte(address, direction))?;
                self.check_ack(NoAcknowledgeSource::Address)?;
            }

            match &mut operations[index] {
                Operation::Write(bytes) => {
                    for byte in bytes.iter() {
                        self.send_byte(*byte)?;
                        self.check_ack(NoAcknowledgeSource::Data)?;
                    }
                }
                Operation::Read(buffer) => {
                    let len = buffer.len();
                    for (i, slot) in buffer.iter_mut().enumerate() {
                        *slot = self.receive_byte()?;

                        // NMAK on the last byte before SR or SP
                        let last = i + 1 == len && !next_is_read;
                        let ack = if last {
                            Acknowledge::Nack
                        } else {
                            Acknowledge::Ack
                        };
                        self.send_ack(ack)?;
                    }
                }
            }

            previous = Some(direction);
        }

        Ok(())
    }
}

impl<SCL, SDA, DELAY, E> ErrorType for BitBangI2c<SCL, SDA, DELAY>
where
    SCL: OutputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    type Error = Error<E>;
}

impl<SCL, SDA, DELAY, E> I2c for BitBangI2c<SCL, SDA, DELAY>
where
    SCL: OutputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run_transaction(address, operations)
    }
}

impl<SCL, SDA, DELAY, E> embedded_hal_async::i2c::I2c for BitBangI2c<SCL, SDA, DELAY>
where
    SCL: OutputPin<Error = E>,
    SDA: OutputPin<Error = E> + InputPin<Error = E>,
    DELAY: DelayNs,
    E: core::fmt::Debug,
{
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run_transaction(address, operations)
    }
}
