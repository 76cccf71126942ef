//! Wired-AND bus simulator with a simulated I2C target.
//!
//! Both lines are pulled up; the master pins and the target can only pull
//! them low. Every level change is recorded so tests can check timing
//! invariants on the resulting waveform.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use bitbang_i2c_master::{BitBangI2c, Config};
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal_mock::eh1::delay::NoopDelay;

/// Levels of both lines, `true` is high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    pub scl: bool,
    pub sda: bool,
}

impl Levels {
    pub const IDLE: Levels = Levels {
        scl: true,
        sda: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Receiving { shift: u8, bits: u8, address: bool },
    AckSlot { transmit: bool },
    Transmitting { byte: u8, bit: u8 },
    MasterAck { acked: Option<bool> },
    Stuck { falling_edges: Option<u32> },
    Ignoring,
}

/// A simple I2C target with a 7-bit address.
///
/// Written bytes end up in `received`, reads are served from `responses`
/// (0xFF once exhausted).
#[derive(Debug)]
pub struct Target {
    address: u8,
    state: State,
    drive_low: bool,
    data_ack_limit: Option<usize>,
    pub received: Vec<u8>,
    pub responses: VecDeque<u8>,
    pub address_bytes: Vec<u8>,
    pub master_acks: Vec<bool>,
}

impl Target {
    pub fn new(address: u8) -> Self {
        Target {
            address,
            state: State::Idle,
            drive_low: false,
            data_ack_limit: None,
            received: Vec::new(),
            responses: VecDeque::new(),
            address_bytes: Vec::new(),
            master_acks: Vec::new(),
        }
    }

    pub fn with_responses(mut self, responses: &[u8]) -> Self {
        self.responses.extend(responses.iter().copied());
        self
    }

    /// Acknowledge only the first `count` data bytes of a write
    pub fn acking_data_bytes(mut self, count: usize) -> Self {
        self.data_ack_limit = Some(count);
        self
    }

    /// Hold SDA low for the given number of SCL falling edges, forever
    /// with `None`.
    pub fn holding_data_low(mut self, falling_edges: Option<u32>) -> Self {
        self.state = State::Stuck { falling_edges };
        self.drive_low = true;
        self
    }

    fn bit(byte: u8, bit: u8) -> bool {
        byte & (0x80 >> bit) != 0
    }

    fn load_next(&mut self) {
        let byte = self.responses.pop_front().unwrap_or(0xFF);
        self.state = State::Transmitting { byte, bit: 0 };
        self.drive_low = !Self::bit(byte, 0);
    }

    fn release(&mut self, state: State) {
        self.state = state;
        self.drive_low = false;
    }

    fn observe(&mut self, before: Levels, after: Levels) {
        if let State::Stuck { falling_edges } = self.state {
            if before.scl && !after.scl {
                match falling_edges {
                    Some(0) | Some(1) => self.release(State::Idle),
                    Some(n) => self.state = State::Stuck {
                        falling_edges: Some(n - 1),
                    },
                    None => {}
                }
            }
            return;
        }

        if before.scl && after.scl && before.sda != after.sda {
            if after.sda {
                // stop
                self.release(State::Idle);
            } else {
                // start or repeated start
                self.release(State::Receiving {
                    shift: 0,
                    bits: 0,
                    address: true,
                });
            }
            return;
        }

        if !before.scl && after.scl {
            match self.state {
                State::Receiving {
                    shift,
                    bits,
                    address,
                } if bits < 8 => {
                    self.state = State::Receiving {
                        shift: (shift << 1) | after.sda as u8,
                        bits: bits + 1,
                        address,
                    };
                }
                State::MasterAck { acked: None } => {
                    self.master_acks.push(!after.sda);
                    self.state = State::MasterAck {
                        acked: Some(!after.sda),
                    };
                }
                _ => {}
            }
            return;
        }

        if before.scl && !after.scl {
            match self.state {
                State::Receiving {
                    shift,
                    bits: 8,
                    address: true,
                } => {
                    self.address_bytes.push(shift);
                    if shift >> 1 == self.address {
                        self.drive_low = true;
                        self.state = State::AckSlot {
                            transmit: shift & 1 == 1,
                        };
                    } else {
                        self.release(State::Ignoring);
                    }
                }
                State::Receiving {
                    shift,
                    bits: 8,
                    address: false,
                } => {
                    let accepted = self
                        .data_ack_limit
                        .map_or(true, |limit| self.received.len() < limit);
                    if accepted {
                        self.received.push(shift);
                        self.drive_low = true;
                        self.state = State::AckSlot { transmit: false };
                    } else {
                        self.release(State::Ignoring);
                    }
                }
                State::AckSlot { transmit: false } => self.release(State::Receiving {
                    shift: 0,
                    bits: 0,
                    address: false,
                }),
                State::AckSlot { transmit: true } => self.load_next(),
                State::Transmitting { byte, bit } => {
                    let next = bit + 1;
                    if next == 8 {
                        self.release(State::MasterAck { acked: None });
                    } else {
                        self.state = State::Transmitting { byte, bit: next };
                        self.drive_low = !Self::bit(byte, next);
                    }
                }
                State::MasterAck { acked: Some(true) } => self.load_next(),
                State::MasterAck { .. } => self.release(State::Ignoring),
                _ => {}
            }
        }
    }
}

#[derive(Debug)]
struct Wire {
    scl_pulled: bool,
    sda_pulled: bool,
    target: Target,
    history: Vec<Levels>,
}

impl Wire {
    fn levels(&self) -> Levels {
        Levels {
            scl: !self.scl_pulled,
            sda: !(self.sda_pulled || self.target.drive_low),
        }
    }

    fn update(&mut self, change: impl FnOnce(&mut Wire)) {
        let before = self.levels();
        change(self);
        let after = self.levels();
        if before == after {
            return;
        }
        self.history.push(after);

        self.target.observe(before, after);
        let settled = self.levels();
        if settled != after {
            self.history.push(settled);
        }
    }
}

/// Shared handle on the simulated bus
#[derive(Clone)]
pub struct Bus(Rc<RefCell<Wire>>);

impl Bus {
    pub fn new(target: Target) -> Self {
        let mut wire = Wire {
            scl_pulled: false,
            sda_pulled: false,
            target,
            history: Vec::new(),
        };
        let idle = wire.levels();
        wire.history.push(idle);
        Bus(Rc::new(RefCell::new(wire)))
    }

    pub fn levels(&self) -> Levels {
        self.0.borrow().levels()
    }

    /// Every distinct line state, starting with the state at creation
    pub fn history(&self) -> Vec<Levels> {
        self.0.borrow().history.clone()
    }

    /// Forget the recorded waveform, keeping the current levels as start
    pub fn clear_history(&self) {
        let mut wire = self.0.borrow_mut();
        let now = wire.levels();
        wire.history = vec![now];
    }

    pub fn with_target<R>(&self, f: impl FnOnce(&mut Target) -> R) -> R {
        f(&mut self.0.borrow_mut().target)
    }

    pub fn master(&self, config: Config) -> BitBangI2c<SclPin, SdaPin, NoopDelay> {
        BitBangI2c::new(
            SclPin(self.clone()),
            SdaPin(self.clone()),
            NoopDelay::new(),
            config,
        )
    }
}

pub struct SclPin(Bus);

pub struct SdaPin(Bus);

impl ErrorType for SclPin {
    type Error = Infallible;
}

impl ErrorType for SdaPin {
    type Error = Infallible;
}

impl OutputPin for SclPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        (self.0).0.borrow_mut().update(|wire| wire.scl_pulled = true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        (self.0).0.borrow_mut().update(|wire| wire.scl_pulled = false);
        Ok(())
    }
}

impl OutputPin for SdaPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        (self.0).0.borrow_mut().update(|wire| wire.sda_pulled = true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        (self.0).0.borrow_mut().update(|wire| wire.sda_pulled = false);
        Ok(())
    }
}

impl InputPin for SdaPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.levels().sda)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.levels().sda)
    }
}

/// Data level at every rising clock edge
pub fn sampled_bits(history: &[Levels]) -> Vec<bool> {
    history
        .windows(2)
        .filter(|pair| !pair[0].scl && pair[1].scl)
        .map(|pair| pair[1].sda)
        .collect()
}

/// Data transitions that happened while the clock was high, as
/// `(from, to)` pairs. Only START (`(true, false)`) and STOP
/// (`(false, true)`) may appear here.
pub fn data_edges_while_clock_high(history: &[Levels]) -> Vec<(bool, bool)> {
    history
        .windows(2)
        .filter(|pair| pair[0].scl && pair[1].scl && pair[0].sda != pair[1].sda)
        .map(|pair| (pair[0].sda, pair[1].sda))
        .collect()
}

pub const START: (bool, bool) = (true, false);
pub const STOP: (bool, bool) = (false, true);

pub fn byte_bits(byte: u8) -> Vec<bool> {
    (0..8).map(|i| byte & (0x80 >> i) != 0).collect()
}

/// Zero stabilization so simulated tests do not depend on the delay
pub fn fast_config() -> Config {
    Config::default().with_stabilization(fugit::MillisDurationU32::from_ticks(0))
}
