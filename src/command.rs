//! Raw EtherCAT commands, e.g. `LRW`, `FPRD`, `BWR`, etc.

use crate::error::PduError;
use ethertide_wire::WireWrite;

const NOP: u8 = 0x00;
const FPRD: u8 = 0x04;
const BRD: u8 = 0x07;
const LRD: u8 = 0x0A;
const BWR: u8 = 0x08;
const FPWR: u8 = 0x05;
const LWR: u8 = 0x0B;
const LRW: u8 = 0x0C;

/// Read commands.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Reads {
    /// BRD.
    Brd {
        /// Autoincremented by each SubDevice visited.
        address: u16,

        /// Memory location to read from.
        register: u16,
    },
    /// FPRD.
    Fprd {
        /// Configured station address.
        address: u16,

        /// Memory location to read from.
        register: u16,
    },
    /// LRD.
    Lrd {
        /// Logical address.
        address: u32,
    },
}

/// Write commands.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Writes {
    /// BWR.
    Bwr {
        /// Autoincremented by each SubDevice visited.
        address: u16,

        /// Memory location to write to.
        register: u16,
    },
    /// FPWR.
    Fpwr {
        /// Configured station address.
        address: u16,

        /// Memory location to write to.
        register: u16,
    },
    /// LWR.
    Lwr {
        /// Logical address.
        address: u32,
    },
    /// LRW.
    Lrw {
        /// Logical address.
        address: u32,
    },
}

/// PDU command.
///
/// A command names the EtherCAT service a datagram performs: register access
/// by configured station address (`FPRD`/`FPWR`), broadcast register access
/// (`BRD`/`BWR`), or logical memory access used for cyclic process data
/// (`LRD`/`LWR`/`LRW`).
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Command {
    /// No operation.
    #[default]
    Nop,

    /// Read commands.
    Read(Reads),

    /// Write commands.
    Write(Writes),
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Command::Nop => write!(f, "NOP"),

            Command::Read(read) => match read {
                Reads::Brd { address, register } => {
                    write!(f, "BRD(addr {:#06x}, reg {:#06x})", address, register)
                }
                Reads::Fprd { address, register } => {
                    write!(f, "FPRD(addr {:#06x}, reg {:#06x})", address, register)
                }
                Reads::Lrd { address } => write!(f, "LRD(addr {:#010x})", address),
            },

            Command::Write(write) => match write {
                Writes::Bwr { address, register } => {
                    write!(f, "BWR(addr {:#06x}, reg {:#06x})", address, register)
                }
                Writes::Fpwr { address, register } => {
                    write!(f, "FPWR(addr {:#06x}, reg {:#06x})", address, register)
                }
                Writes::Lwr { address } => write!(f, "LWR(addr {:#010x})", address),
                Writes::Lrw { address } => write!(f, "LRW(addr {:#010x})", address),
            },
        }
    }
}

impl Command {
    /// Create a broadcast read (BRD) command to the given register address.
    ///
    /// The station address is always zero when transmitted from the
    /// MainDevice.
    pub fn brd(register: u16) -> Self {
        Self::Read(Reads::Brd {
            address: 0,
            register,
        })
    }

    /// Create a broadcast write (BWR) command to the given register address.
    pub fn bwr(register: u16) -> Self {
        Self::Write(Writes::Bwr {
            address: 0,
            register,
        })
    }

    /// Configured station address read (FPRD).
    pub fn fprd(address: u16, register: u16) -> Self {
        Self::Read(Reads::Fprd { address, register })
    }

    /// Configured station address write (FPWR).
    pub fn fpwr(address: u16, register: u16) -> Self {
        Self::Write(Writes::Fpwr { address, register })
    }

    /// Logical read (LRD), used for input-only process data.
    pub fn lrd(address: u32) -> Self {
        Self::Read(Reads::Lrd { address })
    }

    /// Logical write (LWR), used for output-only process data.
    pub fn lwr(address: u32) -> Self {
        Self::Write(Writes::Lwr { address })
    }

    /// Logical read-write (LRW), used for mixed direction process data.
    pub fn lrw(address: u32) -> Self {
        Self::Write(Writes::Lrw { address })
    }

    /// Get just the service code for a command.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Nop => NOP,

            Self::Read(read) => match read {
                Reads::Brd { .. } => BRD,
                Reads::Fprd { .. } => FPRD,
                Reads::Lrd { .. } => LRD,
            },

            Self::Write(write) => match write {
                Writes::Bwr { .. } => BWR,
                Writes::Fpwr { .. } => FPWR,
                Writes::Lwr { .. } => LWR,
                Writes::Lrw { .. } => LRW,
            },
        }
    }

    /// Reconstruct a command from a service code and the raw 4 address bytes
    /// of a datagram header.
    pub fn parse_code_data(code: u8, data: [u8; 4]) -> Result<Self, PduError> {
        fn split(data: [u8; 4]) -> (u16, u16) {
            (
                u16::from_le_bytes([data[0], data[1]]),
                u16::from_le_bytes([data[2], data[3]]),
            )
        }

        match code {
            NOP => Ok(Command::Nop),

            BRD => {
                let (address, register) = split(data);
                Ok(Command::Read(Reads::Brd { address, register }))
            }
            FPRD => {
                let (address, register) = split(data);
                Ok(Command::Read(Reads::Fprd { address, register }))
            }
            LRD => Ok(Command::Read(Reads::Lrd {
                address: u32::from_le_bytes(data),
            })),

            BWR => {
                let (address, register) = split(data);
                Ok(Command::Write(Writes::Bwr { address, register }))
            }
            FPWR => {
                let (address, register) = split(data);
                Ok(Command::Write(Writes::Fpwr { address, register }))
            }
            LWR => Ok(Command::Write(Writes::Lwr {
                address: u32::from_le_bytes(data),
            })),
            LRW => Ok(Command::Write(Writes::Lrw {
                address: u32::from_le_bytes(data),
            })),

            other => {
                log::error!("Invalid command code {:#04x}", other);

                Err(PduError::Decode)
            }
        }
    }
}

impl WireWrite for Command {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        match *self {
            Command::Nop => {
                let buf = &mut buf[0..4];
                buf.fill(0);
                buf
            }

            Command::Read(Reads::Brd { address, register })
            | Command::Read(Reads::Fprd { address, register })
            | Command::Write(Writes::Bwr { address, register })
            | Command::Write(Writes::Fpwr { address, register }) => {
                address.pack_to_slice_unchecked(&mut buf[0..2]);
                register.pack_to_slice_unchecked(&mut buf[2..4]);

                &buf[0..4]
            }
            Command::Read(Reads::Lrd { address })
            | Command::Write(Writes::Lwr { address })
            | Command::Write(Writes::Lrw { address }) => {
                address.pack_to_slice_unchecked(&mut buf[0..4])
            }
        }
    }

    fn packed_len(&self) -> usize {
        // Either 2x u16 or 1x u32
        4
    }
}

impl From<Reads> for Command {
    fn from(value: Reads) -> Self {
        Self::Read(value)
    }
}

impl From<Writes> for Command {
    fn from(value: Writes) -> Self {
        Self::Write(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_codes() {
        assert_eq!(Command::fprd(0x1001, 0x0130).code(), 0x04);
        assert_eq!(Command::fpwr(0x1001, 0x0130).code(), 0x05);
        assert_eq!(Command::lrd(0).code(), 0x0A);
        assert_eq!(Command::lwr(0).code(), 0x0B);
        assert_eq!(Command::lrw(0).code(), 0x0C);
    }

    #[test]
    fn pack_station_command() {
        let mut buf = [0u8; 4];

        Command::fpwr(0x1001, 0x0130).pack_to_slice_unchecked(&mut buf);

        assert_eq!(buf, [0x01, 0x10, 0x30, 0x01]);
    }

    #[test]
    fn pack_logical_command() {
        let mut buf = [0u8; 4];

        Command::lrw(0x0001_0200).pack_to_slice_unchecked(&mut buf);

        assert_eq!(buf, [0x00, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn roundtrip_code_data() {
        let original = Command::lrw(0xdead_beef);

        let mut buf = [0u8; 4];
        original.pack_to_slice_unchecked(&mut buf);

        assert_eq!(Command::parse_code_data(original.code(), buf), Ok(original));
    }
}
