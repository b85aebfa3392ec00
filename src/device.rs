//! Register file of the simulated LAPC-1 sound card.

use std::fmt;

/// Byte that powers the card on when stored to `MASTER_POWER`.
pub const ACTIVATION_BYTE: u8 = 0x01;
/// Volume both channels must reach for the driver to be considered up.
pub const DEFAULT_VOLUME: u8 = 0x80;
/// Value of `DATA_READY` on ticks where a sample landed in the buffer.
pub const DATA_READY_SET: u8 = 0x01;

/// The five device registers, in canonical display order. This explicit
/// ordering is the source of truth for consumers listing the register file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Port {
    MasterPower,
    LeftChannel,
    RightChannel,
    DataReady,
    PacketBuffer,
}

impl Port {
    pub const ALL: [Port; 5] = [
        Port::MasterPower,
        Port::LeftChannel,
        Port::RightChannel,
        Port::DataReady,
        Port::PacketBuffer,
    ];

    pub fn address(self) -> u16 {
        match self {
            Port::MasterPower => 0xC400,
            Port::LeftChannel => 0xC401,
            Port::RightChannel => 0xC402,
            Port::DataReady => 0xC403,
            Port::PacketBuffer => 0xC404,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Port::MasterPower => "MASTER_POWER",
            Port::LeftChannel => "LEFT_CHANNEL",
            Port::RightChannel => "RIGHT_CHANNEL",
            Port::DataReady => "DATA_READY",
            Port::PacketBuffer => "PACKET_BUFFER",
        }
    }

    /// `DATA_READY` and `PACKET_BUFFER` are fed by the card itself and
    /// rejected on the program-facing write path.
    pub fn program_writable(self) -> bool {
        !matches!(self, Port::DataReady | Port::PacketBuffer)
    }

    pub fn from_address(addr: u16) -> Option<Port> {
        Port::ALL.into_iter().find(|port| port.address() == addr)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Write rejections, without source location; the engine attaches the
/// offending block/line when it surfaces these as runtime faults.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeviceError {
    InvalidAddress(u16),
    ReadOnly(Port),
    InvalidPower(u8),
}

/// Register state of one simulated card. All registers start at zero.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Device {
    bytes: [u8; 5],
}

impl Device {
    pub fn new() -> Self {
        Device::default()
    }

    pub fn reset(&mut self) {
        self.bytes = [0; 5];
    }

    pub fn get(&self, port: Port) -> u8 {
        self.bytes[port as usize]
    }

    pub fn is_powered(&self) -> bool {
        self.get(Port::MasterPower) == ACTIVATION_BYTE
    }

    /// Program-facing read.
    pub fn read(&self, addr: u16) -> Result<u8, DeviceError> {
        let port = Port::from_address(addr).ok_or(DeviceError::InvalidAddress(addr))?;
        Ok(self.get(port))
    }

    /// Program-facing write, enforcing per-register semantics.
    pub fn write(&mut self, addr: u16, value: u8) -> Result<(), DeviceError> {
        let port = Port::from_address(addr).ok_or(DeviceError::InvalidAddress(addr))?;
        if !port.program_writable() {
            return Err(DeviceError::ReadOnly(port));
        }
        if port == Port::MasterPower && value != 0x00 && value != ACTIVATION_BYTE {
            return Err(DeviceError::InvalidPower(value));
        }
        self.bytes[port as usize] = value;
        Ok(())
    }

    /// Hardware-side write used by the data stream generator. Bypasses the
    /// program-facing checks; it models the card, not the driver under test.
    pub(crate) fn force_set(&mut self, port: Port, value: u8) {
        self.bytes[port as usize] = value;
    }

    /// Registers in canonical order, for display.
    pub fn snapshot(&self) -> [(Port, u8); 5] {
        Port::ALL.map(|port| (port, self.get(port)))
    }
}
