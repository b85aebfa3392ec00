//! Opcodes and operand syntax for the LAPC-1 driver dialect.

use std::fmt;

/// The six mnemonics the driver dialect recognizes. Anything else is an
/// invalid-opcode fault at assembly time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    /// Load accumulator from an immediate or a device register.
    Lda,
    /// Store accumulator to a device register. Absolute operands only.
    Sta,
    /// Compare accumulator against an immediate, setting the zero flag.
    Cmp,
    /// Unconditional jump to a label.
    Jmp,
    /// Branch to a label if the zero flag is clear.
    Bne,
    Nop,
}

impl Opcode {
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        let op = match mnemonic.to_ascii_uppercase().as_str() {
            "LDA" => Opcode::Lda,
            "STA" => Opcode::Sta,
            "CMP" => Opcode::Cmp,
            "JMP" => Opcode::Jmp,
            "BNE" => Opcode::Bne,
            "NOP" => Opcode::Nop,
            _ => return None,
        };
        Some(op)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Lda => "LDA",
            Opcode::Sta => "STA",
            Opcode::Cmp => "CMP",
            Opcode::Jmp => "JMP",
            Opcode::Bne => "BNE",
            Opcode::Nop => "NOP",
        }
    }

    /// Whether the linker must resolve this opcode's operand to a flat index.
    pub fn takes_label(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Bne)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Decoded operand. Parsed fresh from text on every assembly pass.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    /// `#$XX` or `#0xXX`: a byte literal.
    Immediate(u8),
    /// `$XXXX` or `0xXXXX`: a device register address.
    Absolute(u16),
    /// Bare word, stored uppercased: a jump target for `JMP`/`BNE`.
    Label(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Immediate(val) => write!(f, "#${:02X}", val),
            Operand::Absolute(addr) => write!(f, "${:04X}", addr),
            Operand::Label(name) => f.write_str(name),
        }
    }
}

/// Parse an immediate token (`#$XX` / `#0xXX` / `#XX`) into a byte.
///
/// The value is parsed base-16 and masked to 8 bits. Returns `None` when the
/// `#` prefix is absent or no digits follow.
pub fn parse_immediate_byte(token: &str) -> Option<u8> {
    let rest = token.strip_prefix('#')?;
    let digits = strip_radix_prefix(rest).unwrap_or(rest);
    let val = u32::from_str_radix(digits, 16).ok()?;
    Some((val & 0xFF) as u8)
}

/// Parse an absolute address token (`$XXXX` / `0xXXXX`) into a 16-bit address.
///
/// Returns `None` when neither prefix is present or digits are missing.
pub fn parse_absolute_address(token: &str) -> Option<u16> {
    let digits = strip_radix_prefix(token)?;
    u16::from_str_radix(digits, 16).ok()
}

fn strip_radix_prefix(token: &str) -> Option<&str> {
    token
        .strip_prefix('$')
        .or_else(|| token.strip_prefix("0x"))
        .or_else(|| token.strip_prefix("0X"))
}

/// Classify a raw operand token. `#`-prefixed tokens must decode as
/// immediates and `$`/`0x`-prefixed tokens as addresses; everything else is
/// kept as a label reference for the linker.
pub fn decode_operand(token: &str) -> Option<Operand> {
    if token.starts_with('#') {
        return parse_immediate_byte(token).map(Operand::Immediate);
    }
    if token.starts_with('$') || token.starts_with("0x") || token.starts_with("0X") {
        return parse_absolute_address(token).map(Operand::Absolute);
    }
    Some(Operand::Label(token.to_ascii_uppercase()))
}
