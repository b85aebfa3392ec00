//! Fault taxonomy and diagnostic rendering.
//!
//! Faults are plain values carrying the offending block/line so an embedding
//! editor can navigate to them; the miette reports built here are the
//! human-readable layer on top.

use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::span::Span;

/// Raised while assembling or linking. No usable program is produced.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AssemblyFault {
    /// Operand text that fails to decode, or a `JMP`/`BNE` without a label
    /// operand to resolve.
    MalformedOperand { block: usize, line: usize },
    /// Unrecognized mnemonic.
    InvalidOpcode {
        mnemonic: String,
        block: usize,
        line: usize,
    },
    /// A `JMP`/`BNE` target missing from the label table. Linking aborts on
    /// the first one found.
    UnresolvedLabel {
        label: String,
        block: usize,
        line: usize,
    },
}

impl AssemblyFault {
    pub fn location(&self) -> (usize, usize) {
        match *self {
            AssemblyFault::MalformedOperand { block, line }
            | AssemblyFault::InvalidOpcode { block, line, .. }
            | AssemblyFault::UnresolvedLabel { block, line, .. } => (block, line),
        }
    }
}

impl fmt::Display for AssemblyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyFault::MalformedOperand { block, line } => {
                write!(f, "malformed operand at block {block}, line {line}")
            }
            AssemblyFault::InvalidOpcode {
                mnemonic,
                block,
                line,
            } => {
                write!(f, "invalid opcode `{mnemonic}` at block {block}, line {line}")
            }
            AssemblyFault::UnresolvedLabel { label, block, line } => {
                write!(f, "unresolved label `{label}` at block {block}, line {line}")
            }
        }
    }
}

impl std::error::Error for AssemblyFault {}

/// Raised mid-step by the execution engine. The faulting instruction does
/// not apply its effect.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RuntimeFault {
    /// Operand kind does not fit the opcode (e.g. `STA` with an immediate).
    MalformedOperand { block: usize, line: usize },
    /// Absolute access outside the device's register file.
    InvalidAddress {
        addr: u16,
        block: usize,
        line: usize,
    },
    /// `STA` to a register only the hardware may write.
    ReadOnlyRegister {
        name: &'static str,
        block: usize,
        line: usize,
    },
    /// `STA` to the power register with a byte that is neither $00 nor the
    /// activation byte.
    InvalidPowerValue {
        value: u8,
        block: usize,
        line: usize,
    },
    /// Execution ran off the end of the program without a controlled halt.
    ProgramTerminated { block: usize, line: usize },
}

impl RuntimeFault {
    pub fn location(&self) -> (usize, usize) {
        match *self {
            RuntimeFault::MalformedOperand { block, line }
            | RuntimeFault::InvalidAddress { block, line, .. }
            | RuntimeFault::ReadOnlyRegister { block, line, .. }
            | RuntimeFault::InvalidPowerValue { block, line, .. }
            | RuntimeFault::ProgramTerminated { block, line } => (block, line),
        }
    }
}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFault::MalformedOperand { block, line } => {
                write!(f, "malformed operand at block {block}, line {line}")
            }
            RuntimeFault::InvalidAddress { addr, block, line } => {
                write!(
                    f,
                    "invalid address ${addr:04X} at block {block}, line {line}"
                )
            }
            RuntimeFault::ReadOnlyRegister { name, block, line } => {
                write!(
                    f,
                    "write to read-only register {name} at block {block}, line {line}"
                )
            }
            RuntimeFault::InvalidPowerValue { value, block, line } => {
                write!(
                    f,
                    "invalid power value ${value:02X} at block {block}, line {line}"
                )
            }
            RuntimeFault::ProgramTerminated { block, line } => {
                write!(
                    f,
                    "program terminated without halt after block {block}, line {line}"
                )
            }
        }
    }
}

impl std::error::Error for RuntimeFault {}

/// Either taxonomy, as surfaced by the session to its embedding UI.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Fault {
    Assembly(AssemblyFault),
    Runtime(RuntimeFault),
}

impl Fault {
    /// `(block, line)` of the offending instruction, 1-based line.
    pub fn location(&self) -> (usize, usize) {
        match self {
            Fault::Assembly(fault) => fault.location(),
            Fault::Runtime(fault) => fault.location(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Assembly(fault) => fault.fmt(f),
            Fault::Runtime(fault) => fault.fmt(f),
        }
    }
}

impl From<AssemblyFault> for Fault {
    fn from(fault: AssemblyFault) -> Self {
        Fault::Assembly(fault)
    }
}

impl From<RuntimeFault> for Fault {
    fn from(fault: RuntimeFault) -> Self {
        Fault::Runtime(fault)
    }
}

/// Build a rendered diagnostic for a fault, labeling the offending line of
/// the block it occurred in. `block_src` is that block's joined source text.
pub fn fault_report(fault: &Fault, block_src: &str) -> Report {
    let (_, line) = fault.location();
    let span = Span::of_line(block_src, line);
    let (code, help) = match fault {
        Fault::Assembly(AssemblyFault::MalformedOperand { .. }) => (
            "asm::operand",
            "operands look like #$XX (immediate) or $XXXX (address)",
        ),
        Fault::Assembly(AssemblyFault::InvalidOpcode { .. }) => (
            "asm::opcode",
            "supported mnemonics are LDA, STA, CMP, JMP, BNE and NOP",
        ),
        Fault::Assembly(AssemblyFault::UnresolvedLabel { .. }) => (
            "asm::label",
            "jump targets must name a block entry or a `NAME:` line",
        ),
        Fault::Runtime(RuntimeFault::MalformedOperand { .. }) => (
            "run::operand",
            "STA needs an absolute address and CMP an immediate byte",
        ),
        Fault::Runtime(RuntimeFault::InvalidAddress { .. }) => (
            "run::address",
            "the LAPC-1 exposes registers $C400 through $C404 only",
        ),
        Fault::Runtime(RuntimeFault::ReadOnlyRegister { .. }) => (
            "run::readonly",
            "DATA_READY and PACKET_BUFFER are fed by the card, not the driver",
        ),
        Fault::Runtime(RuntimeFault::InvalidPowerValue { .. }) => (
            "run::power",
            "MASTER_POWER accepts $00 (off) or $01 (on)",
        ),
        Fault::Runtime(RuntimeFault::ProgramTerminated { .. }) => (
            "run::terminated",
            "keep the driver in a loop, e.g. `JMP DATA_CHECK`",
        ),
    };
    miette!(
        severity = Severity::Error,
        code = code,
        help = help,
        labels = vec![LabeledSpan::at(span, "faulting line")],
        "{fault}",
    )
    .with_source_code(block_src.to_string())
}
