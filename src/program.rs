use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::error::AssemblyFault;
use crate::ops::{Opcode, Operand};

/// Label table: uppercased name to flat instruction index. `IndexMap` keeps
/// insertion order so consumers can list labels deterministically.
pub type LabelMap = IndexMap<String, usize, FxBuildHasher>;

/// One decoded line of driver source. Immutable once assembled; the engine
/// only reads these.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Option<Operand>,
    /// Index of the source block this line came from.
    pub block: usize,
    /// 1-based line within the block, for fault navigation.
    pub line: usize,
    pub flat_index: usize,
    /// Flat index of the jump destination. Filled by [`Program::backpatch`]
    /// for `JMP`/`BNE`; `None` for everything else.
    pub jump_target: Option<usize>,
}

/// Assembled driver program: the flat instruction list, the label table, and
/// the per-block source it was built from (kept for diagnostics).
///
/// Re-assembly produces a whole new `Program`; nothing is patched in place.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: LabelMap,
    block_sources: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub(crate) fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    pub(crate) fn insert_label(&mut self, name: String, flat_index: usize) {
        self.labels.insert(name, flat_index);
    }

    pub(crate) fn push_block_source(&mut self, src: String) {
        self.block_sources.push(src);
    }

    pub fn get(&self, idx: usize) -> Option<&Instruction> {
        self.instructions.get(idx)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Case-insensitive label lookup.
    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.labels.get(&name.to_ascii_uppercase()).copied()
    }

    /// Joined source text of a block, as assembled.
    pub fn block_source(&self, block: usize) -> Option<&str> {
        self.block_sources.get(block).map(String::as_str)
    }

    /// Linker pass: resolve every `JMP`/`BNE` operand against the label
    /// table. Aborts on the first unresolved target.
    pub fn backpatch(&mut self) -> Result<(), AssemblyFault> {
        for i in 0..self.instructions.len() {
            let instr = &self.instructions[i];
            if !instr.opcode.takes_label() {
                continue;
            }
            let target = match &instr.operand {
                Some(Operand::Label(name)) => {
                    self.labels.get(name).copied().ok_or_else(|| {
                        AssemblyFault::UnresolvedLabel {
                            label: name.clone(),
                            block: instr.block,
                            line: instr.line,
                        }
                    })?
                }
                // A jump needs a label to resolve; immediates and addresses
                // cannot land anywhere in the flat list.
                Some(_) | None => {
                    return Err(AssemblyFault::MalformedOperand {
                        block: instr.block,
                        line: instr.line,
                    })
                }
            };
            self.instructions[i].jump_target = Some(target);
        }
        Ok(())
    }
}
