use crate::error::AssemblyFault;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::ops::{decode_operand, Opcode};
use crate::program::{Instruction, Program};

/// Transforms per-block driver source into a [`Program`].
///
/// Pass 1 lives here: entry labels are registered in block order (empty
/// blocks included, pointing at the next flat index), lines are tokenized
/// and decoded into the flat instruction list. Pass 2 is
/// [`Program::backpatch`]; [`assemble`] runs both.
pub struct AsmParser<'a> {
    /// Canonical per-block entry labels, one per block, in block order.
    entry_labels: &'a [String],
    /// Raw source lines per block.
    blocks: &'a [Vec<String>],
}

/// Assemble and link in one call. Re-running on unchanged source yields a
/// structurally identical program.
pub fn assemble(
    entry_labels: &[String],
    blocks: &[Vec<String>],
) -> Result<Program, AssemblyFault> {
    let mut program = AsmParser::new(entry_labels, blocks).parse()?;
    program.backpatch()?;
    Ok(program)
}

impl<'a> AsmParser<'a> {
    pub fn new(entry_labels: &'a [String], blocks: &'a [Vec<String>]) -> Self {
        debug_assert_eq!(entry_labels.len(), blocks.len());
        AsmParser {
            entry_labels,
            blocks,
        }
    }

    /// Run pass 1, producing a program with unresolved jump targets.
    pub fn parse(self) -> Result<Program, AssemblyFault> {
        let mut program = Program::new();
        for (block, lines) in self.blocks.iter().enumerate() {
            if let Some(entry) = self.entry_labels.get(block) {
                program.insert_label(entry.to_ascii_uppercase(), program.len());
            }
            let src = lines.join("\n");
            parse_block(block, &src, &mut program)?;
            program.push_block_source(src);
        }
        Ok(program)
    }
}

fn parse_block(block: usize, src: &str, program: &mut Program) -> Result<(), AssemblyFault> {
    let mut line = 1;
    let mut line_toks: Vec<Token> = Vec::new();
    for tok in tokenize(src) {
        match tok.kind {
            TokenKind::Newline => {
                parse_line(block, line, &line_toks, src, program)?;
                line_toks.clear();
                line += 1;
            }
            TokenKind::Whitespace | TokenKind::Comment => {}
            TokenKind::Word | TokenKind::Label => line_toks.push(tok),
        }
    }
    parse_line(block, line, &line_toks, src, program)
}

fn parse_line(
    block: usize,
    line: usize,
    toks: &[Token],
    src: &str,
    program: &mut Program,
) -> Result<(), AssemblyFault> {
    let mut toks = toks.iter();
    let Some(mut first) = toks.next() else {
        return Ok(());
    };

    // Leading `NAME:` declares a label at the current flat index. The rest
    // of the line, if any, is parsed as a normal instruction.
    if first.kind == TokenKind::Label {
        let name = src[first.span.as_range()]
            .trim_end_matches(':')
            .to_ascii_uppercase();
        program.insert_label(name, program.len());
        first = match toks.next() {
            Some(tok) => tok,
            None => return Ok(()),
        };
    }

    let mnemonic = &src[first.span.as_range()];
    let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AssemblyFault::InvalidOpcode {
        mnemonic: mnemonic.to_string(),
        block,
        line,
    })?;

    let operand = match toks.next() {
        Some(tok) => {
            let raw = &src[tok.span.as_range()];
            Some(decode_operand(raw).ok_or(AssemblyFault::MalformedOperand { block, line })?)
        }
        None => None,
    };

    let flat_index = program.len();
    program.push(Instruction {
        opcode,
        operand,
        block,
        line,
        flat_index,
        jump_target: None,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operand;

    fn blocks(texts: &[&str]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|text| text.lines().map(String::from).collect())
            .collect()
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn entry_labels_at_cumulative_indices() {
        let program = assemble(
            &labels(&["POWER_ON", "SET_VOLUME", "DATA_CHECK"]),
            &blocks(&[
                "LDA #$01\nSTA $C400",
                "LDA #$80\nSTA $C401\nSTA $C402",
                "JMP DATA_CHECK",
            ]),
        )
        .unwrap();
        assert_eq!(program.label_index("POWER_ON"), Some(0));
        assert_eq!(program.label_index("SET_VOLUME"), Some(2));
        assert_eq!(program.label_index("DATA_CHECK"), Some(5));
        assert_eq!(program.len(), 6);
    }

    #[test]
    fn empty_block_registers_entry_at_next_index() {
        let program = assemble(
            &labels(&["A", "B", "C"]),
            &blocks(&["NOP", "", "NOP"]),
        )
        .unwrap();
        assert_eq!(program.label_index("A"), Some(0));
        assert_eq!(program.label_index("B"), Some(1));
        assert_eq!(program.label_index("C"), Some(1));
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let program = assemble(
            &labels(&["MAIN"]),
            &blocks(&["; driver entry\n\nNOP ; spin\n   \nNOP"]),
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        // Line numbers refer to the original text, not the compacted list.
        assert_eq!(program.get(0).unwrap().line, 3);
        assert_eq!(program.get(1).unwrap().line, 5);
    }

    #[test]
    fn explicit_label_points_at_next_instruction() {
        let program = assemble(
            &labels(&["MAIN"]),
            &blocks(&["NOP\nWAIT:\nLDA $C403\nBNE WAIT"]),
        )
        .unwrap();
        assert_eq!(program.label_index("WAIT"), Some(1));
        assert_eq!(program.get(2).unwrap().jump_target, Some(1));
    }

    #[test]
    fn label_and_instruction_may_share_a_line() {
        let program = assemble(&labels(&["MAIN"]), &blocks(&["LOOP: JMP loop"])).unwrap();
        assert_eq!(program.label_index("LOOP"), Some(0));
        assert_eq!(program.get(0).unwrap().jump_target, Some(0));
    }

    #[test]
    fn labels_are_case_insensitive() {
        let program = assemble(&labels(&["Main"]), &blocks(&["jmp MAIN"])).unwrap();
        assert_eq!(program.get(0).unwrap().jump_target, Some(0));
    }

    #[test]
    fn unknown_mnemonic_faults() {
        let err = assemble(&labels(&["MAIN"]), &blocks(&["NOP\nHCF #$01"])).unwrap_err();
        assert_eq!(
            err,
            AssemblyFault::InvalidOpcode {
                mnemonic: "HCF".into(),
                block: 0,
                line: 2,
            }
        );
    }

    #[test]
    fn malformed_operand_faults() {
        let err = assemble(&labels(&["MAIN"]), &blocks(&["LDA #$GG"])).unwrap_err();
        assert_eq!(err, AssemblyFault::MalformedOperand { block: 0, line: 1 });
    }

    #[test]
    fn undefined_jump_target_faults() {
        let err = assemble(
            &labels(&["MAIN"]),
            &blocks(&["NOP\nJMP UNDEFINED_LABEL"]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            AssemblyFault::UnresolvedLabel {
                label: "UNDEFINED_LABEL".into(),
                block: 0,
                line: 2,
            }
        );
    }

    #[test]
    fn operands_decode_during_assembly() {
        let program = assemble(
            &labels(&["MAIN"]),
            &blocks(&["LDA #$2A\nSTA $C400"]),
        )
        .unwrap();
        assert_eq!(
            program.get(0).unwrap().operand,
            Some(Operand::Immediate(0x2A))
        );
        assert_eq!(
            program.get(1).unwrap().operand,
            Some(Operand::Absolute(0xC400))
        );
    }

    #[test]
    fn reassembly_is_idempotent() {
        let entry = labels(&["POWER_ON", "DATA_CHECK"]);
        let src = blocks(&["LDA #$01\nSTA $C400", "LDA $C403\nCMP #$01\nBNE DATA_CHECK"]);
        let first = assemble(&entry, &src).unwrap();
        let second = assemble(&entry, &src).unwrap();
        assert_eq!(first, second);
    }
}
