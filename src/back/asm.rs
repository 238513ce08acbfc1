//! A textual listing of the IR: one line per instruction, `"<line>: <opcode>
//! <operands>"`, labels rendered as the target line number.
//!
//! This is a stand-in for a real assembly emitter, which is out of scope —
//! the IR already names concrete registers and resolved branch targets, so
//! there is no register allocation or ABI lowering left to do here. Unlike
//! the teacher's RISC-V backend, this module performs no instruction
//! selection of its own; it only renders what `middle::lower` already built.

use std::fmt;

use crate::middle::ir::{Instruction, Program};

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operands: Vec<String> = [&self.dest, &self.src1, &self.src2, &self.src3]
            .into_iter()
            .filter(|op| op.kind != crate::middle::ir::OperandKind::Unused)
            .map(|op| op.to_string())
            .collect();
        write!(f, "{}: {}", self.line, self.opcode)?;
        if !operands.is_empty() {
            write!(f, " {}", operands.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instructions {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}

/// Render `program` as its textual listing. A thin wrapper over `Display`
/// kept for symmetry with the CLI's other output modes.
pub fn listing(program: &Program) -> String {
    program.to_string()
}
