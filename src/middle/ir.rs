//! The IR: an ordered, append-only sequence of instructions for an
//! ARM-like register machine. Labels are line numbers into this same
//! sequence, resolved by back-patching once the target is known
//! (see [`crate::middle::lower`]).

use derive_more::Display;

use crate::common::{Line, Register};

/// Opcodes the emitter ([`crate::middle::eval`]) and statement driver
/// ([`crate::middle::lower`]) can produce.
///
/// `PUSH`/`POP` are not part of the original opcode groups (data movement,
/// arithmetic, bitwise, comparison, branching); they are added to realize
/// the stack discipline the call/return protocol needs at the IR level —
/// see the "Resolved ambiguity" note in `SPEC_FULL.md`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Opcode {
    #[display("MOV")]
    Mov,
    #[display("MOVZ")]
    Movz,
    #[display("ADD")]
    Add,
    #[display("SUB")]
    Sub,
    #[display("MUL")]
    Mul,
    #[display("NEG")]
    Neg,
    #[display("MVN")]
    Mvn,
    #[display("AND")]
    And,
    #[display("ORR")]
    Orr,
    #[display("EOR")]
    Eor,
    #[display("CMP")]
    Cmp,
    #[display("B")]
    B,
    #[display("BCOND")]
    BCond,
    #[display("BR")]
    Br,
    #[display("PUSH")]
    Push,
    #[display("POP")]
    Pop,
}

/// The condition codes `BCOND` branches on, and their negations (used when
/// control flow needs "branch if the guard is false").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum BranchConditional {
    #[display("EQ")]
    Eq,
    #[display("NE")]
    Ne,
    #[display("LT")]
    Lt,
    #[display("LE")]
    Le,
    #[display("GT")]
    Gt,
    #[display("GE")]
    Ge,
}

impl BranchConditional {
    /// The condition under which the guard being false takes the branch.
    pub fn negate(self) -> BranchConditional {
        use BranchConditional::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Ge => Lt,
            Le => Gt,
            Gt => Le,
        }
    }

    /// `BCOND`'s `dest` operand carries the condition as an immediate (the
    /// operand-kind set is closed to `{Reg, Imm, Label, Unused}`, so there is
    /// no dedicated "condition" slot).
    fn encode(self) -> i64 {
        use BranchConditional::*;
        match self {
            Eq => 0,
            Ne => 1,
            Lt => 2,
            Le => 3,
            Gt => 4,
            Ge => 5,
        }
    }

    fn decode(value: i64) -> Option<BranchConditional> {
        use BranchConditional::*;
        match value {
            0 => Some(Eq),
            1 => Some(Ne),
            2 => Some(Lt),
            3 => Some(Le),
            4 => Some(Gt),
            5 => Some(Ge),
            _ => None,
        }
    }
}

/// Tag distinguishing what an [`Operand`]'s integer payload means.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandKind {
    /// A register index in `0..NUM_REGISTERS`.
    Reg,
    /// A signed 64-bit immediate.
    Imm,
    /// A line number into the enclosing [`Program`].
    Label,
    /// The opcode does not read this slot.
    Unused,
}

/// A tagged operand slot. `create_instruction` stamps every slot `Unused`
/// with its raw value already populated; lowering code then upgrades
/// `kind` to `Reg`/`Imm`/`Label` once it knows what the value means.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Operand {
    pub kind: OperandKind,
    pub value: i64,
}

impl Operand {
    fn unused(value: i64) -> Operand {
        Operand {
            kind: OperandKind::Unused,
            value,
        }
    }

    pub fn reg(r: Register) -> Operand {
        Operand {
            kind: OperandKind::Reg,
            value: r as i64,
        }
    }

    pub fn imm(v: i64) -> Operand {
        Operand {
            kind: OperandKind::Imm,
            value: v,
        }
    }

    pub fn label(line: Line) -> Operand {
        Operand {
            kind: OperandKind::Label,
            value: line as i64,
        }
    }

    /// A `BCOND`'s condition code, encoded as an immediate in `dest`.
    pub fn cond(cond: BranchConditional) -> Operand {
        Operand {
            kind: OperandKind::Imm,
            value: cond.encode(),
        }
    }

    pub fn none() -> Operand {
        Operand::unused(0)
    }

    pub fn as_register(&self) -> Option<Register> {
        (self.kind == OperandKind::Reg).then_some(self.value as Register)
    }

    pub fn as_label(&self) -> Option<Line> {
        (self.kind == OperandKind::Label).then_some(self.value as Line)
    }

    pub fn as_cond(&self) -> Option<BranchConditional> {
        (self.kind == OperandKind::Imm)
            .then(|| BranchConditional::decode(self.value))
            .flatten()
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            OperandKind::Reg => write!(f, "r{}", self.value),
            OperandKind::Imm => write!(f, "#{}", self.value),
            OperandKind::Label => write!(f, "L{}", self.value),
            OperandKind::Unused => write!(f, "_"),
        }
    }
}

/// A single IR instruction. Any slot an opcode does not use stays `Unused`.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Operand,
    pub src1: Operand,
    pub src2: Operand,
    pub src3: Operand,
    pub line: Line,
}

/// Allocate an instruction with the given raw operand values, all tagged
/// `Unused`. Callers assign `dest.kind`/`src1.kind`/etc. afterward.
pub fn create_instruction(
    opcode: Opcode,
    dest: i64,
    src1: i64,
    src2: i64,
    src3: i64,
    line: &Line,
) -> Instruction {
    Instruction {
        opcode,
        dest: Operand::unused(dest),
        src1: Operand::unused(src1),
        src2: Operand::unused(src2),
        src3: Operand::unused(src3),
        line: *line,
    }
}

/// An ordered, append-only sequence of instructions, addressable by
/// zero-based line number. Indices are stable once inserted.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn new() -> Program {
        Program { instructions: vec![] }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Append `instr` to `program` and advance the shared line counter by
/// `counter_delta` (normally 1; a caller passes more when a lowering step
/// synthesizes a statically known run of instructions, preserving label
/// arithmetic inside nested loops — see `For` in [`crate::middle::lower`]).
/// Returns the index of the inserted instruction.
pub fn insert(program: &mut Program, instr: Instruction, line: &mut Line, counter_delta: usize) -> usize {
    let index = program.instructions.len();
    program.instructions.push(instr);
    *line += counter_delta;
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_advances_line_counter_by_delta() {
        let mut program = Program::new();
        let mut line: Line = 0;
        let instr = create_instruction(Opcode::Movz, 31, 64, 0, 0, &line);
        insert(&mut program, instr, &mut line, 1);
        assert_eq!(line, 1);
        assert_eq!(program.len(), 1);

        let instr2 = create_instruction(Opcode::Add, 0, 0, 1, 0, &line);
        insert(&mut program, instr2, &mut line, 3);
        assert_eq!(line, 4);
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn negate_is_involutive() {
        use BranchConditional::*;
        for cond in [Eq, Ne, Lt, Le, Gt, Ge] {
            assert_eq!(cond.negate().negate(), cond);
        }
    }

    #[test]
    fn negate_map_matches_spec() {
        use BranchConditional::*;
        assert_eq!(Eq.negate(), Ne);
        assert_eq!(Lt.negate(), Ge);
        assert_eq!(Le.negate(), Gt);
        assert_eq!(Gt.negate(), Le);
        assert_eq!(Ge.negate(), Lt);
    }

    #[test]
    fn operand_kind_upgrades_after_creation() {
        let line = 0;
        let mut instr = create_instruction(Opcode::Mov, 3, 7, 0, 0, &line);
        assert_eq!(instr.dest.kind, OperandKind::Unused);
        instr.dest.kind = OperandKind::Reg;
        instr.src1.kind = OperandKind::Reg;
        assert_eq!(instr.dest.as_register(), Some(3));
        assert_eq!(instr.src1.as_register(), Some(7));
    }
}
