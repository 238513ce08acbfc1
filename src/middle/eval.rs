//! The expression evaluator/emitter: lowers an expression to a sequence of
//! IR instructions whose result lands in the returned register.
//!
//! Grounded on `eval.c`'s `evalExpression`, including its call-site
//! lowering for `EXPR_FUNCTION_CALL`.

use crate::common::{Id, Line};
use crate::error::{Error, Result};
use crate::front::ast::{BOp, Expr, UOp};

use super::env::{Environment, MAX_ARGS, X0};
use super::ir::{create_instruction, insert, Opcode, Operand, Program};

/// Lower `expr`, returning the register holding its result.
///
/// - `Name` returns the binding's own register and emits nothing; callers
///   must not free it.
/// - Every other case returns a freshly allocated scratch register, eligible
///   for reuse only once the caller calls [`Environment::free_if_temporary`].
pub fn eval_expression(
    program: &mut Program,
    expr: &Expr,
    env: &mut Environment,
    line: &mut Line,
) -> Result<u8> {
    match expr {
        Expr::Name(name) => env.lookup(*name),

        Expr::Int(value) => {
            let reg = env.fresh_register()?;
            env.reserve(reg);
            let mut instr = create_instruction(Opcode::Mov, reg as i64, *value, 0, 0, line);
            instr.dest = Operand::reg(reg);
            instr.src1 = Operand::imm(*value);
            insert(program, instr, line, 1);
            env.remember(reg, *value);
            Ok(reg)
        }

        Expr::BinOp { op, lhs, rhs } => {
            let left_reg = eval_expression(program, lhs, env, line)?;
            let right_reg = eval_expression(program, rhs, env, line)?;
            let opcode = binop_opcode(*op)?;
            let dest = env.fresh_register()?;
            env.reserve(dest);
            let mut instr =
                create_instruction(opcode, dest as i64, left_reg as i64, right_reg as i64, 0, line);
            instr.dest = Operand::reg(dest);
            instr.src1 = Operand::reg(left_reg);
            instr.src2 = Operand::reg(right_reg);
            insert(program, instr, line, 1);
            env.remember_unknown(dest);
            env.free_if_temporary(left_reg);
            env.free_if_temporary(right_reg);
            Ok(dest)
        }

        Expr::UnaryOp { op, expr } => {
            let src = eval_expression(program, expr, env, line)?;
            let opcode = match op {
                UOp::Neg => Opcode::Neg,
                UOp::Not => Opcode::Mvn,
            };
            let dest = env.fresh_register()?;
            env.reserve(dest);
            let mut instr = create_instruction(opcode, dest as i64, src as i64, 0, 0, line);
            instr.dest = Operand::reg(dest);
            instr.src1 = Operand::reg(src);
            insert(program, instr, line, 1);
            env.remember_unknown(dest);
            env.free_if_temporary(src);
            Ok(dest)
        }

        Expr::Call { name, args } => call(program, *name, args, env, line),
    }
}

fn binop_opcode(op: BOp) -> Result<Opcode> {
    match op {
        BOp::Add => Ok(Opcode::Add),
        BOp::Sub => Ok(Opcode::Sub),
        BOp::Mul => Ok(Opcode::Mul),
        BOp::BitOr => Ok(Opcode::Orr),
        BOp::BitXor => Ok(Opcode::Eor),
        BOp::BitAnd => Ok(Opcode::And),
        other => Err(Error::UnsupportedOperator(format!("{other:?}"))),
    }
}

/// The caller-save calling convention of §4.6: push `SP`, materialize the
/// return line into `SP`, save `X0`, save/bind each argument register in
/// source order, branch to the callee, then restore argument registers in
/// reverse order followed by `X0`.
///
/// The argument registers are reserved for the whole of step 4 before any
/// argument is evaluated, not freed one at a time as each is placed: a
/// scratch allocation for a later argument (or a sub-expression of the same
/// argument) would otherwise be free to reuse an earlier argument's just-set
/// register, clobbering it before the branch. `Stmt::Return`'s `POP RP; BR
/// RP` needs the return address on top of the runtime stack at the moment
/// the callee's body starts executing, so `SP` (now holding `return_line`)
/// is pushed again immediately before the branch — the caller-save/restore
/// pairs around it (`X0`, each argument) are otherwise unaffected and still
/// pop back to their pre-call values once the callee returns.
fn call(program: &mut Program, name: Id, args: &[Expr], env: &mut Environment, line: &mut Line) -> Result<u8> {
    let entry_line = env.find_function(name)?;

    // 1. Save the caller's frame pointer.
    push(program, super::env::SP, env, line);

    // 2. Materialize the return line as the saved return address. The real
    // target — the first line after this whole call sequence, not merely
    // after this MOVZ — isn't known until every argument and the trailing
    // restore pops are emitted, so this is a forward-patched placeholder
    // like `emit_placeholder_b`/`patch_b` in `middle::lower`.
    let mut save_ra = create_instruction(Opcode::Movz, super::env::SP as i64, 0, 0, 0, line);
    save_ra.dest = Operand::reg(super::env::SP);
    save_ra.src1 = Operand::imm(0);
    let save_ra_idx = insert(program, save_ra, line, 1);

    // 3. Caller-save the return-value register.
    push(program, X0, env, line);

    // 4. Arguments, in source order, up to MAX_ARGS - 1. Reserve every
    // argument register up front so evaluating one argument can never pick
    // a register another argument is about to occupy.
    let arg_regs: Vec<u8> = (1..=args.len())
        .take(MAX_ARGS.saturating_sub(1))
        .map(|i| i as u8)
        .collect();
    for &arg_reg in &arg_regs {
        env.reserve(arg_reg);
    }
    for (&arg_reg, arg) in arg_regs.iter().zip(args.iter()) {
        let value_reg = eval_expression(program, arg, env, line)?;
        push(program, arg_reg, env, line);
        let mut mov = create_instruction(Opcode::Mov, arg_reg as i64, value_reg as i64, 0, 0, line);
        mov.dest = Operand::reg(arg_reg);
        mov.src1 = Operand::reg(value_reg);
        insert(program, mov, line, 1);
        if value_reg != arg_reg {
            env.free_if_temporary(value_reg);
        }
    }

    // 4.5. Push the materialized return address (now sitting in `SP`) last,
    // so it is the value the callee's `POP RP` retrieves.
    push(program, super::env::SP, env, line);

    // 5. Branch to the callee.
    let mut branch = create_instruction(Opcode::B, entry_line as i64, 0, 0, 0, line);
    branch.dest = Operand::label(entry_line);
    insert(program, branch, line, 1);

    // 6. Restore argument registers in reverse order, then X0.
    for &arg_reg in arg_regs.iter().rev() {
        pop(program, arg_reg, env, line);
        env.free_if_temporary(arg_reg);
    }
    pop(program, X0, env, line);

    // Patch the return address now that the post-call line is known: this
    // is where the callee's `POP RP; BR RP` must land.
    program.instructions[save_ra_idx].src1 = Operand::imm(*line as i64);

    Ok(X0)
}

pub(crate) fn push(program: &mut Program, reg: u8, env: &mut Environment, line: &mut Line) {
    env.grow_stack();
    let mut instr = create_instruction(Opcode::Push, 0, reg as i64, 0, 0, line);
    instr.src1 = Operand::reg(reg);
    insert(program, instr, line, 1);
}

pub(crate) fn pop(program: &mut Program, reg: u8, env: &mut Environment, line: &mut Line) {
    env.shrink_stack();
    let mut instr = create_instruction(Opcode::Pop, reg as i64, 0, 0, 0, line);
    instr.dest = Operand::reg(reg);
    insert(program, instr, line, 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::OperandKind;

    fn id(s: &str) -> Id {
        Id::new(s.to_string())
    }

    #[test]
    fn integer_literal_emits_single_mov() {
        let mut program = Program::new();
        let mut env = Environment::new();
        let mut line = 0;
        let reg = eval_expression(&mut program, &Expr::Int(5), &mut env, &mut line).unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program.instructions[0].opcode, Opcode::Mov);
        assert_eq!(program.instructions[0].dest.as_register(), Some(reg));
        assert_eq!(env.known_value(reg), Some(5));
    }

    #[test]
    fn name_emits_nothing_and_returns_bound_register() {
        let mut program = Program::new();
        let mut env = Environment::new();
        let r = env.fresh_register().unwrap();
        env.bind(id("x"), r).unwrap();
        let mut line = 0;
        let reg = eval_expression(&mut program, &Expr::Name(id("x")), &mut env, &mut line).unwrap();
        assert_eq!(reg, r);
        assert!(program.is_empty());
    }

    #[test]
    fn binary_op_frees_scratch_operands() {
        let mut program = Program::new();
        let mut env = Environment::new();
        let mut line = 0;
        let expr = Expr::BinOp {
            op: BOp::Add,
            lhs: Box::new(Expr::Int(2)),
            rhs: Box::new(Expr::Int(3)),
        };
        let dest = eval_expression(&mut program, &expr, &mut env, &mut line).unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program.instructions[2].opcode, Opcode::Add);
        // Both literal scratch registers should have been freed, but the
        // destination register must still be in use (nothing reclaims it).
        assert!(env.fresh_register().unwrap() != dest);
    }

    #[test]
    fn division_is_unsupported_by_the_emitter() {
        let mut program = Program::new();
        let mut env = Environment::new();
        let mut line = 0;
        let expr = Expr::BinOp {
            op: BOp::Div,
            lhs: Box::new(Expr::Int(4)),
            rhs: Box::new(Expr::Int(2)),
        };
        assert!(matches!(
            eval_expression(&mut program, &expr, &mut env, &mut line),
            Err(Error::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn call_emits_full_protocol_for_two_args() {
        let mut program = Program::new();
        let mut env = Environment::new();
        env.record_function(id("f"), 42).unwrap();
        let mut line = 10;
        let expr = Expr::Call {
            name: id("f"),
            args: vec![Expr::Int(1), Expr::Int(2)],
        };
        let result = eval_expression(&mut program, &expr, &mut env, &mut line).unwrap();
        assert_eq!(result, X0);

        let opcodes: Vec<_> = program.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::Push,  // save SP
                Opcode::Movz,  // materialize return line
                Opcode::Push,  // save X0
                Opcode::Mov,   // literal 1
                Opcode::Push,  // save arg1
                Opcode::Mov,   // arg1 <- literal
                Opcode::Mov,   // literal 2
                Opcode::Push,  // save arg2
                Opcode::Mov,   // arg2 <- literal
                Opcode::Push,  // save return line
                Opcode::B,     // branch to entry
                Opcode::Pop,   // restore arg2
                Opcode::Pop,   // restore arg1
                Opcode::Pop,   // restore X0
            ]
        );
        let branch = &program.instructions[10];
        assert_eq!(branch.dest.kind, OperandKind::Label);
        assert_eq!(branch.dest.as_label(), Some(42));

        // the MOVZ's patched immediate must be the line right after this
        // whole call sequence (where the caller resumes), not merely the
        // line right after the MOVZ itself — that's the line the callee's
        // `POP RP; BR RP` lands on.
        let save_ra = &program.instructions[1];
        assert_eq!(save_ra.opcode, Opcode::Movz);
        assert_eq!(save_ra.src1.kind, OperandKind::Imm);
        assert_eq!(save_ra.src1.value, line as i64);
        assert_eq!(line, 10 + opcodes.len());
    }

    #[test]
    fn unknown_function_call_fails() {
        let mut program = Program::new();
        let mut env = Environment::new();
        let mut line = 0;
        let expr = Expr::Call {
            name: id("nope"),
            args: vec![],
        };
        assert!(matches!(
            eval_expression(&mut program, &expr, &mut env, &mut line),
            Err(Error::UnknownFunction(_))
        ));
    }
}
