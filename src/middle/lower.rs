//! Statement lowering and the top-level orchestrator.
//!
//! Grounded line-for-line on `ast_to_ir.c`'s `Statements_to_IR` and its
//! per-kind helpers (`AssignmentStmt_to_IR`, `FlowStmt_to_IR`, `IfStmt_to_IR`,
//! `WhileStmt_to_IR`, `ForStmt_to_IR`, `FunctionDef_to_IR`).

use crate::common::{Id, Line};
use crate::error::{Error, Result};
use crate::front::ast::{self, BOp, Expr, Stmt};

use super::env::{Environment, RP, X0};
use super::eval::eval_expression;
use super::ir::{create_instruction, insert, BranchConditional, Opcode, Operand, Program};

fn ret_name() -> Id {
    Id::new("ret".to_string())
}

fn comparator(op: BOp) -> Result<BranchConditional> {
    match op {
        BOp::Eq => Ok(BranchConditional::Eq),
        BOp::Ne => Ok(BranchConditional::Ne),
        BOp::Lt => Ok(BranchConditional::Lt),
        BOp::Le => Ok(BranchConditional::Le),
        BOp::Gt => Ok(BranchConditional::Gt),
        BOp::Ge => Ok(BranchConditional::Ge),
        other => Err(Error::InvalidAst(format!(
            "condition must be a comparison, found {other:?}"
        ))),
    }
}

/// Apply `const_fold` against the live lowering environment when `optimize`
/// is set; otherwise return `expr` unchanged. Folding here (rather than as a
/// separate whole-AST pass before lowering starts) is what lets it actually
/// propagate constants: `Environment::known` only gets populated as
/// assignments are lowered.
fn maybe_fold(expr: &Expr, env: &Environment, optimize: bool) -> Expr {
    if optimize {
        super::optimize::const_fold(expr, env)
    } else {
        expr.clone()
    }
}

/// A guard is `CMP` of two evaluated sub-expressions, lowered via a
/// `BinOp` whose operator is one of the six comparators. Returns the
/// negated condition to branch on when the guard is false, per the
/// negation map EQ↔NE, LT↔GE, LE↔GT, GT↔LE, GE↔LT.
///
/// Only `lhs`/`rhs` are folded here, not the comparison as a whole: folding
/// the whole guard would collapse a statically-decidable comparison (e.g.
/// `5 < 10`) into an `Int`, which has no comparator to negate and branch on.
/// `ast_to_ir.c`'s `IfStmt_to_IR`/`WhileStmt_to_IR` take
/// `condition->binary_op` directly for the same reason, folding only the
/// operands via `evalExpression`.
fn lower_guard(
    program: &mut Program,
    cond: &Expr,
    env: &mut Environment,
    line: &mut Line,
    optimize: bool,
) -> Result<BranchConditional> {
    let Expr::BinOp { op, lhs, rhs } = cond else {
        return Err(Error::InvalidAst(
            "condition must be a binary comparison".to_string(),
        ));
    };
    let negated = comparator(*op)?.negate();
    let folded_lhs = maybe_fold(lhs, env, optimize);
    let folded_rhs = maybe_fold(rhs, env, optimize);
    let l_reg = eval_expression(program, &folded_lhs, env, line)?;
    let r_reg = eval_expression(program, &folded_rhs, env, line)?;
    let mut cmp = create_instruction(Opcode::Cmp, 0, l_reg as i64, r_reg as i64, 0, line);
    cmp.src1 = Operand::reg(l_reg);
    cmp.src2 = Operand::reg(r_reg);
    insert(program, cmp, line, 1);
    env.free_if_temporary(l_reg);
    env.free_if_temporary(r_reg);
    Ok(negated)
}

/// Emit a placeholder `BCOND`, returning its instruction index so the caller
/// can patch the label once the target is known.
fn emit_placeholder_bcond(program: &mut Program, cond: BranchConditional, line: &mut Line) -> usize {
    let mut instr = create_instruction(Opcode::BCond, 0, 0, 0, 0, line);
    instr.dest = Operand::cond(cond);
    instr.src1 = Operand::label(0);
    insert(program, instr, line, 1)
}

/// Emit a placeholder unconditional `B`, returning its instruction index.
fn emit_placeholder_b(program: &mut Program, line: &mut Line) -> usize {
    let instr = create_instruction(Opcode::B, 0, 0, 0, 0, line);
    insert(program, instr, line, 1)
}

fn emit_b(program: &mut Program, target: Line, line: &mut Line) {
    let mut instr = create_instruction(Opcode::B, target as i64, 0, 0, 0, line);
    instr.dest = Operand::label(target);
    insert(program, instr, line, 1);
}

/// Patch a `BCOND`'s label operand (held in `src1`) to `target`.
fn patch_bcond(program: &mut Program, index: usize, target: Line) {
    program.instructions[index].src1 = Operand::label(target);
}

/// Patch a `B`'s label operand (held in `dest`) to `target`.
fn patch_b(program: &mut Program, index: usize, target: Line) {
    program.instructions[index].dest = Operand::label(target);
}

/// Shared by `Stmt::Assign` and `return e`: lower `expr`, move it into
/// `dest`'s register (`X0` for the reserved name `"ret"`, else
/// `lookup_or_bind`), and update constant tracking.
fn lower_assignment(
    program: &mut Program,
    name: Id,
    expr: &Expr,
    env: &mut Environment,
    line: &mut Line,
    optimize: bool,
) -> Result<()> {
    let folded = maybe_fold(expr, env, optimize);
    let value_reg = eval_expression(program, &folded, env, line)?;
    let dest = if name == ret_name() {
        X0
    } else {
        env.lookup_or_bind(name)?
    };
    let mut instr = create_instruction(Opcode::Mov, dest as i64, value_reg as i64, 0, 0, line);
    instr.dest = Operand::reg(dest);
    instr.src1 = Operand::reg(value_reg);
    insert(program, instr, line, 1);
    match env.known_value(value_reg) {
        Some(value) => env.remember(dest, value),
        None => env.remember_unknown(dest),
    }
    env.free_if_temporary(value_reg);
    Ok(())
}

/// Lower a statement block, dispatching by kind. `counter_delta` is an
/// unrolling hint threaded down into nested `For` bodies, carried forward
/// for API fidelity with the original driver; branch targets themselves are
/// always resolved against the exact, globally shared `line` counter, so
/// correctness never depends on its value.
pub fn statements_to_ir(
    program: &mut Program,
    stmts: &[Stmt],
    env: &mut Environment,
    line: &mut Line,
    counter_delta: usize,
    optimize: bool,
) -> Result<()> {
    for stmt in stmts {
        statement_to_ir(program, stmt, env, line, counter_delta, optimize)?;
    }
    Ok(())
}

fn statement_to_ir(
    program: &mut Program,
    stmt: &Stmt,
    env: &mut Environment,
    line: &mut Line,
    counter_delta: usize,
    optimize: bool,
) -> Result<()> {
    match stmt {
        Stmt::Assign(name, expr) => lower_assignment(program, *name, expr, env, line, optimize),

        Stmt::Return(expr) => {
            if let Some(expr) = expr {
                lower_assignment(program, ret_name(), expr, env, line, optimize)?;
            }
            super::eval::pop(program, RP, env, line);
            let mut instr = create_instruction(Opcode::Br, 0, RP as i64, 0, 0, line);
            instr.src1 = Operand::reg(RP);
            insert(program, instr, line, 1);
            Ok(())
        }

        Stmt::If { cond, tt, ff } => {
            let negated = lower_guard(program, cond, env, line, optimize)?;
            let bcond_idx = emit_placeholder_bcond(program, negated, line);
            statements_to_ir(program, tt, env, line, counter_delta, optimize)?;
            let skip_else_idx = emit_placeholder_b(program, line);
            patch_bcond(program, bcond_idx, *line);
            statements_to_ir(program, ff, env, line, counter_delta, optimize)?;
            patch_b(program, skip_else_idx, *line);
            Ok(())
        }

        Stmt::While { cond, body } => {
            let loop_head = *line;
            let negated = lower_guard(program, cond, env, line, optimize)?;
            let exit_idx = emit_placeholder_bcond(program, negated, line);
            statements_to_ir(program, body, env, line, counter_delta, optimize)?;
            emit_b(program, loop_head, line);
            patch_bcond(program, exit_idx, *line);
            Ok(())
        }

        Stmt::For { var, lo, hi, body } => {
            let lo_folded = maybe_fold(lo, env, optimize);
            let hi_folded = maybe_fold(hi, env, optimize);
            let (&Expr::Int(lo_val), &Expr::Int(hi_val)) = (&lo_folded, &hi_folded) else {
                return Err(Error::UnsupportedForRange);
            };

            let v_reg = env.lookup_or_bind(*var)?;
            let mut mov = create_instruction(Opcode::Mov, v_reg as i64, lo_val, 0, 0, line);
            mov.dest = Operand::reg(v_reg);
            mov.src1 = Operand::imm(lo_val);
            insert(program, mov, line, 1);
            env.remember(v_reg, lo_val);

            let loop_head = *line;
            let mut cmp = create_instruction(Opcode::Cmp, 0, v_reg as i64, hi_val, 0, line);
            cmp.src1 = Operand::reg(v_reg);
            cmp.src2 = Operand::imm(hi_val);
            insert(program, cmp, line, 1);

            let exit_idx = emit_placeholder_bcond(program, BranchConditional::Ge, line);

            let expected_iterations = hi_val.saturating_sub(lo_val).max(0) as usize;
            log::trace!("for-loop over '{var}': {expected_iterations} expected iterations");
            statements_to_ir(program, body, env, line, counter_delta + expected_iterations, optimize)?;

            let mut add = create_instruction(Opcode::Add, v_reg as i64, v_reg as i64, 1, 0, line);
            add.dest = Operand::reg(v_reg);
            add.src1 = Operand::reg(v_reg);
            add.src2 = Operand::imm(1);
            insert(program, add, line, 1);
            env.remember_unknown(v_reg);

            emit_b(program, loop_head, line);
            patch_bcond(program, exit_idx, *line);
            Ok(())
        }

        Stmt::FunctionDef { name, params, body } => {
            env.record_function(*name, *line)?;
            let mut callee = env.child();
            for (i, param) in params.iter().enumerate() {
                let arg_reg = (i + 1) as u8;
                callee.bind(*param, arg_reg)?;
            }
            statements_to_ir(program, body, &mut callee, line, counter_delta, optimize)
        }

        Stmt::Break => Err(Error::InvalidAst("break is not supported".to_string())),
        Stmt::Continue => Err(Error::InvalidAst("continue is not supported".to_string())),
    }
}

/// The crate's single entry point: reset the register file, initialize the
/// stack pointer, and drive statement lowering over the whole program.
/// `optimize` enables inline constant propagation/folding (see
/// [`maybe_fold`]) against the live lowering environment as each statement
/// is lowered.
pub fn lower(ast: ast::Program, optimize: bool) -> Result<Program> {
    let mut program = Program::new();
    let mut env = Environment::new();
    let mut line: Line = 0;

    const INITIAL_STACK_SIZE: i64 = 0;
    let mut init_sp = create_instruction(Opcode::Movz, super::env::SP as i64, INITIAL_STACK_SIZE, 0, 0, &line);
    init_sp.dest = Operand::reg(super::env::SP);
    init_sp.src1 = Operand::imm(INITIAL_STACK_SIZE);
    insert(&mut program, init_sp, &mut line, 1);

    statements_to_ir(&mut program, &ast.stmts, &mut env, &mut line, 0, optimize)?;
    Ok(program)
}
