//! Constant propagation and constant folding.
//!
//! Grounded on `optimise_ir.c`'s `propagate_constants`/`evaluate_int_binary_op`,
//! but reshaped into `Expr -> Expr` functions returning freshly owned trees
//! rather than mutating AST nodes in place: the original walks a node,
//! overwrites it with a folded literal, and frees the now-orphaned subtree by
//! hand, which is exactly the pattern that double-frees when the same
//! subexpression is reachable from two parents. Applicative rewriting makes
//! that class of bug unrepresentable.

use crate::front::ast::{BOp, Expr, UOp};
use crate::middle::env::Environment;

/// Replace every `Name` whose register holds a statically known value (per
/// [`Environment::known_value`]) with the literal `Int` it resolves to.
/// Unresolvable or unbound names are left untouched.
pub fn const_prop(expr: &Expr, env: &Environment) -> Expr {
    match expr {
        Expr::Name(name) => match env.lookup(*name) {
            Ok(reg) => match env.known_value(reg) {
                Some(value) => Expr::Int(value),
                None => expr.clone(),
            },
            Err(_) => expr.clone(),
        },

        Expr::Int(value) => Expr::Int(*value),

        Expr::BinOp { op, lhs, rhs } => Expr::BinOp {
            op: *op,
            lhs: Box::new(const_prop(lhs, env)),
            rhs: Box::new(const_prop(rhs, env)),
        },

        Expr::UnaryOp { op, expr } => Expr::UnaryOp {
            op: *op,
            expr: Box::new(const_prop(expr, env)),
        },

        Expr::Call { name, args } => Expr::Call {
            name: *name,
            args: args.iter().map(|a| const_prop(a, env)).collect(),
        },
    }
}

/// Propagate known values, then fold constant subexpressions bottom-up.
///
/// Arithmetic folds under 64-bit two's-complement wraparound. Division and
/// modulo by a folded zero are left unfolded (the emitter still lowers them,
/// and then rejects them as unsupported — see
/// [`crate::error::Error::UnsupportedOperator`]). Comparisons fold to `1`/`0`;
/// `&&`/`||` fold by C-style truthiness (nonzero is true) without
/// short-circuiting, since both operands are already folded by the time the
/// operator is considered. Shift distances outside `[0, 63]` are left
/// unfolded, matching the "undefined, need not be folded" note in
/// `SPEC_FULL.md`.
pub fn const_fold(expr: &Expr, env: &Environment) -> Expr {
    fold(&const_prop(expr, env))
}

fn fold(expr: &Expr) -> Expr {
    match expr {
        Expr::Name(name) => Expr::Name(*name),
        Expr::Int(value) => Expr::Int(*value),

        Expr::BinOp { op, lhs, rhs } => {
            let lhs = fold(lhs);
            let rhs = fold(rhs);
            if let (Expr::Int(l), Expr::Int(r)) = (&lhs, &rhs) {
                if let Some(value) = eval_binop(*op, *l, *r) {
                    return Expr::Int(value);
                }
            }
            Expr::BinOp {
                op: *op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        }

        Expr::UnaryOp { op, expr } => {
            let inner = fold(expr);
            if let Expr::Int(v) = inner {
                return Expr::Int(eval_unop(*op, v));
            }
            Expr::UnaryOp {
                op: *op,
                expr: Box::new(inner),
            }
        }

        Expr::Call { name, args } => Expr::Call {
            name: *name,
            args: args.iter().map(fold).collect(),
        },
    }
}

fn eval_binop(op: BOp, l: i64, r: i64) -> Option<i64> {
    use BOp::*;
    Some(match op {
        Add => l.wrapping_add(r),
        Sub => l.wrapping_sub(r),
        Mul => l.wrapping_mul(r),
        BitOr => l | r,
        BitXor => l ^ r,
        BitAnd => l & r,
        Shl => {
            if (0..=63).contains(&r) {
                l.wrapping_shl(r as u32)
            } else {
                return None;
            }
        }
        Shr => {
            if (0..=63).contains(&r) {
                l.wrapping_shr(r as u32)
            } else {
                return None;
            }
        }
        Div => {
            if r != 0 {
                l.wrapping_div(r)
            } else {
                return None;
            }
        }
        Mod => {
            if r != 0 {
                l.wrapping_rem(r)
            } else {
                return None;
            }
        }
        Lt => (l < r) as i64,
        Gt => (l > r) as i64,
        Eq => (l == r) as i64,
        Ne => (l != r) as i64,
        Le => (l <= r) as i64,
        Ge => (l >= r) as i64,
        LogAnd => ((l != 0) && (r != 0)) as i64,
        LogOr => ((l != 0) || (r != 0)) as i64,
    })
}

fn eval_unop(op: UOp, v: i64) -> i64 {
    match op {
        UOp::Neg => v.wrapping_neg(),
        UOp::Not => !v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Id;

    fn id(s: &str) -> Id {
        Id::new(s.to_string())
    }

    fn bin(op: BOp, l: Expr, r: Expr) -> Expr {
        Expr::BinOp {
            op,
            lhs: Box::new(l),
            rhs: Box::new(r),
        }
    }

    #[test]
    fn propagates_known_name_to_literal() {
        let mut env = Environment::new();
        let reg = env.fresh_register().unwrap();
        env.bind(id("x"), reg).unwrap();
        env.remember(reg, 7);

        let result = const_prop(&Expr::Name(id("x")), &env);
        assert_eq!(result, Expr::Int(7));
    }

    #[test]
    fn leaves_unknown_name_untouched() {
        let mut env = Environment::new();
        let reg = env.fresh_register().unwrap();
        env.bind(id("x"), reg).unwrap();
        env.remember_unknown(reg);

        let result = const_prop(&Expr::Name(id("x")), &env);
        assert_eq!(result, Expr::Name(id("x")));
    }

    #[test]
    fn folds_nested_arithmetic() {
        let env = Environment::new();
        // (2 + 3) * 4
        let expr = bin(BOp::Mul, bin(BOp::Add, Expr::Int(2), Expr::Int(3)), Expr::Int(4));
        assert_eq!(const_fold(&expr, &env), Expr::Int(20));
    }

    #[test]
    fn folding_twice_matches_folding_once() {
        let env = Environment::new();
        // A mix of foldable and not-yet-foldable shape: (2 + 3) * 4, plus a
        // div-by-zero subtree that const_fold deliberately leaves unfolded.
        let expr = bin(
            BOp::Add,
            bin(BOp::Mul, bin(BOp::Add, Expr::Int(2), Expr::Int(3)), Expr::Int(4)),
            bin(BOp::Div, Expr::Int(1), Expr::Int(0)),
        );
        let once = const_fold(&expr, &env);
        let twice = const_fold(&once, &env);
        assert_eq!(once, twice);
    }

    #[test]
    fn division_by_folded_zero_is_left_unfolded() {
        let env = Environment::new();
        let expr = bin(BOp::Div, Expr::Int(10), Expr::Int(0));
        let result = const_fold(&expr, &env);
        assert_eq!(result, expr);
    }

    #[test]
    fn comparisons_fold_to_one_or_zero() {
        let env = Environment::new();
        assert_eq!(const_fold(&bin(BOp::Lt, Expr::Int(1), Expr::Int(2)), &env), Expr::Int(1));
        assert_eq!(const_fold(&bin(BOp::Gt, Expr::Int(1), Expr::Int(2)), &env), Expr::Int(0));
    }

    #[test]
    fn logical_and_or_use_c_style_truthiness() {
        let env = Environment::new();
        assert_eq!(
            const_fold(&bin(BOp::LogAnd, Expr::Int(5), Expr::Int(0)), &env),
            Expr::Int(0)
        );
        assert_eq!(
            const_fold(&bin(BOp::LogOr, Expr::Int(0), Expr::Int(3)), &env),
            Expr::Int(1)
        );
    }

    #[test]
    fn shift_outside_range_is_left_unfolded() {
        let env = Environment::new();
        let expr = bin(BOp::Shl, Expr::Int(1), Expr::Int(64));
        assert_eq!(const_fold(&expr, &env), expr);
    }

    #[test]
    fn unary_negation_and_bitwise_not_fold() {
        let env = Environment::new();
        let neg = Expr::UnaryOp {
            op: UOp::Neg,
            expr: Box::new(Expr::Int(5)),
        };
        assert_eq!(const_fold(&neg, &env), Expr::Int(-5));

        let not = Expr::UnaryOp {
            op: UOp::Not,
            expr: Box::new(Expr::Int(0)),
        };
        assert_eq!(const_fold(&not, &env), Expr::Int(-1));
    }

    #[test]
    fn propagation_reaches_into_call_arguments() {
        let mut env = Environment::new();
        let reg = env.fresh_register().unwrap();
        env.bind(id("x"), reg).unwrap();
        env.remember(reg, 9);

        let expr = Expr::Call {
            name: id("f"),
            args: vec![Expr::Name(id("x")), Expr::Int(1)],
        };
        let result = const_fold(&expr, &env);
        assert_eq!(
            result,
            Expr::Call {
                name: id("f"),
                args: vec![Expr::Int(9), Expr::Int(1)],
            }
        );
    }
}
