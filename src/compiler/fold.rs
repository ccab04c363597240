//! Constant folding for arithmetic on two numeric literals.

use crate::ast::{BinOp, Expr, UnOp};

/// Mathematical modulo over floats, sign of the divisor. Shared by the
/// folder here and the VM's `MOD` opcode so compile-time and run-time
/// results never diverge.
pub fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn fold_binop(op: BinOp, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => float_mod(a, b),
        BinOp::Pow => a.powf(b),
        _ => return None,
    })
}

/// Attempts to fold `expr` into a literal in place. Recurses into operand
/// subtrees first so nested constant arithmetic collapses bottom-up.
pub fn fold(expr: &mut Expr) {
    match expr {
        Expr::Unary { op: UnOp::Neg, operand, .. } => {
            fold(operand);
            if let Expr::Number(n) = **operand {
                *expr = Expr::Number(-n);
            }
        }
        Expr::Unary { operand, .. } => fold(operand),
        Expr::Binary { op, lhs, rhs, .. } => {
            fold(lhs);
            fold(rhs);
            if let (Expr::Number(a), Expr::Number(b)) = (&**lhs, &**rhs) {
                if let Some(result) = fold_binop(*op, *a, *b) {
                    *expr = Expr::Number(result);
                }
            }
        }
        Expr::And { lhs, rhs } | Expr::Or { lhs, rhs } => {
            fold(lhs);
            fold(rhs);
        }
        Expr::Index { object, key, .. } => {
            fold(object);
            fold(key);
        }
        Expr::Field { object, .. } => fold(object),
        Expr::Call { callee, args, .. } => {
            fold(callee);
            args.iter_mut().for_each(fold);
        }
        Expr::MethodCall { object, args, .. } => {
            fold(object);
            args.iter_mut().for_each(fold);
        }
        Expr::TableConstructor { array_items, keyed_items, .. } => {
            array_items.iter_mut().for_each(fold);
            for (k, v) in keyed_items.iter_mut() {
                fold(k);
                fold(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_nested_arithmetic() {
        let mut e = Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Number(2.0)),
            rhs: Box::new(Expr::Binary {
                op: BinOp::Mul,
                lhs: Box::new(Expr::Number(3.0)),
                rhs: Box::new(Expr::Number(4.0)),
                line: 1,
            }),
            line: 1,
        };
        fold(&mut e);
        assert!(matches!(e, Expr::Number(n) if n == 14.0));
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert_eq!(float_mod(-5.0, 3.0), 1.0);
        assert_eq!(float_mod(5.0, -3.0), -1.0);
    }

    #[test]
    fn division_by_zero_is_not_folded_to_an_error() {
        let mut e = Expr::Binary {
            op: BinOp::Div,
            lhs: Box::new(Expr::Number(1.0)),
            rhs: Box::new(Expr::Number(0.0)),
            line: 1,
        };
        fold(&mut e);
        assert!(matches!(e, Expr::Number(n) if n.is_infinite()));
    }
}
