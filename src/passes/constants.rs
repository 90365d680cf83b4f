//! Constant propagation over `i64` variables.
//!
//! The lattice maps each variable to a flat constant. Assignments are
//! handled by the statement-level hook; initializers and scope ends,
//! which are not statements, by the element-level hook. At join points
//! the environment keeps the hull of two differing integers as a range
//! instead of forgetting them.

use crate::env::{Environment, Value};
use crate::ir::{BinaryOp, Element, Expr, Operand, Stmt, Type, Var};
use crate::pass::{DataflowAnalysis, Flat, MapLattice, TransferKinds};

pub type Constants = MapLattice<Var, Flat<i64>>;

#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantPropagation;

impl ConstantPropagation {
    fn operand(op: &Operand, constants: &Constants) -> Flat<i64> {
        match op {
            Operand::Const(crate::ir::Const::I64(value)) => Flat::Value(*value),
            Operand::Const(_) => Flat::Top,
            Operand::Var(var) => constants.get(var).cloned().unwrap_or(Flat::Bottom),
        }
    }

    /// Evaluates `expr` over the constants known so far.
    pub fn eval(expr: &Expr, constants: &Constants) -> Flat<i64> {
        let (op, lhs, rhs) = match expr {
            Expr::Use(op) => return Self::operand(op, constants),
            Expr::Binary(op, lhs, rhs) => (
                *op,
                Self::operand(lhs, constants),
                Self::operand(rhs, constants),
            ),
            Expr::Not(_) | Expr::Call { .. } => return Flat::Top,
        };
        let (lhs, rhs) = match (lhs, rhs) {
            (Flat::Value(lhs), Flat::Value(rhs)) => (lhs, rhs),
            (Flat::Bottom, _) | (_, Flat::Bottom) => return Flat::Bottom,
            _ => return Flat::Top,
        };
        let result = match op {
            BinaryOp::Add => lhs.checked_add(rhs),
            BinaryOp::Sub => lhs.checked_sub(rhs),
            BinaryOp::Mul => lhs.checked_mul(rhs),
            _ => None,
        };
        result.map_or(Flat::Top, Flat::Value)
    }

    fn define(var: Var, src: &Expr, constants: &mut Constants, env: &Environment) {
        if env.ty(var) == Some(&Type::I64) {
            let value = Self::eval(src, constants);
            constants.insert(var, value);
        }
    }
}

impl DataflowAnalysis for ConstantPropagation {
    type Lattice = Constants;

    fn transfer_kinds(&self) -> TransferKinds {
        TransferKinds::BOTH
    }

    fn transfer_element(
        &self,
        element: &Element,
        constants: &mut Constants,
        env: &mut Environment,
    ) {
        match element {
            Element::Initializer { var, init } => Self::define(*var, init, constants, env),
            Element::ScopeEnd(var) => {
                constants.remove(var);
            }
            Element::Statement(_) => {}
        }
    }

    fn transfer_stmt(&self, stmt: &Stmt, constants: &mut Constants, env: &mut Environment) {
        if let Stmt::Assign { dst, src } = stmt {
            Self::define(*dst, src, constants, env);
        }
    }

    fn merge(&self, ty: &Type, a: &Value, b: &Value, _: &mut Environment) -> Option<Value> {
        if *ty != Type::I64 {
            return None;
        }
        let bounds = |value: &Value| match *value {
            Value::I64(value) => Some((value, value)),
            Value::I64Range { lo, hi } => Some((lo, hi)),
            Value::Bool(_) => None,
        };
        let (alo, ahi) = bounds(a)?;
        let (blo, bhi) = bounds(b)?;
        Some(Value::I64Range {
            lo: alo.min(blo),
            hi: ahi.max(bhi),
        })
    }
}
