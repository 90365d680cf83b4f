//! Model of the concrete program store, threaded through a dataflow run
//! alongside each analysis's lattice value.
//!
//! The model is flat: every variable declared by the function
//! body lives for the whole body, and a variable either has a known
//! [`Value`] or is unknown. Environments are forked (cloned) when control
//! flow splits and joined when it merges; at a join, values that differ
//! between the incoming environments are handed to a [`ValueMerger`],
//! which is how an analysis customizes merging (strict join or deliberate
//! widening).

use crate::errors::DataflowError;
use crate::ir::{BinaryOp, Block, Const, Element, Expr, FunctionBody, Operand, Type, Var};
use fxhash::FxHashMap;
use std::sync::Arc;

/// A value the environment knows a variable to hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    I64(i64),
    Bool(bool),
    /// Any integer in `lo..=hi`.
    I64Range { lo: i64, hi: i64 },
}

impl From<Const> for Value {
    fn from(c: Const) -> Value {
        match c {
            Const::I64(value) => Value::I64(value),
            Const::Bool(value) => Value::Bool(value),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::I64(value) => write!(f, "{}", value),
            Value::Bool(value) => write!(f, "{}", value),
            Value::I64Range { lo, hi } => write!(f, "{}..={}", lo, hi),
        }
    }
}

/// Decides what a variable holds after a join point when the incoming
/// environments disagree about its value.
pub trait ValueMerger {
    /// Merges `a` and `b`, two distinct values of a variable of type `ty`.
    /// Returning `None` leaves the variable unknown in `merged`.
    fn merge(&self, ty: &Type, a: &Value, b: &Value, merged: &mut Environment) -> Option<Value>;
}

/// Forgets every value the incoming environments disagree on.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictMerger;

impl ValueMerger for StrictMerger {
    fn merge(&self, _: &Type, _: &Value, _: &Value, _: &mut Environment) -> Option<Value> {
        None
    }
}

#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// Declared variable types; shared between all forks of one run.
    decls: Arc<FxHashMap<Var, Type>>,
    values: FxHashMap<Var, Value>,
}

impl Environment {
    /// An environment with no declarations.
    pub fn empty() -> Environment {
        Environment::default()
    }

    /// An environment declaring every variable of `body`, all unknown.
    pub fn new(body: &FunctionBody) -> Environment {
        let decls = body
            .vars
            .entries()
            .map(|(var, decl)| (var, decl.ty.clone()))
            .collect();
        Environment {
            decls: Arc::new(decls),
            values: FxHashMap::default(),
        }
    }

    pub fn declare(&mut self, var: Var, ty: Type) {
        Arc::make_mut(&mut self.decls).insert(var, ty);
    }

    pub fn ty(&self, var: Var) -> Option<&Type> {
        self.decls.get(&var)
    }

    /// Whether values of `ty` can be represented.
    pub fn can_model(ty: &Type) -> bool {
        matches!(ty, Type::I64 | Type::Bool)
    }

    pub fn get(&self, var: Var) -> Option<Value> {
        self.values.get(&var).copied()
    }

    pub fn set(&mut self, var: Var, value: Value) {
        self.values.insert(var, value);
    }

    pub fn clear(&mut self, var: Var) {
        self.values.remove(&var);
    }

    /// Known values, ordered by variable.
    pub fn values(&self) -> Vec<(Var, Value)> {
        let mut values = self
            .values
            .iter()
            .map(|(&var, &value)| (var, value))
            .collect::<Vec<_>>();
        values.sort_by_key(|&(var, _)| var);
        values
    }

    /// A copy of this environment for one side of a control-flow split.
    pub fn fork(&self) -> Environment {
        self.clone()
    }

    /// Whether both environments know exactly the same values.
    pub fn equivalent_to(&self, other: &Environment) -> bool {
        self.values == other.values
    }

    /// Joins two environments reaching the same program point.
    ///
    /// Values both sides agree on are kept. Values that differ are passed
    /// to `merger`; values only one side knows are dropped.
    pub fn join<M: ValueMerger + ?Sized>(&self, other: &Environment, merger: &M) -> Environment {
        let mut merged = Environment {
            decls: self.decls.clone(),
            values: FxHashMap::default(),
        };
        for (var, a) in self.values() {
            let b = match other.values.get(&var) {
                Some(b) => b,
                None => continue,
            };
            if a == *b {
                merged.values.insert(var, a);
                continue;
            }
            let ty = match self.decls.get(&var) {
                Some(ty) => ty.clone(),
                None => continue,
            };
            if let Some(value) = merger.merge(&ty, &a, b, &mut merged) {
                log::trace!("env join: {} merges {} and {} to {}", var, a, b, value);
                merged.values.insert(var, value);
            }
        }
        merged
    }

    /// Checks that every variable `element` mentions is declared with a
    /// type this model can represent.
    pub fn check_element(
        &self,
        block: Block,
        index: usize,
        element: &Element,
    ) -> Result<(), DataflowError> {
        let mut result = Ok(());
        element.visit_vars(|var| {
            if result.is_err() {
                return;
            }
            result = match self.decls.get(&var) {
                None => Err(DataflowError::UnknownVariable { block, index, var }),
                Some(ty) if !Environment::can_model(ty) => Err(DataflowError::UnsupportedType {
                    block,
                    index,
                    var,
                    ty: ty.clone(),
                }),
                Some(_) => Ok(()),
            };
        });
        result
    }

    pub fn eval_operand(&self, op: &Operand) -> Option<Value> {
        match op {
            Operand::Const(c) => Some(Value::from(*c)),
            Operand::Var(var) => self.get(*var),
        }
    }

    /// Evaluates `expr` against the known values. `None` means the result
    /// is unknown.
    pub fn eval(&self, expr: &Expr) -> Option<Value> {
        match expr {
            Expr::Use(op) => self.eval_operand(op),
            Expr::Not(op) => match self.eval_operand(op)? {
                Value::Bool(value) => Some(Value::Bool(!value)),
                _ => None,
            },
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval_operand(lhs)?;
                let rhs = self.eval_operand(rhs)?;
                match (op, lhs, rhs) {
                    (BinaryOp::Add, Value::I64(a), Value::I64(b)) => {
                        a.checked_add(b).map(Value::I64)
                    }
                    (BinaryOp::Sub, Value::I64(a), Value::I64(b)) => {
                        a.checked_sub(b).map(Value::I64)
                    }
                    (BinaryOp::Mul, Value::I64(a), Value::I64(b)) => {
                        a.checked_mul(b).map(Value::I64)
                    }
                    (BinaryOp::Lt, Value::I64(a), Value::I64(b)) => Some(Value::Bool(a < b)),
                    (BinaryOp::Eq, Value::I64(a), Value::I64(b)) => Some(Value::Bool(a == b)),
                    (BinaryOp::Eq, Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(a == b)),
                    (BinaryOp::Ne, Value::I64(a), Value::I64(b)) => Some(Value::Bool(a != b)),
                    (BinaryOp::Ne, Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(a != b)),
                    (BinaryOp::And, Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(a && b)),
                    (BinaryOp::Or, Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(a || b)),
                    _ => None,
                }
            }
            Expr::Call { .. } => None,
        }
    }

    /// The framework's own transfer function: records the effect of
    /// assignments, initializers and scope ends on the store.
    pub fn apply_builtin(&mut self, element: &Element) {
        match element {
            Element::ScopeEnd(var) => self.clear(*var),
            _ => {
                let (var, src) = match element {
                    Element::Statement(crate::ir::Stmt::Assign { dst, src }) => (*dst, src),
                    Element::Initializer { var, init } => (*var, init),
                    _ => return,
                };
                match self.eval(src) {
                    Some(value) => self.set(var, value),
                    None => self.clear(var),
                }
            }
        }
    }

    pub fn display<'a>(&'a self, body: &'a FunctionBody) -> EnvironmentDisplay<'a> {
        EnvironmentDisplay(self, body)
    }
}

pub struct EnvironmentDisplay<'a>(&'a Environment, &'a FunctionBody);

impl<'a> std::fmt::Display for EnvironmentDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let values = self
            .0
            .values()
            .into_iter()
            .map(|(var, value)| format!("{} = {}", self.1.var_name(var), value))
            .collect::<Vec<_>>();
        write!(f, "{{{}}}", values.join(", "))
    }
}
