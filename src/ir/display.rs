//! Displaying IR in the text format accepted by `parse_function`.

use super::{Const, Element, Expr, FunctionBody, Operand, Stmt};

use std::fmt::{Display, Formatter, Result as FmtResult};

pub struct FunctionBodyDisplay<'a>(pub(crate) &'a FunctionBody, pub(crate) &'a str);

impl<'a> Display for FunctionBodyDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let body = self.0;
        writeln!(f, "{}function {}", self.1, body.name)?;
        for decl in body.vars.values() {
            writeln!(f, "{}var {}: {}", self.1, decl.name, decl.ty)?;
        }

        // The text format takes the first block as entry, so print it
        // first and everything else in index order.
        let order = std::iter::once(body.entry)
            .chain(body.blocks.iter().filter(|&block| block != body.entry));
        for block in order {
            let def = &body.blocks[block];
            writeln!(f, "{}{}:", self.1, body.block_label(block))?;
            for element in &def.elements {
                writeln!(f, "{}    {}", self.1, ElementDisplay(element, body))?;
            }
            if !def.succs.is_empty() {
                let succs = def
                    .succs
                    .iter()
                    .map(|&succ| body.block_label(succ))
                    .collect::<Vec<_>>();
                writeln!(f, "{}    goto {}", self.1, succs.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Displays one element, naming variables through the owning body.
pub struct ElementDisplay<'a>(pub &'a Element, pub &'a FunctionBody);

impl<'a> Display for ElementDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let body = self.1;
        match self.0 {
            Element::Statement(stmt) => match stmt {
                Stmt::Assign { dst, src } => write!(
                    f,
                    "{} = {}",
                    body.var_name(*dst),
                    ExprDisplay(src, body)
                ),
                Stmt::Eval(expr) => write!(f, "eval {}", ExprDisplay(expr, body)),
                Stmt::Branch(cond) => write!(f, "branch {}", OperandDisplay(cond, body)),
                Stmt::Return(None) => write!(f, "return"),
                Stmt::Return(Some(value)) => {
                    write!(f, "return {}", OperandDisplay(value, body))
                }
            },
            Element::Initializer { var, init } => write!(
                f,
                "init {} = {}",
                body.var_name(*var),
                ExprDisplay(init, body)
            ),
            Element::ScopeEnd(var) => write!(f, "end {}", body.var_name(*var)),
        }
    }
}

pub struct ExprDisplay<'a>(pub &'a Expr, pub &'a FunctionBody);

impl<'a> Display for ExprDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let body = self.1;
        match self.0 {
            Expr::Use(op) => write!(f, "{}", OperandDisplay(op, body)),
            Expr::Binary(op, lhs, rhs) => write!(
                f,
                "{} {} {}",
                OperandDisplay(lhs, body),
                op.symbol(),
                OperandDisplay(rhs, body)
            ),
            Expr::Not(op) => write!(f, "!{}", OperandDisplay(op, body)),
            Expr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| format!("{}", OperandDisplay(arg, body)))
                    .collect::<Vec<_>>();
                write!(f, "call {}({})", callee, args.join(", "))
            }
        }
    }
}

pub struct OperandDisplay<'a>(pub &'a Operand, pub &'a FunctionBody);

impl<'a> Display for OperandDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self.0 {
            Operand::Var(var) => write!(f, "{}", self.1.var_name(*var)),
            Operand::Const(c) => write!(f, "{}", c),
        }
    }
}

impl Display for Const {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Const::I64(value) => write!(f, "{}", value),
            Const::Bool(value) => write!(f, "{}", value),
        }
    }
}
