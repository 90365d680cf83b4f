//! Parser for the line-oriented text format.
//!
//! ```plain
//! function diamond
//! var x: i64
//! var c: bool
//! entry:
//!     branch c
//!     goto then, else
//! then:
//!     x = 1
//!     goto join
//! else:
//!     goto join
//! join:
//!     return x
//! ```
//!
//! The first labeled block is the entry block. `#` starts a comment.

use super::{BinaryOp, Block, Const, Element, Expr, FunctionBody, Operand, Stmt, Type};
use anyhow::{anyhow, bail, Result};
use fxhash::FxHashMap;

/// Parses one function body from its text form.
pub fn parse_function(text: &str) -> Result<FunctionBody> {
    let lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, strip_comment(line).trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect::<Vec<_>>();

    let mut body = FunctionBody::new("anonymous");
    let mut labels: FxHashMap<&str, Block> = FxHashMap::default();

    // First pass: the header, declarations and block labels, so that
    // statements and `goto`s may refer forward. The header ends at the
    // first label; after it every unlabeled line is a statement.
    for &(lineno, line) in &lines {
        if let Some(label) = parse_label(line) {
            if labels.contains_key(label) {
                bail!("line {}: block `{}` defined twice", lineno, label);
            }
            let block = if labels.is_empty() {
                body.entry
            } else {
                body.add_block()
            };
            body.blocks[block].label = Some(label.to_owned());
            labels.insert(label, block);
        } else if !labels.is_empty() {
            continue;
        } else if let Some(name) = line.strip_prefix("function ") {
            body.name = name.trim().to_owned();
        } else if let Some(decl) = line.strip_prefix("var ") {
            let (name, ty) = parse_decl(decl).map_err(|e| anyhow!("line {}: {}", lineno, e))?;
            if body.var_named(name).is_some() {
                bail!("line {}: variable `{}` declared twice", lineno, name);
            }
            body.add_var(name, ty);
        } else {
            bail!("line {}: statement outside of a block", lineno);
        }
    }
    if labels.is_empty() {
        bail!("function `{}` has no blocks", body.name);
    }

    // Second pass: block contents.
    let mut current: Option<Block> = None;
    for &(lineno, line) in &lines {
        if let Some(label) = parse_label(line) {
            current = Some(labels[label]);
            continue;
        }
        let block = match current {
            Some(block) => block,
            None => continue,
        };
        if let Some(targets) = line.strip_prefix("goto ") {
            for target in targets.split(',').map(str::trim) {
                match labels.get(target) {
                    Some(&succ) => body.add_edge(block, succ),
                    None => bail!("line {}: unknown block `{}`", lineno, target),
                }
            }
            continue;
        }
        let element = parse_element(&body, line).map_err(|e| anyhow!("line {}: {}", lineno, e))?;
        log::trace!("parse: {} gets {:?}", block, element);
        body.push_element(block, element);
    }

    Ok(body)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_label(line: &str) -> Option<&str> {
    let label = line.strip_suffix(':')?;
    if is_ident(label) {
        Some(label)
    } else {
        None
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

const KEYWORDS: &[&str] = &[
    "function", "var", "init", "end", "eval", "branch", "return", "goto", "call", "true", "false",
];

fn parse_decl(decl: &str) -> Result<(&str, Type)> {
    let (name, ty) = match decl.split_once(':') {
        Some(parts) => parts,
        None => bail!("expected `var <name>: <type>`"),
    };
    let name = name.trim();
    if !is_ident(name) {
        bail!("invalid variable name `{}`", name);
    }
    if KEYWORDS.contains(&name) {
        bail!("`{}` is a keyword and cannot name a variable", name);
    }
    let ty = match ty.trim() {
        "i64" => Type::I64,
        "bool" => Type::Bool,
        other => match other.strip_prefix("record ") {
            Some(record) if is_ident(record.trim()) => Type::Record(record.trim().to_owned()),
            _ => bail!("unknown type `{}`", other),
        },
    };
    Ok((name, ty))
}

fn parse_element(body: &FunctionBody, line: &str) -> Result<Element> {
    if let Some(rest) = line.strip_prefix("init ") {
        let (dst, src) = parse_assignment(body, rest)?;
        return Ok(Element::Initializer {
            var: dst,
            init: src,
        });
    }
    if let Some(var) = line.strip_prefix("end ") {
        return Ok(Element::ScopeEnd(parse_var(body, var.trim())?));
    }
    if let Some(expr) = line.strip_prefix("eval ") {
        return Ok(Element::Statement(Stmt::Eval(parse_expr(body, expr)?)));
    }
    if let Some(cond) = line.strip_prefix("branch ") {
        return Ok(Element::Statement(Stmt::Branch(parse_operand(
            body,
            cond.trim(),
        )?)));
    }
    if line == "return" {
        return Ok(Element::Statement(Stmt::Return(None)));
    }
    if let Some(value) = line.strip_prefix("return ") {
        return Ok(Element::Statement(Stmt::Return(Some(parse_operand(
            body,
            value.trim(),
        )?))));
    }
    if line.contains('=') {
        let (dst, src) = parse_assignment(body, line)?;
        return Ok(Element::Statement(Stmt::Assign { dst, src }));
    }
    bail!("cannot parse `{}`", line)
}

fn parse_assignment(body: &FunctionBody, text: &str) -> Result<(super::Var, Expr)> {
    // Split on the first `=` that is not part of `==`/`!=`.
    let (dst, src) = match text.split_once(" = ") {
        Some(parts) => parts,
        None => bail!("expected `<var> = <expr>`"),
    };
    Ok((parse_var(body, dst.trim())?, parse_expr(body, src)?))
}

fn parse_expr(body: &FunctionBody, text: &str) -> Result<Expr> {
    let text = text.trim();
    if let Some(call) = text.strip_prefix("call ") {
        let (callee, args) = match (call.find('('), call.rfind(')')) {
            (Some(open), Some(close)) if open < close => (&call[..open], &call[open + 1..close]),
            _ => bail!("malformed call `{}`", text),
        };
        let args = args
            .split(',')
            .map(str::trim)
            .filter(|arg| !arg.is_empty())
            .map(|arg| parse_operand(body, arg))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Expr::Call {
            callee: callee.trim().to_owned(),
            args,
        });
    }
    if let Some(op) = text.strip_prefix('!') {
        return Ok(Expr::Not(parse_operand(body, op.trim())?));
    }
    let tokens = text.split_whitespace().collect::<Vec<_>>();
    match tokens.as_slice() {
        [op] => Ok(Expr::Use(parse_operand(body, op)?)),
        [lhs, op, rhs] => {
            let op = match BinaryOp::from_symbol(op) {
                Some(op) => op,
                None => bail!("unknown operator `{}`", op),
            };
            Ok(Expr::Binary(
                op,
                parse_operand(body, lhs)?,
                parse_operand(body, rhs)?,
            ))
        }
        _ => bail!("cannot parse expression `{}`", text),
    }
}

fn parse_operand(body: &FunctionBody, text: &str) -> Result<Operand> {
    match text {
        "true" => return Ok(Operand::Const(Const::Bool(true))),
        "false" => return Ok(Operand::Const(Const::Bool(false))),
        _ => {}
    }
    if let Ok(value) = text.parse::<i64>() {
        return Ok(Operand::Const(Const::I64(value)));
    }
    Ok(Operand::Var(parse_var(body, text)?))
}

fn parse_var(body: &FunctionBody, name: &str) -> Result<super::Var> {
    match body.var_named(name) {
        Some(var) => Ok(var),
        None => bail!("undeclared variable `{}`", name),
    }
}
