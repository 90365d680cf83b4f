use super::Var;

/// A literal constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Const {
    I64(i64),
    Bool(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Var(Var),
    Const(Const),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<BinaryOp> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Use(Operand),
    Binary(BinaryOp, Operand, Operand),
    Not(Operand),
    /// A call to a function outside the body. Its result is never known.
    Call { callee: String, args: Vec<Operand> },
}

impl Expr {
    pub fn visit_operands<F: FnMut(&Operand)>(&self, mut f: F) {
        match self {
            Expr::Use(op) | Expr::Not(op) => f(op),
            Expr::Binary(_, lhs, rhs) => {
                f(lhs);
                f(rhs);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stmt {
    Assign { dst: Var, src: Expr },
    Eval(Expr),
    Branch(Operand),
    Return(Option<Operand>),
}

/// One program element in a basic block.
///
/// Statements are the fine-grained kind; initializers and scope ends are
/// only visible to element-level transfer functions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Element {
    Statement(Stmt),
    Initializer { var: Var, init: Expr },
    ScopeEnd(Var),
}

impl Element {
    pub fn as_stmt(&self) -> Option<&Stmt> {
        match self {
            Element::Statement(stmt) => Some(stmt),
            _ => None,
        }
    }

    /// The variable this element writes, if any.
    pub fn def(&self) -> Option<Var> {
        match self {
            Element::Statement(Stmt::Assign { dst, .. }) => Some(*dst),
            Element::Initializer { var, .. } => Some(*var),
            _ => None,
        }
    }

    /// Visits every variable the element mentions, definitions first.
    pub fn visit_vars<F: FnMut(Var)>(&self, mut f: F) {
        let mut use_operand = |op: &Operand| {
            if let Operand::Var(var) = op {
                f(*var);
            }
        };
        match self {
            Element::Statement(Stmt::Assign { dst, src }) => {
                use_operand(&Operand::Var(*dst));
                src.visit_operands(use_operand);
            }
            Element::Statement(Stmt::Eval(expr)) => expr.visit_operands(use_operand),
            Element::Statement(Stmt::Branch(op)) => use_operand(op),
            Element::Statement(Stmt::Return(op)) => {
                if let Some(op) = op {
                    use_operand(op);
                }
            }
            Element::Initializer { var, init } => {
                use_operand(&Operand::Var(*var));
                init.visit_operands(use_operand);
            }
            Element::ScopeEnd(var) => use_operand(&Operand::Var(*var)),
        }
    }
}
