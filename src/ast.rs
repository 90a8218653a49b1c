use std::fmt;

/// name of the synthetic prototype wrapping every top-level expression
pub const ANON_FN_NAME: &str = "__anon_expr";

#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Number(f64),
    Variable(String),
    Binary(char, Box<Expression>, Box<Expression>),
    Call(String, Vec<Expression>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expression,
}

impl Prototype {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANON_FN_NAME, Vec::new())
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn binary(op: char, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call(callee.into(), args)
    }

    /// levels in the tree; a leaf is 1
    pub fn depth(&self) -> usize {
        match self {
            Expression::Number(_) | Expression::Variable(_) => 1,
            Expression::Binary(_, lhs, rhs) => lhs.depth().max(rhs.depth()) + 1,
            Expression::Call(_, args) => {
                args.iter().map(Expression::depth).max().unwrap_or(0) + 1
            }
        }
    }
}

impl Function {
    pub fn anonymous(body: Expression) -> Self {
        Self {
            prototype: Prototype::anonymous(),
            body,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.prototype.name == ANON_FN_NAME
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // no literal spells infinity, but any digit run past f64::MAX lexes to it
            Expression::Number(value) if *value == f64::INFINITY => {
                write!(f, "{:.0}0", f64::MAX)
            }
            Expression::Number(value) => write!(f, "{}", value),
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op, rhs),
            Expression::Call(callee, args) => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(" "))
    }
}

/// anonymous functions print as their bare body so the output parses back as
/// the same kind of unit
impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "{}", self.body)
        } else {
            write!(f, "def {} {}", self.prototype, self.body)
        }
    }
}
