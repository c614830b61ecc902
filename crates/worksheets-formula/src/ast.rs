//! Formula Abstract Syntax Tree types

use crate::functions::Function;
use rust_decimal::RoundingStrategy;
use std::fmt;
use worksheets_core::Value;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value
    Literal(Value),

    /// Dotted path of field names, resolved from the current worksheet
    /// through reference fields
    Selector(Vec<String>),

    /// Unary operation
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },

    /// Binary operation, optionally rounding a numeric result
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
        rounding: Option<Rounding>,
    },

    /// Built-in function call
    Call { function: Function, args: Vec<Expr> },

    /// Terminal formula body
    Return(Box<Expr>),

    /// No formula; the value is supplied by the caller
    External,
}

impl Expr {
    /// Selector over a dotted path, e.g. `Expr::selector("owner.name")`
    pub fn selector(path: &str) -> Self {
        Expr::Selector(path.split('.').map(str::to_string).collect())
    }

    /// Literal value
    pub fn literal<V: Into<Value>>(value: V) -> Self {
        Expr::Literal(value.into())
    }

    /// Binary operation without rounding
    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            rounding: None,
        }
    }

    /// Binary operation whose numeric result is rounded
    pub fn rounded(op: BinaryOperator, left: Expr, right: Expr, rounding: Rounding) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            rounding: Some(rounding),
        }
    }

    /// Unary operation
    pub fn unary(op: UnaryOperator, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Check if this is the external marker
    pub fn is_external(&self) -> bool {
        matches!(self, Expr::External)
    }

    /// Collect every selector path in the expression, in source order
    pub fn selectors(&self) -> Vec<&[String]> {
        let mut out = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a [String]>) {
        match self {
            Expr::Literal(_) | Expr::External => {}
            Expr::Selector(path) => out.push(path),
            Expr::Unary { operand, .. } => operand.collect_selectors(out),
            Expr::Binary { left, right, .. } => {
                left.collect_selectors(out);
                right.collect_selectors(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_selectors(out);
                }
            }
            Expr::Return(inner) => inner.collect_selectors(out),
        }
    }

    /// Names of the current worksheet's fields this expression reads
    pub fn local_fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .selectors()
            .into_iter()
            .filter_map(|path| path.first().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Selector(path) => write!(f, "{}", path.join(".")),
            Expr::Unary { op, operand } => write!(f, "{}{}", op, operand),
            Expr::Binary {
                op,
                left,
                right,
                rounding,
            } => {
                write!(f, "({} {} {}", left, op, right)?;
                if let Some(rounding) = rounding {
                    write!(f, " {}", rounding)?;
                }
                write!(f, ")")
            }
            Expr::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Return(inner) => write!(f, "return {}", inner),
            Expr::External => write!(f, "external"),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Logical
    And,
    Or,
}

impl BinaryOperator {
    /// Check if the operator produces a number from numbers
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
        )
    }

    /// Source symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Not => f.write_str("!"),
            UnaryOperator::Negate => f.write_str("-"),
        }
    }
}

/// Rounding applied to the numeric result of a binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rounding {
    pub mode: RoundingMode,
    pub scale: u32,
}

impl Rounding {
    pub fn new(mode: RoundingMode, scale: u32) -> Self {
        Self { mode, scale }
    }
}

impl fmt::Display for Rounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {} {}", self.mode, self.scale)
    }
}

/// Rounding modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    /// Away from zero
    Up,
    /// Toward zero
    Down,
    /// Nearest, ties away from zero
    Half,
    /// Nearest, ties to even
    HalfEven,
    /// Toward positive infinity
    Ceiling,
    /// Toward negative infinity
    Floor,
}

impl RoundingMode {
    /// Look up a mode by its source keyword
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "up" => Some(RoundingMode::Up),
            "down" => Some(RoundingMode::Down),
            "half" => Some(RoundingMode::Half),
            "halfeven" => Some(RoundingMode::HalfEven),
            "ceiling" => Some(RoundingMode::Ceiling),
            "floor" => Some(RoundingMode::Floor),
            _ => None,
        }
    }

    /// Source keyword
    pub fn name(self) -> &'static str {
        match self {
            RoundingMode::Up => "up",
            RoundingMode::Down => "down",
            RoundingMode::Half => "half",
            RoundingMode::HalfEven => "halfeven",
            RoundingMode::Ceiling => "ceiling",
            RoundingMode::Floor => "floor",
        }
    }

    pub(crate) fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Half => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
            RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
