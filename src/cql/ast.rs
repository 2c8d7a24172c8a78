//! AST types for CQL filters and value expressions.

use std::fmt;

use indexmap::IndexSet;

use crate::value::Value;

/// Dotted attribute path: `foo`, `address.city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    pub fn new(segments: Vec<String>) -> Self {
        PropertyPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for PropertyPath {
    fn from(path: &str) -> Self {
        PropertyPath(path.split('.').map(str::to_string).collect())
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A value-producing expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),

    /// Attribute lookup against the feature being evaluated.
    Property(PropertyPath),

    /// Call into the function registry: `interpolate([foo], red, blue, 0, 1000)`
    Function { name: String, args: Vec<Expression> },

    /// Juxtaposed parts, concatenated as text on evaluation.
    Mixed(Vec<Expression>),

    /// `UNEMPLOY / (EMPLOYED + UNEMPLOY)`
    Math {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn property(path: &str) -> Self {
        Expression::Property(PropertyPath::from(path))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function {
            name: name.into(),
            args,
        }
    }

    pub fn math(op: ArithOp, left: Expression, right: Expression) -> Self {
        Expression::Math {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }

    pub fn collect_properties(&self, out: &mut IndexSet<String>) {
        match self {
            Expression::Literal(_) => {}
            Expression::Property(path) => {
                out.insert(path.to_string());
            }
            Expression::Function { args, .. } => {
                args.iter().for_each(|arg| arg.collect_properties(out))
            }
            Expression::Mixed(parts) => parts.iter().for_each(|part| part.collect_properties(out)),
            Expression::Math { left, right, .. } => {
                left.collect_properties(out);
                right.collect_properties(out);
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(Value::String(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Property(path) => write!(f, "{}", path),
            Expression::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Mixed(parts) => {
                for part in parts {
                    match part {
                        Expression::Literal(Value::String(s)) => write!(f, "{}", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                Ok(())
            }
            Expression::Math { op, left, right } => {
                // operands that bind looser than `op` need parentheses
                match left.as_ref() {
                    Expression::Math { op: inner, .. } if inner.precedence() < op.precedence() => {
                        write!(f, "({})", left)?
                    }
                    _ => write!(f, "{}", left)?,
                }
                write!(f, " {} ", op)?;
                match right.as_ref() {
                    Expression::Math { op: inner, .. } if inner.precedence() <= op.precedence() => {
                        write!(f, "({})", right)
                    }
                    _ => write!(f, "{}", right),
                }
            }
        }
    }
}

/// Arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub(crate) fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(ArithOp::Add),
            "-" => Some(ArithOp::Sub),
            "*" => Some(ArithOp::Mul),
            "/" => Some(ArithOp::Div),
            _ => None,
        }
    }

    /// `*` and `/` bind tighter than `+` and `-`.
    pub fn precedence(self) -> u8 {
        match self {
            ArithOp::Add | ArithOp::Sub => 1,
            ArithOp::Mul | ArithOp::Div => 2,
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        };
        write!(f, "{}", symbol)
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq, // =
    Ne, // <>
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
}

impl CompareOp {
    /// The operator that gives the same result with its operands swapped.
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "<>"),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Not,
}

impl fmt::Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicOp::And => write!(f, "AND"),
            LogicOp::Or => write!(f, "OR"),
            LogicOp::Not => write!(f, "NOT"),
        }
    }
}

/// Binary spatial predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialOp {
    Equals,
    Disjoint,
    Intersects,
    Touches,
    Crosses,
    Within,
    Contains,
    Overlaps,
    Covers,
    Bbox,
    DWithin,
    Beyond,
}

impl SpatialOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let op = match word.to_ascii_uppercase().as_str() {
            "EQUALS" => SpatialOp::Equals,
            "DISJOINT" => SpatialOp::Disjoint,
            "INTERSECTS" => SpatialOp::Intersects,
            "TOUCHES" => SpatialOp::Touches,
            "CROSSES" => SpatialOp::Crosses,
            "WITHIN" => SpatialOp::Within,
            "CONTAINS" => SpatialOp::Contains,
            "OVERLAPS" => SpatialOp::Overlaps,
            "COVERS" => SpatialOp::Covers,
            "BBOX" => SpatialOp::Bbox,
            "DWITHIN" => SpatialOp::DWithin,
            "BEYOND" => SpatialOp::Beyond,
            _ => return None,
        };
        Some(op)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SpatialOp::Equals => "EQUALS",
            SpatialOp::Disjoint => "DISJOINT",
            SpatialOp::Intersects => "INTERSECTS",
            SpatialOp::Touches => "TOUCHES",
            SpatialOp::Crosses => "CROSSES",
            SpatialOp::Within => "WITHIN",
            SpatialOp::Contains => "CONTAINS",
            SpatialOp::Overlaps => "OVERLAPS",
            SpatialOp::Covers => "COVERS",
            SpatialOp::Bbox => "BBOX",
            SpatialOp::DWithin => "DWITHIN",
            SpatialOp::Beyond => "BEYOND",
        }
    }

    /// DWITHIN and BEYOND take a distance argument.
    pub fn is_distance(self) -> bool {
        matches!(self, SpatialOp::DWithin | SpatialOp::Beyond)
    }
}

/// Root filter node.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches everything (`INCLUDE`, the empty filter)
    All,

    /// Matches nothing (`EXCLUDE`)
    None,

    /// `foo < 3`. A literal is always on the right after parsing.
    Comparison {
        op: CompareOp,
        left: Expression,
        right: Expression,
    },

    /// AND / OR over any number of children; NOT over exactly one.
    Logic { op: LogicOp, children: Vec<Filter> },

    /// `name [NOT] LIKE 'Ma%'`, `%` any run and `_` any single character
    Like {
        expr: Expression,
        pattern: String,
        negated: bool,
    },

    /// `name IS [NOT] NULL`
    IsNull { expr: Expression, negated: bool },

    /// `kind [NOT] IN ('a', 'b')`
    In {
        expr: Expression,
        values: Vec<Expression>,
        negated: bool,
    },

    /// `IN ('roads.1', 'roads.2')`: matches on the feature id.
    Id(Vec<Expression>),

    /// `INTERSECTS(geometry, POINT(1 2))`, `DWITHIN(geometry, POINT(0 0), 10, meters)`
    Spatial {
        op: SpatialOp,
        left: Expression,
        right: Expression,
        distance: Option<Expression>,
    },
}

impl Filter {
    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Filter::Comparison { op, left, right }
    }

    /// Conjunction, flattened.
    pub fn and(self, other: Filter) -> Filter {
        Filter::Logic {
            op: LogicOp::And,
            children: vec![self, other],
        }
        .simplify()
    }

    /// Disjunction, flattened.
    pub fn or(self, other: Filter) -> Filter {
        Filter::Logic {
            op: LogicOp::Or,
            children: vec![self, other],
        }
        .simplify()
    }

    pub fn negate(self) -> Filter {
        Filter::Logic {
            op: LogicOp::Not,
            children: vec![self],
        }
    }

    /// Flatten nested AND/OR and fold away INCLUDE/EXCLUDE operands.
    pub fn simplify(self) -> Self {
        match self {
            Filter::Logic {
                op: op @ (LogicOp::And | LogicOp::Or),
                children,
            } => {
                // identity drops out, the absorbing element wins
                let (identity, absorbing) = match op {
                    LogicOp::And => (Filter::All, Filter::None),
                    _ => (Filter::None, Filter::All),
                };
                let mut flat = Vec::new();
                for child in children {
                    match child.simplify() {
                        Filter::Logic {
                            op: inner,
                            children,
                        } if inner == op => flat.extend(children),
                        f if f == identity => {}
                        f if f == absorbing => return absorbing,
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => identity,
                    1 => flat.swap_remove(0),
                    _ => Filter::Logic { op, children: flat },
                }
            }
            Filter::Logic {
                op: LogicOp::Not,
                children,
            } => Filter::Logic {
                op: LogicOp::Not,
                children: children.into_iter().map(Filter::simplify).collect(),
            },
            other => other,
        }
    }

    /// Every attribute path the filter reads, in first-seen order.
    pub fn properties(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.collect_properties(&mut out);
        out
    }

    pub fn collect_properties(&self, out: &mut IndexSet<String>) {
        match self {
            Filter::All | Filter::None => {}
            Filter::Comparison { left, right, .. } => {
                left.collect_properties(out);
                right.collect_properties(out);
            }
            Filter::Logic { children, .. } => {
                children.iter().for_each(|c| c.collect_properties(out))
            }
            Filter::Like { expr, .. } | Filter::IsNull { expr, .. } => {
                expr.collect_properties(out)
            }
            Filter::In { expr, values, .. } => {
                expr.collect_properties(out);
                values.iter().for_each(|v| v.collect_properties(out));
            }
            Filter::Id(ids) => ids.iter().for_each(|id| id.collect_properties(out)),
            Filter::Spatial {
                left,
                right,
                distance,
                ..
            } => {
                left.collect_properties(out);
                right.collect_properties(out);
                if let Some(d) = distance {
                    d.collect_properties(out);
                }
            }
        }
    }
}

fn not(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "INCLUDE"),
            Filter::None => write!(f, "EXCLUDE"),
            Filter::Comparison { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Filter::Logic {
                op: LogicOp::Not,
                children,
            } => match children.first() {
                Some(child) => write!(f, "NOT ({})", child),
                None => write!(f, "NOT ()"),
            },
            Filter::Logic { op, children } => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op)?;
                    }
                    match child {
                        Filter::Logic { op: inner, .. } if inner != op && *inner != LogicOp::Not => {
                            write!(f, "({})", child)?
                        }
                        _ => write!(f, "{}", child)?,
                    }
                }
                Ok(())
            }
            Filter::Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "{} {}LIKE '{}'",
                expr,
                not(*negated),
                pattern.replace('\'', "''")
            ),
            Filter::IsNull { expr, negated } => write!(f, "{} IS {}NULL", expr, not(*negated)),
            Filter::In {
                expr,
                values,
                negated,
            } => {
                write!(f, "{} {}IN (", expr, not(*negated))?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Filter::Id(ids) => {
                write!(f, "IN (")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", id)?;
                }
                write!(f, ")")
            }
            Filter::Spatial {
                op,
                left,
                right,
                distance,
            } => {
                write!(f, "{}({}, {}", op.keyword(), left, right)?;
                if let Some(d) = distance {
                    write!(f, ", {}", d)?;
                }
                write!(f, ")")
            }
        }
    }
}
