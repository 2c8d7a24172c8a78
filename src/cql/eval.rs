//! Evaluator for filters and expressions.

use std::cmp::Ordering;

use geo::{BoundingRect, Distance, Euclidean, Intersects, Relate};
use geo_types::Geometry;

use super::ast::{ArithOp, CompareOp, Expression, Filter, LogicOp, SpatialOp};
use crate::error::EvaluationError;
use crate::feature::{Feature, resolve};
use crate::function::FunctionRegistry;
use crate::utils::like_match;
use crate::value::{FromValue, Value};

impl Expression {
    /// Evaluate against an optional feature. Missing attributes are `Value::Null`.
    pub fn evaluate(
        &self,
        feature: Option<&dyn Feature>,
        functions: &FunctionRegistry,
    ) -> Result<Value, EvaluationError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Property(path) => Ok(resolve(feature, path)),
            Expression::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(feature, functions))
                    .collect::<Result<Vec<_>, _>>()?;
                functions.call(name, &args, feature)
            }
            Expression::Mixed(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part.evaluate(feature, functions)? {
                        Value::Null => {}
                        value => text.push_str(&value.to_string()),
                    }
                }
                Ok(Value::String(text))
            }
            Expression::Math { op, left, right } => arithmetic(
                *op,
                left.evaluate(feature, functions)?,
                right.evaluate(feature, functions)?,
            ),
        }
    }
}

impl Filter {
    /// Evaluate the filter against an optional feature.
    ///
    /// Comparisons involving null are false; only `IS NULL` observes null.
    pub fn evaluate(
        &self,
        feature: Option<&dyn Feature>,
        functions: &FunctionRegistry,
    ) -> Result<bool, EvaluationError> {
        let eval = |expr: &Expression| expr.evaluate(feature, functions);

        match self {
            Filter::All => Ok(true),
            Filter::None => Ok(false),

            Filter::Comparison { op, left, right } => Ok(compare(*op, &eval(left)?, &eval(right)?)),

            Filter::Logic {
                op: LogicOp::And,
                children,
            } => {
                for child in children {
                    if !child.evaluate(feature, functions)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Logic {
                op: LogicOp::Or,
                children,
            } => {
                for child in children {
                    if child.evaluate(feature, functions)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Logic {
                op: LogicOp::Not,
                children,
            } => match children.first() {
                Some(child) => Ok(!child.evaluate(feature, functions)?),
                None => Ok(true),
            },

            Filter::Like {
                expr,
                pattern,
                negated,
            } => match eval(expr)? {
                Value::Null => Ok(false),
                value => Ok(like_match(pattern, &value.to_string()) != *negated),
            },

            Filter::IsNull { expr, negated } => Ok(eval(expr)?.is_null() != *negated),

            Filter::In {
                expr,
                values,
                negated,
            } => {
                let value = eval(expr)?;
                if value.is_null() {
                    return Ok(false);
                }
                for candidate in values {
                    if value.loose_eq(&eval(candidate)?) {
                        return Ok(!*negated);
                    }
                }
                Ok(*negated)
            }

            Filter::Id(ids) => {
                let Some(id) = feature.and_then(|f| f.id()) else {
                    return Ok(false);
                };
                let id = Value::from(id);
                for candidate in ids {
                    if id.loose_eq(&eval(candidate)?) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            Filter::Spatial {
                op,
                left,
                right,
                distance,
            } => {
                let (Some(a), Some(b)) = (geometry(eval(left)?)?, geometry(eval(right)?)?) else {
                    return Ok(false);
                };
                let distance = match distance {
                    Some(d) => match eval(d)? {
                        Value::Null => return Ok(false),
                        value => Some(f64::from_value(value)?),
                    },
                    None => None,
                };
                Ok(spatial(*op, &a, &b, distance))
            }
        }
    }
}

/// Apply a comparison operator. Null or incomparable operands never match.
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    match op {
        CompareOp::Eq => left.loose_eq(right),
        CompareOp::Ne => !left.loose_eq(right),
        CompareOp::Lt => left.loose_cmp(right).is_some_and(Ordering::is_lt),
        CompareOp::Le => left.loose_cmp(right).is_some_and(Ordering::is_le),
        CompareOp::Gt => left.loose_cmp(right).is_some_and(Ordering::is_gt),
        CompareOp::Ge => left.loose_cmp(right).is_some_and(Ordering::is_ge),
    }
}

/// Numeric arithmetic. A null operand yields null. Integers stay integral
/// unless dividing or overflowing.
fn arithmetic(op: ArithOp, left: Value, right: Value) -> Result<Value, EvaluationError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let exact = match op {
            ArithOp::Add => a.checked_add(*b),
            ArithOp::Sub => a.checked_sub(*b),
            ArithOp::Mul => a.checked_mul(*b),
            ArithOp::Div => None,
        };
        if let Some(n) = exact {
            return Ok(Value::Int(n));
        }
    }
    let a = f64::from_value(left)?;
    let b = f64::from_value(right)?;
    Ok(Value::Double(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
    }))
}

fn geometry(value: Value) -> Result<Option<Geometry<f64>>, EvaluationError> {
    match value {
        Value::Null => Ok(None),
        other => Geometry::from_value(other).map(Some),
    }
}

fn spatial(op: SpatialOp, a: &Geometry<f64>, b: &Geometry<f64>, distance: Option<f64>) -> bool {
    match op {
        SpatialOp::Equals => a.relate(b).is_equal_topo(),
        SpatialOp::Disjoint => a.relate(b).is_disjoint(),
        SpatialOp::Intersects => a.relate(b).is_intersects(),
        SpatialOp::Touches => a.relate(b).is_touches(),
        SpatialOp::Crosses => a.relate(b).is_crosses(),
        SpatialOp::Within => a.relate(b).is_within(),
        SpatialOp::Contains => a.relate(b).is_contains(),
        SpatialOp::Overlaps => a.relate(b).is_overlaps(),
        SpatialOp::Covers => a.relate(b).is_covers(),
        SpatialOp::Bbox => match (a.bounding_rect(), b.bounding_rect()) {
            (Some(ra), Some(rb)) => ra.intersects(&rb),
            _ => false,
        },
        SpatialOp::DWithin => distance.is_some_and(|d| Euclidean.distance(a, b) <= d),
        SpatialOp::Beyond => distance.is_some_and(|d| Euclidean.distance(a, b) > d),
    }
}
