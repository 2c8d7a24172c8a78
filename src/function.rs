//! Named functions callable from style values and filters.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::color::{Hsl, Rgb, clamp_channel};
use crate::error::EvaluationError;
use crate::feature::Feature;
use crate::value::{FromValue, Value};

/// Signature of a registered function. Arguments arrive already evaluated.
pub type Function =
    dyn Fn(&[Value], Option<&dyn Feature>) -> Result<Value, EvaluationError> + Send + Sync;

/// Case-insensitive name to function table.
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<Function>>,
}

impl FunctionRegistry {
    /// A registry with no functions at all.
    pub fn empty() -> Self {
        FunctionRegistry {
            functions: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[Value], Option<&dyn Feature>) -> Result<Value, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.functions
            .insert(name.to_ascii_lowercase(), Arc::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_lowercase())
    }

    pub fn call(
        &self,
        name: &str,
        args: &[Value],
        feature: Option<&dyn Feature>,
    ) -> Result<Value, EvaluationError> {
        let function = self
            .functions
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| EvaluationError::UnknownFunction {
                name: name.to_string(),
            })?;
        function(args, feature)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionRegistry {
    /// The built-in functions: `interpolate`, `randcolor`, `rgb`, `rgba`, `hsl`.
    fn default() -> Self {
        let mut registry = FunctionRegistry::empty();
        registry.register("interpolate", interpolate);
        registry.register("randcolor", randcolor);
        registry.register("rgb", rgb);
        registry.register("rgba", rgba);
        registry.register("hsl", hsl);
        registry
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

static BUILTINS: LazyLock<FunctionRegistry> = LazyLock::new(FunctionRegistry::default);

/// Shared registry of built-in functions.
pub fn builtins() -> &'static FunctionRegistry {
    &BUILTINS
}

fn check_arity(function: &str, args: &[Value], expected: usize) -> Result<(), EvaluationError> {
    if args.len() != expected {
        return Err(EvaluationError::Arity {
            function: function.to_string(),
            expected: expected.to_string(),
            found: args.len(),
        });
    }
    Ok(())
}

fn arg<T: FromValue>(function: &str, args: &[Value], index: usize) -> Result<T, EvaluationError> {
    let value = args.get(index).cloned().unwrap_or(Value::Null);
    if value.is_null() {
        return Err(EvaluationError::Argument {
            function: function.to_string(),
            index,
            message: "evaluated to null".to_string(),
        });
    }
    T::from_value(value).map_err(|e| EvaluationError::Argument {
        function: function.to_string(),
        index,
        message: e.to_string(),
    })
}

/// Quantisation of the interpolation range.
const INTERPOLATION_STEPS: f64 = 100.0;

/// `interpolate(value, from_color, to_color, from_value, to_value)`
fn interpolate(args: &[Value], _: Option<&dyn Feature>) -> Result<Value, EvaluationError> {
    check_arity("interpolate", args, 5)?;
    let value: f64 = arg("interpolate", args, 0)?;
    let from: Rgb = arg("interpolate", args, 1)?;
    let to: Rgb = arg("interpolate", args, 2)?;
    let low: f64 = arg("interpolate", args, 3)?;
    let high: f64 = arg("interpolate", args, 4)?;

    let amount = if high == low {
        0.0
    } else {
        ((value - low) / (high - low)).clamp(0.0, 1.0)
    };
    // snap to the nearest step
    let amount = (amount * INTERPOLATION_STEPS).round() / INTERPOLATION_STEPS;
    Ok(Value::Color(from.interpolate(&to, amount)))
}

fn randcolor(args: &[Value], _: Option<&dyn Feature>) -> Result<Value, EvaluationError> {
    check_arity("randcolor", args, 0)?;
    Ok(Value::Color(Rgb::new(
        rand::random(),
        rand::random(),
        rand::random(),
    )))
}

fn rgb(args: &[Value], _: Option<&dyn Feature>) -> Result<Value, EvaluationError> {
    check_arity("rgb", args, 3)?;
    Ok(Value::Color(Rgb::new(
        clamp_channel(arg("rgb", args, 0)?),
        clamp_channel(arg("rgb", args, 1)?),
        clamp_channel(arg("rgb", args, 2)?),
    )))
}

fn rgba(args: &[Value], _: Option<&dyn Feature>) -> Result<Value, EvaluationError> {
    check_arity("rgba", args, 4)?;
    let alpha: f64 = arg("rgba", args, 3)?;
    Ok(Value::Color(
        Rgb::new(
            clamp_channel(arg("rgba", args, 0)?),
            clamp_channel(arg("rgba", args, 1)?),
            clamp_channel(arg("rgba", args, 2)?),
        )
        .with_alpha(clamp_channel(alpha.clamp(0.0, 1.0) * 255.0)),
    ))
}

/// `hsl(hue_degrees, saturation, lightness)`; saturation and lightness above 1
/// are read as percentages.
fn hsl(args: &[Value], _: Option<&dyn Feature>) -> Result<Value, EvaluationError> {
    check_arity("hsl", args, 3)?;
    let fraction = |v: f64| if v > 1.0 { v / 100.0 } else { v };
    Ok(Value::Color(Rgb::from_hsl(Hsl {
        h: arg("hsl", args, 0)?,
        s: fraction(arg("hsl", args, 1)?),
        l: fraction(arg("hsl", args, 2)?),
    })))
}
