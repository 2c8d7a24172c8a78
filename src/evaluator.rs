//! Layer selection and per-feature property lookup over flattened rules.

use std::sync::LazyLock;

use crate::cascade::FlatRule;
use crate::error::EvaluationError;
use crate::feature::Feature;
use crate::function::FunctionRegistry;
use crate::value::{FromValue, Value};

/// Rules whose selector targets `target` by id, name (case-insensitive) or
/// wildcard, in their original priority order.
pub fn select<'r>(rules: &'r [FlatRule], target: &str) -> Vec<&'r FlatRule> {
    rules.iter().filter(|r| r.selector().selects(target)).collect()
}

/// Evaluates declarations against features using a function registry.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    functions: FunctionRegistry,
}

static DEFAULT: LazyLock<Evaluator> = LazyLock::new(Evaluator::default);

impl Evaluator {
    pub fn new(functions: FunctionRegistry) -> Self {
        Evaluator { functions }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Whether the rule's filter accepts the feature. No filter accepts all.
    pub fn matches(
        &self,
        rule: &FlatRule,
        feature: Option<&dyn Feature>,
    ) -> Result<bool, EvaluationError> {
        match rule.filter() {
            Some(filter) => filter.evaluate(feature, &self.functions),
            None => Ok(true),
        }
    }

    /// Value of `key` from the highest-priority rule that declares it and
    /// matches the feature. `None` when no such rule exists.
    pub fn eval_value(
        &self,
        rules: &[&FlatRule],
        feature: Option<&dyn Feature>,
        key: &str,
    ) -> Result<Option<Value>, EvaluationError> {
        for rule in rules.iter().rev() {
            let Some(expr) = rule.get(key) else {
                continue;
            };
            if self.matches(rule, feature)? {
                return expr.evaluate(feature, &self.functions).map(Some);
            }
        }
        Ok(None)
    }

    /// Like `eval_value`, coerced to `T`. A null result counts as absent.
    pub fn eval_as<T: FromValue>(
        &self,
        rules: &[&FlatRule],
        feature: Option<&dyn Feature>,
        key: &str,
    ) -> Result<Option<T>, EvaluationError> {
        match self.eval_value(rules, feature, key)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some),
        }
    }

    pub fn eval<T: FromValue>(
        &self,
        rules: &[&FlatRule],
        feature: Option<&dyn Feature>,
        key: &str,
        default: T,
    ) -> Result<T, EvaluationError> {
        Ok(self.eval_as(rules, feature, key)?.unwrap_or(default))
    }
}

/// Evaluate `key` with the built-in functions, falling back to `default`.
pub fn eval<T: FromValue>(
    rules: &[&FlatRule],
    feature: Option<&dyn Feature>,
    key: &str,
    default: T,
) -> Result<T, EvaluationError> {
    DEFAULT.eval(rules, feature, key, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::feature::MapFeature;
    use crate::style::parse_stylesheet;

    #[test]
    fn test_select_by_id_name_and_wildcard() {
        let sheet = parse_stylesheet(
            "#roads { w: 1; } Map { w: 2; } * { w: 3; } #rivers { w: 4; } .big { w: 5; }",
        )
        .unwrap();
        let flat = sheet.flat_rules();
        assert_eq!(select(flat, "roads").len(), 2);
        assert_eq!(select(flat, "map").len(), 2);
        assert_eq!(select(flat, "MAP").len(), 2);
        assert_eq!(select(flat, "other").len(), 1);
        assert_eq!(select(flat, "Roads").len(), 1);
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let sheet = parse_stylesheet(
            "#widgets[cost > 12] {
                ::costly[cost > 20] { color: yellow; }
                ::expensive[cost > 30] { color: red; }
                color: green;
            }",
        )
        .unwrap();
        let rules = select(sheet.flat_rules(), "widgets");

        let cheap = MapFeature::new().with_attribute("cost", 5);
        let mid = MapFeature::new().with_attribute("cost", 15);
        let pricey = MapFeature::new().with_attribute("cost", 35);

        let black = Rgb::BLACK;
        assert_eq!(eval(&rules, Some(&cheap), "color", black).unwrap(), black);
        assert_eq!(
            eval(&rules, Some(&mid), "color", black).unwrap(),
            Rgb::named("green").unwrap()
        );
        // the widgets entry itself comes last in priority order
        assert_eq!(
            eval(&rules, Some(&pricey), "color", black).unwrap(),
            Rgb::named("green").unwrap()
        );

        // within one attachment, the attachment's own rules decide
        let costly: Vec<_> = rules
            .iter()
            .copied()
            .filter(|r| r.attachment() == Some("costly"))
            .collect();
        assert_eq!(
            eval(&costly, Some(&pricey), "color", black).unwrap(),
            Rgb::named("yellow").unwrap()
        );
    }

    #[test]
    fn test_default_when_absent_or_null() {
        let sheet = parse_stylesheet("#a { label: [name]; }").unwrap();
        let rules = select(sheet.flat_rules(), "a");
        let f = MapFeature::new();
        assert_eq!(
            eval(&rules, Some(&f), "missing", "x".to_string()).unwrap(),
            "x"
        );
        assert_eq!(eval(&rules, Some(&f), "label", "y".to_string()).unwrap(), "y");
    }

    #[test]
    fn test_type_mismatch_surfaces() {
        let sheet = parse_stylesheet("#a { w: wide; }").unwrap();
        let rules = select(sheet.flat_rules(), "a");
        assert!(matches!(
            eval(&rules, None, "w", 0i64),
            Err(EvaluationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_custom_registry() {
        let mut evaluator = Evaluator::new(FunctionRegistry::empty());
        evaluator
            .functions_mut()
            .register("answer", |_, _| Ok(Value::Int(42)));
        let sheet = parse_stylesheet("#a { w: answer(); c: rgb(1, 2, 3); }").unwrap();
        let rules = select(sheet.flat_rules(), "a");
        assert_eq!(evaluator.eval(&rules, None, "w", 0i64).unwrap(), 42);
        assert!(matches!(
            evaluator.eval(&rules, None, "c", Rgb::BLACK),
            Err(EvaluationError::UnknownFunction { .. })
        ));
    }
}
