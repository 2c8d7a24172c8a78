use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexMap;

use super::selector::Selector;
use crate::cascade::{FlatRule, flatten_rules};
use crate::cql::Expression;

/// A rule block: selectors, declarations and nested rules, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rule {
    selectors: Vec<Selector>,
    declarations: IndexMap<String, Expression>,
    nested: Vec<Rule>,
    /// Nested rules that came before the first declaration.
    own_position: usize,
}

impl Rule {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Rule {
            selectors,
            ..Default::default()
        }
    }

    /// Add a declaration. A repeated key overwrites the earlier value but keeps its slot.
    pub fn declare(&mut self, key: impl Into<String>, value: Expression) {
        if self.declarations.is_empty() {
            self.own_position = self.nested.len();
        }
        self.declarations.insert(key.into(), value);
    }

    pub fn nest(&mut self, rule: Rule) {
        self.nested.push(rule);
    }

    pub fn with_declaration(mut self, key: impl Into<String>, value: Expression) -> Self {
        self.declare(key, value);
        self
    }

    pub fn with_nested(mut self, rule: Rule) -> Self {
        self.nest(rule);
        self
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn declarations(&self) -> &IndexMap<String, Expression> {
        &self.declarations
    }

    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.declarations.get(key)
    }

    pub fn nested(&self) -> &[Rule] {
        &self.nested
    }

    pub(crate) fn own_position(&self) -> usize {
        self.own_position
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.selectors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", selector)?;
        }
        write!(f, " {{")?;
        for (key, value) in &self.declarations {
            write!(f, " {}: {};", key, value)?;
        }
        for rule in &self.nested {
            write!(f, " {}", rule)?;
        }
        write!(f, " }}")
    }
}

/// A parsed stylesheet. The flattened form is computed once, on first use.
#[derive(Debug, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
    flat: OnceLock<Vec<FlatRule>>,
}

impl Stylesheet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Stylesheet {
            rules,
            flat: OnceLock::new(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn flat_rules(&self) -> &[FlatRule] {
        self.flat.get_or_init(|| flatten_rules(&self.rules))
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }
}

impl Clone for Stylesheet {
    fn clone(&self) -> Self {
        Stylesheet::new(self.rules.clone())
    }
}

impl PartialEq for Stylesheet {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}
