//! Flattening nested rules into a priority-ordered list.
//!
//! Each flat rule carries the merged selector of a rule and all of its
//! ancestors plus the declarations in effect at that level. Later entries
//! take precedence during evaluation. A rule's own entry sits where its first
//! declaration appeared relative to its nested rules, so nested rules written
//! after the declarations win over them.

use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::cql::{Expression, Filter};
use crate::style::{Rule, Selector, Stylesheet};

/// A rule with its selector context fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRule {
    selector: Selector,
    declarations: IndexMap<String, Expression>,
}

impl FlatRule {
    pub(crate) fn new(selector: Selector, declarations: IndexMap<String, Expression>) -> Self {
        FlatRule {
            selector,
            declarations,
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.selector.filter.as_ref()
    }

    pub fn attachment(&self) -> Option<&str> {
        self.selector.attachment.as_deref()
    }

    pub fn declarations(&self) -> &IndexMap<String, Expression> {
        &self.declarations
    }

    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.declarations.get(key)
    }
}

impl fmt::Display for FlatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.selector)?;
        for (key, value) in &self.declarations {
            write!(f, " {}: {};", key, value)?;
        }
        write!(f, " }}")
    }
}

/// Selector and declarations accumulated down one branch of the rule tree.
struct Scope {
    selector: Selector,
    declarations: IndexMap<String, Expression>,
}

impl Scope {
    fn enter(parent: Option<&Scope>, selector: &Selector, rule: &Rule) -> Scope {
        let (selector, mut declarations) = match parent {
            Some(parent) => (parent.selector.merge(selector), parent.declarations.clone()),
            None => (selector.clone(), IndexMap::new()),
        };
        for (key, value) in rule.declarations() {
            declarations.insert(key.clone(), value.clone());
        }
        Scope {
            selector,
            declarations,
        }
    }
}

enum Work<'a> {
    Expand {
        rule: &'a Rule,
        scope: Option<Rc<Scope>>,
    },
    Emit(Rc<Scope>),
}

/// Flatten a stylesheet. Same as `Stylesheet::flat_rules`, without memoisation.
pub fn flatten(stylesheet: &Stylesheet) -> Vec<FlatRule> {
    flatten_rules(stylesheet.rules())
}

/// Depth-first flattening over an explicit work stack.
pub(crate) fn flatten_rules(rules: &[Rule]) -> Vec<FlatRule> {
    let mut work: Vec<Work> = rules
        .iter()
        .rev()
        .map(|rule| Work::Expand { rule, scope: None })
        .collect();
    let mut flat = Vec::new();

    while let Some(item) = work.pop() {
        match item {
            Work::Emit(scope) => {
                let scope = Rc::try_unwrap(scope).unwrap_or_else(|shared| Scope {
                    selector: shared.selector.clone(),
                    declarations: shared.declarations.clone(),
                });
                flat.push(FlatRule::new(scope.selector, scope.declarations));
            }
            Work::Expand { rule, scope } => {
                // a rule that only groups nested rules has no entry of its own
                let emits_self = rule.nested().is_empty() || !rule.declarations().is_empty();
                let position = rule.own_position().min(rule.nested().len());

                let mut items = Vec::new();
                for selector in rule.selectors() {
                    let merged = Rc::new(Scope::enter(scope.as_deref(), selector, rule));
                    for (i, child) in rule.nested().iter().enumerate() {
                        if emits_self && i == position {
                            items.push(Work::Emit(Rc::clone(&merged)));
                        }
                        items.push(Work::Expand {
                            rule: child,
                            scope: Some(Rc::clone(&merged)),
                        });
                    }
                    if emits_self && position == rule.nested().len() {
                        items.push(Work::Emit(merged));
                    }
                }
                work.extend(items.into_iter().rev());
            }
        }
    }

    tracing::debug!("Flattened {} rule(s) into {}", rules.len(), flat.len());
    flat
}

/// Partition by attachment, in order of first appearance. Rules without an
/// attachment form their own group.
pub fn group_by_attachment(rules: &[FlatRule]) -> IndexMap<Option<&str>, Vec<&FlatRule>> {
    let mut groups: IndexMap<Option<&str>, Vec<&FlatRule>> = IndexMap::new();
    for rule in rules {
        groups.entry(rule.attachment()).or_default().push(rule);
    }
    groups
}

/// Attribute paths read by any filter or declaration value.
pub fn referenced_properties<'a, I>(rules: I) -> IndexSet<String>
where
    I: IntoIterator<Item = &'a FlatRule>,
{
    let mut out = IndexSet::new();
    for rule in rules {
        if let Some(filter) = rule.filter() {
            filter.collect_properties(&mut out);
        }
        for value in rule.declarations().values() {
            value.collect_properties(&mut out);
        }
    }
    out
}
