use std::fmt;

use crate::cql::Filter;

/// One selector of a rule: `Map`, `#roads.major[lanes > 2]::casing`, `*`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector {
    pub name: Option<String>,
    pub id: Option<String>,
    /// Ordered, without duplicates.
    pub classes: Vec<String>,
    pub attachment: Option<String>,
    pub wildcard: bool,
    pub filter: Option<Filter>,
}

impl Selector {
    pub fn named(name: &str) -> Self {
        Selector {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_id(id: &str) -> Self {
        Selector {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn wildcard() -> Self {
        Selector {
            wildcard: true,
            ..Default::default()
        }
    }

    pub fn attachment(mut self, attachment: &str) -> Self {
        self.attachment = Some(attachment.to_string());
        self
    }

    pub fn filtered(mut self, filter: Filter) -> Self {
        self.add_filter(filter);
        self
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.classes.iter().any(|c| c == class) {
            self.classes.push(class.to_string());
        }
    }

    /// AND a filter into the selector's existing filter.
    pub fn add_filter(&mut self, filter: Filter) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
    }

    /// Has a name, id, class or wildcard to select layers by.
    pub fn has_target(&self) -> bool {
        self.name.is_some() || self.id.is_some() || !self.classes.is_empty() || self.wildcard
    }

    pub fn is_empty(&self) -> bool {
        !self.has_target() && self.attachment.is_none() && self.filter.is_none()
    }

    /// Combine with a selector nested inside this one.
    ///
    /// The nested side wins for name, id and attachment; classes accumulate and
    /// filters are ANDed.
    pub fn merge(&self, nested: &Selector) -> Selector {
        let name = nested.name.clone().or_else(|| self.name.clone());
        let id = nested.id.clone().or_else(|| self.id.clone());

        let mut merged = Selector {
            wildcard: (self.wildcard || nested.wildcard) && name.is_none() && id.is_none(),
            name,
            id,
            classes: self.classes.clone(),
            attachment: nested.attachment.clone().or_else(|| self.attachment.clone()),
            filter: self.filter.clone(),
        };
        for class in &nested.classes {
            merged.add_class(class);
        }
        if let Some(filter) = &nested.filter {
            merged.add_filter(filter.clone());
        }
        merged
    }

    /// Layer selection: exact id, case-insensitive name, or wildcard.
    pub fn selects(&self, target: &str) -> bool {
        self.wildcard
            || self.id.as_deref() == Some(target)
            || self
                .name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(target))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            write!(f, "*")?;
        }
        if let Some(name) = &self.name {
            write!(f, "{}", name)?;
        }
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        if let Some(filter) = &self.filter {
            write!(f, "[{}]", filter)?;
        }
        if let Some(attachment) = &self.attachment {
            write!(f, "::{}", attachment)?;
        }
        Ok(())
    }
}
