//! Template rendering
//!
//! Rendering is pure: a template body plus an immutable [`Bindings`] map in,
//! a string out. Every variable the template references must be bound;
//! filesystem access belongs to the resource that writes the result.

use crate::error::{Error, Result};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::collections::BTreeMap;

/// Immutable variable bindings for one rendered file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    /// Start building a bindings map
    pub fn builder() -> BindingsBuilder {
        BindingsBuilder::default()
    }

    /// Look up a bound value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Check whether a name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Bound names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Builder for [`Bindings`]
#[derive(Debug, Default)]
pub struct BindingsBuilder {
    values: BTreeMap<String, String>,
}

impl BindingsBuilder {
    /// Bind a name; later bindings of the same name replace earlier ones
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Bindings {
        Bindings(self.values)
    }
}

/// A named template body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template<'a> {
    /// Identifier used in error messages
    pub name: &'a str,
    /// Template source in Jinja syntax (`{{ name }}`)
    pub source: &'a str,
}

impl<'a> Template<'a> {
    pub const fn new(name: &'a str, source: &'a str) -> Self {
        Self { name, source }
    }

    /// Names this template references that are not defined inside it
    pub fn variables(&self) -> Result<Vec<String>> {
        let mut env = environment();
        env.add_template(self.name, self.source)
            .map_err(|e| self.error(&e))?;
        let template = env.get_template(self.name).map_err(|e| self.error(&e))?;

        let mut names: Vec<String> = template.undeclared_variables(false).into_iter().collect();
        names.sort();
        Ok(names)
    }

    /// Render with the given bindings
    ///
    /// Fails with [`Error::UnboundVariable`] naming the first (sorted)
    /// variable the template needs but the bindings lack.
    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        let mut env = environment();
        env.add_template(self.name, self.source)
            .map_err(|e| self.error(&e))?;
        let template = env.get_template(self.name).map_err(|e| self.error(&e))?;

        let mut referenced: Vec<String> =
            template.undeclared_variables(false).into_iter().collect();
        referenced.sort();
        if let Some(missing) = referenced.into_iter().find(|n| !bindings.contains(n)) {
            return Err(Error::UnboundVariable {
                template: self.name.to_string(),
                name: missing,
            });
        }

        template.render(bindings).map_err(|e| self.error(&e))
    }

    fn error(&self, err: &minijinja::Error) -> Error {
        Error::Template {
            template: self.name.to_string(),
            message: err.to_string(),
        }
    }
}

/// Render a template body with bindings
pub fn render(template: &Template<'_>, bindings: &Bindings) -> Result<String> {
    template.render(bindings)
}

fn environment<'a>() -> Environment<'a> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    // Output is configuration, never HTML; values are written verbatim
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env
}
