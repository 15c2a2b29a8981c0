//! Reactive variable manifest.
//!
//! Reactive variables are declared by the front end and lowered once per
//! target build into a declaration + initialization + cleanup triad.
//! Uniqueness is `(name, scope)`: two variables with the same base name in
//! different scopes are distinct signals.

use serde::{Deserialize, Serialize};

use super::expr::Number;

/// Scope name that marks a component-global variable.
pub const COMPONENT_SCOPE: &str = "component";

/// Value type of a reactive variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactiveType {
    Int,
    Float,
    String,
    Bool,
}

/// Initial value literal of a reactive variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReactiveValue {
    Number(Number),
    String(String),
    Bool(bool),
}

/// A declared reactive variable.
#[derive(Debug, Clone, Serialize)]
pub struct ReactiveVariable {
    pub name: String,
    /// Owning scope; [`COMPONENT_SCOPE`] means component-global.
    pub scope: String,
    pub ty: ReactiveType,
    pub initial: ReactiveValue,
}

impl ReactiveVariable {
    /// True when this variable lives in the component-global scope.
    pub fn is_component_scoped(&self) -> bool {
        self.scope == COMPONENT_SCOPE
    }
}

/// The reactive manifest: all variables, in registration order.
///
/// Registration order is significant: it determines the state id used by
/// the bytecode compiler, so it must be stable across builds of the same
/// document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReactiveTable {
    variables: Vec<ReactiveVariable>,
}

impl ReactiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Re-registering the same `(name, scope)` pair is
    /// a no-op so repeated front-end expansion stays idempotent.
    pub fn register(&mut self, var: ReactiveVariable) {
        if self.lookup(&var.name, &var.scope).is_none() {
            self.variables.push(var);
        }
    }

    /// Look up by `(name, scope)`.
    pub fn lookup(&self, name: &str, scope: &str) -> Option<&ReactiveVariable> {
        self.variables
            .iter()
            .find(|v| v.name == name && v.scope == scope)
    }

    /// Look up by bare name, preferring the given scope, then the
    /// component-global scope.
    pub fn resolve(&self, name: &str, scope: Option<&str>) -> Option<&ReactiveVariable> {
        if let Some(scope) = scope {
            if let Some(v) = self.lookup(name, scope) {
                return Some(v);
            }
        }
        self.lookup(name, COMPONENT_SCOPE)
            .or_else(|| self.variables.iter().find(|v| v.name == name))
    }

    /// State id of a variable: its registration index.
    pub fn state_id(&self, name: &str, scope: &str) -> Option<u32> {
        self.variables
            .iter()
            .position(|v| v.name == name && v.scope == scope)
            .map(|i| i as u32)
    }

    /// State id resolved the same way as [`ReactiveTable::resolve`].
    pub fn resolve_state_id(&self, name: &str, scope: Option<&str>) -> Option<u32> {
        let var = self.resolve(name, scope)?;
        self.state_id(&var.name, &var.scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReactiveVariable> {
        self.variables.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_var(name: &str, scope: &str, initial: i64) -> ReactiveVariable {
        ReactiveVariable {
            name: name.to_string(),
            scope: scope.to_string(),
            ty: ReactiveType::Int,
            initial: ReactiveValue::Number(Number::Int(initial)),
        }
    }

    #[test]
    fn test_same_name_different_scope_are_distinct() {
        let mut table = ReactiveTable::new();
        table.register(int_var("count", COMPONENT_SCOPE, 0));
        table.register(int_var("count", "Counter_0", 0));

        assert_eq!(table.len(), 2);
        assert_eq!(table.state_id("count", COMPONENT_SCOPE), Some(0));
        assert_eq!(table.state_id("count", "Counter_0"), Some(1));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut table = ReactiveTable::new();
        table.register(int_var("count", COMPONENT_SCOPE, 0));
        table.register(int_var("count", COMPONENT_SCOPE, 5));

        assert_eq!(table.len(), 1);
        // First registration wins.
        let var = table.lookup("count", COMPONENT_SCOPE).unwrap();
        assert_eq!(var.initial, ReactiveValue::Number(Number::Int(0)));
    }

    #[test]
    fn test_resolve_prefers_instance_scope() {
        let mut table = ReactiveTable::new();
        table.register(int_var("value", COMPONENT_SCOPE, 1));
        table.register(int_var("value", "Slider_2", 2));

        let resolved = table.resolve("value", Some("Slider_2")).unwrap();
        assert_eq!(resolved.scope, "Slider_2");

        let fallback = table.resolve("value", Some("Other_9")).unwrap();
        assert_eq!(fallback.scope, COMPONENT_SCOPE);
    }
}
