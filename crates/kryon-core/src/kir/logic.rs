//! Logic block: handler functions and event bindings.
//!
//! A handler is represented either as a [`LogicFunction`] (statements to be
//! transpiled into target source) or as a precompiled
//! [`BytecodeFunction`](crate::bytecode::BytecodeFunction) in the metadata
//! registry — exactly one of the two per handler. The bytecode compiler
//! decides which at build time.

use serde::{Deserialize, Serialize};

use super::expr::Statement;

/// A handler parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicParam {
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub ty: String,
}

fn default_param_type() -> String {
    "any".to_string()
}

/// A transpiled handler: a name plus its statement body.
#[derive(Debug, Clone, Serialize)]
pub struct LogicFunction {
    pub name: String,
    pub params: Vec<LogicParam>,
    pub statements: Vec<Statement>,
    /// Pre-written per-language sources, keyed by language name. Used when
    /// the front end embeds native code instead of universal statements.
    pub sources: Vec<(String, String)>,
}

impl LogicFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            statements: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// True when this function carries universal statements (as opposed to
    /// only embedded per-language source).
    pub fn has_universal(&self) -> bool {
        !self.statements.is_empty()
    }

    pub fn source_for(&self, language: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|(lang, _)| lang == language)
            .map(|(_, src)| src.as_str())
    }
}

/// Associates a component's event with a handler function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBinding {
    pub component_id: u32,
    pub event: String,
    pub handler: String,
}

/// The logic block of a KIR document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogicBlock {
    pub functions: Vec<LogicFunction>,
    pub event_bindings: Vec<EventBinding>,
}

impl LogicBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_function(&self, name: &str) -> Option<&LogicFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn bindings_for_component(&self, component_id: u32) -> Vec<&EventBinding> {
        self.event_bindings
            .iter()
            .filter(|b| b.component_id == component_id)
            .collect()
    }

    pub fn handler_for(&self, component_id: u32, event: &str) -> Option<&str> {
        self.event_bindings
            .iter()
            .find(|b| b.component_id == component_id && b.event == event)
            .map(|b| b.handler.as_str())
    }
}
