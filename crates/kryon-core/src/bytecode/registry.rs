//! Metadata registry: host-function declarations and compiled handlers.
//!
//! One registry instance lives on the compilation context for the duration
//! of a build; builds for different targets never share one. Registration
//! is append-only and idempotent per id: repeated macro expansion in the
//! front end may re-register the same function, and the first registration
//! wins without error.

use serde::Serialize;

use super::BytecodeFunction;

/// First id of the host-function namespace, disjoint from state-derived
/// handler ids.
pub const HOST_FUNCTION_ID_BASE: u32 = 10_000;

/// The bounded host-call set the bytecode compiler recognizes, registered
/// in this order at context construction so ids are build-stable.
pub const KNOWN_HOST_FUNCTIONS: &[&str] = &["log", "print", "navigate"];

/// A declared host function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFunctionDecl {
    pub id: u32,
    pub name: String,
}

/// Process-local registry of host declarations and bytecode functions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataRegistry {
    host_functions: Vec<HostFunctionDecl>,
    functions: Vec<BytecodeFunction>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-seeded with the known host-call set.
    pub fn with_known_hosts() -> Self {
        let mut registry = Self::new();
        for name in KNOWN_HOST_FUNCTIONS {
            registry.register_host_function(name);
        }
        registry
    }

    /// Register a host function by name, returning its id. Re-registering
    /// an existing name returns the original id.
    pub fn register_host_function(&mut self, name: &str) -> u32 {
        if let Some(decl) = self.host_functions.iter().find(|d| d.name == name) {
            return decl.id;
        }
        let id = HOST_FUNCTION_ID_BASE + self.host_functions.len() as u32;
        self.host_functions.push(HostFunctionDecl {
            id,
            name: name.to_string(),
        });
        id
    }

    pub fn host_function_id(&self, name: &str) -> Option<u32> {
        self.host_functions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.id)
    }

    pub fn host_function_name(&self, id: u32) -> Option<&str> {
        self.host_functions
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.name.as_str())
    }

    /// Register a compiled handler. A second registration with the same id
    /// is a no-op; the first registration wins.
    pub fn register_function(&mut self, func: BytecodeFunction) {
        if self.functions.iter().any(|f| f.id == func.id) {
            return;
        }
        self.functions.push(func);
    }

    pub fn function(&self, id: u32) -> Option<&BytecodeFunction> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&BytecodeFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> &[BytecodeFunction] {
        &self.functions
    }

    pub fn host_functions(&self) -> &[HostFunctionDecl] {
        &self.host_functions
    }
}
