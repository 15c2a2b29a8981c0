//! Compilation context.
//!
//! One context instance per build invocation, passed by reference through
//! the tree walk and the bytecode compiler, and discarded at the end.
//! Builds for different targets never share a context (or the registry
//! inside it).

use crate::bytecode::registry::MetadataRegistry;
use crate::bytecode::{compile_handler, CompileOutcome};
use crate::diagnostic::Diagnostics;
use crate::kir::{KirDocument, ReactiveTable};

/// Per-build compilation state: the reactive-variable table, the metadata
/// registry, and collected diagnostics. Read-mostly during the tree walk;
/// written only during the initial registration pass.
#[derive(Debug, Default)]
pub struct CompilationContext {
    pub reactive: ReactiveTable,
    pub registry: MetadataRegistry,
    pub diagnostics: Diagnostics,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self {
            reactive: ReactiveTable::new(),
            registry: MetadataRegistry::with_known_hosts(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Build a context for a document: copies the reactive manifest and
    /// runs the bytecode compiler over every handler, registering compiled
    /// functions. Handlers that are not universal stay in the logic block
    /// and are transpiled by the backend.
    pub fn for_document(doc: &KirDocument) -> Self {
        let mut ctx = Self::new();
        ctx.reactive = doc.reactive.clone();

        for func in &doc.logic.functions {
            if !func.has_universal() {
                continue;
            }
            if let CompileOutcome::Compiled(compiled) =
                compile_handler(func, &ctx.reactive, &ctx.registry)
            {
                ctx.registry.register_function(compiled);
            }
        }

        tracing::debug!(
            reactive_vars = ctx.reactive.len(),
            bytecode_functions = ctx.registry.functions().len(),
            "compilation context ready"
        );
        ctx
    }

    /// True when the named handler was compiled to bytecode (and so needs
    /// no transpiled body).
    pub fn is_bytecode_handler(&self, name: &str) -> bool {
        self.registry.function_by_name(name).is_some()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::parse_document;
    use serde_json::json;

    #[test]
    fn test_for_document_compiles_universal_handlers() {
        let doc = parse_document(&json!({
            "reactive_manifest": {
                "variables": [
                    {"name": "count", "scope": "component", "type": "int", "initial_value": 0}
                ]
            },
            "logic_block": {
                "functions": {
                    "inc": {
                        "universal": {
                            "statements": [
                                {"op": "assign", "target": "count",
                                 "expr": {"op": "add", "left": {"var": "count"}, "right": 1}}
                            ]
                        }
                    },
                    "complex": {
                        "universal": {
                            "statements": [
                                {"op": "assign", "target": "count", "expr": 0},
                                {"op": "assign", "target": "count", "expr": 1}
                            ]
                        }
                    }
                }
            }
        }))
        .unwrap();

        let ctx = CompilationContext::for_document(&doc);
        assert!(ctx.is_bytecode_handler("inc"));
        assert!(!ctx.is_bytecode_handler("complex"));
        // count is state 0, increment offset 1.
        assert!(ctx.registry.function(1).is_some());
    }
}
