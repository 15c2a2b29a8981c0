//! Main compiler driver.
//!
//! This module provides the high-level API for compiling KIR documents
//! through the entire pipeline: load -> validate combo -> generate.

use std::path::Path;

use crate::codegen::{self, CodegenError, Target};
use crate::context::CompilationContext;
use crate::kir::{parse_document_str, KirDocument, SchemaError};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation error.
#[derive(Debug)]
pub enum CompileError {
    /// Malformed KIR document.
    Schema(SchemaError),
    /// Code generation error.
    Codegen(CodegenError),
    /// IO error.
    Io(std::io::Error),
}

impl From<SchemaError> for CompileError {
    fn from(e: SchemaError) -> Self {
        CompileError::Schema(e)
    }
}

impl From<CodegenError> for CompileError {
    fn from(e: CodegenError) -> Self {
        CompileError::Codegen(e)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Schema(e) => write!(f, "{e}"),
            CompileError::Codegen(e) => write!(f, "{e}"),
            CompileError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// A generated output file, rendered fully in memory before any write.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Compiler instance: one loaded document plus its compilation context.
#[derive(Debug)]
pub struct Compiler {
    doc: KirDocument,
    ctx: CompilationContext,
}

impl Compiler {
    /// Load a KIR document from JSON text.
    pub fn from_str(input: &str) -> CompileResult<Self> {
        let doc = parse_document_str(input)?;
        let ctx = CompilationContext::for_document(&doc);
        Ok(Self { doc, ctx })
    }

    /// Load a KIR document from a file.
    pub fn load_file(path: impl AsRef<Path>) -> CompileResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn document(&self) -> &KirDocument {
        &self.doc
    }

    pub fn context(&self) -> &CompilationContext {
        &self.ctx
    }

    /// Generate target source for this document.
    ///
    /// Returns the rendered files: the main output, plus a companion
    /// header when the document is a C utility module. Nothing touches
    /// disk here; callers write the files after generation succeeds, so a
    /// failed build never leaves a partial file.
    pub fn generate(
        &mut self,
        target: Target,
        output_path: &str,
    ) -> CompileResult<Vec<GeneratedFile>> {
        let content = codegen::generate(&self.doc, &mut self.ctx, target, output_path)?;

        let mut files = vec![GeneratedFile {
            path: output_path.to_string(),
            content,
        }];

        if target.language == codegen::Language::C && self.doc.is_utility_module() {
            let module_name = Path::new(output_path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("module");
            let header_path = Path::new(output_path)
                .with_extension("h")
                .to_string_lossy()
                .into_owned();
            files.push(GeneratedFile {
                path: header_path,
                content: codegen::c::generate_module_header(&self.doc, module_name),
            });
        }

        Ok(files)
    }

    /// Generate and write the output files.
    pub fn generate_to_disk(&mut self, target: Target, output_path: &str) -> CompileResult<()> {
        let files = self.generate(target, output_path)?;
        for file in &files {
            std::fs::write(&file.path, &file.content)?;
            tracing::info!(path = %file.path, bytes = file.content.len(), "wrote output");
        }
        Ok(())
    }

    pub fn has_errors(&self) -> bool {
        self.ctx.has_errors()
    }

    /// Render all diagnostics.
    pub fn render_diagnostics(&self) -> String {
        self.ctx.diagnostics.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instruction, Opcode};
    use crate::codegen::{Language, Toolkit};

    const COUNTER_KIR: &str = r#"{
        "app": {"windowTitle": "Counter", "windowWidth": 400, "windowHeight": 300},
        "root": {
            "id": 0,
            "type": "Column",
            "children": [
                {
                    "id": 1,
                    "type": "Text",
                    "text_expression": "count",
                    "property_bindings": {
                        "text": {"binding_type": "static_template", "source_expr": "count"}
                    }
                },
                {
                    "id": 2,
                    "type": "Button",
                    "text": "+",
                    "events": [{"type": "click", "logic_id": "increment"}]
                }
            ]
        },
        "reactive_manifest": {
            "variables": [
                {"name": "count", "scope": "component", "type": "int", "initial_value": 0}
            ]
        },
        "logic_block": {
            "functions": {
                "increment": {
                    "universal": {
                        "statements": [
                            {"op": "assign", "target": "count",
                             "expr": {"op": "add", "left": {"var": "count"}, "right": 1}}
                        ]
                    }
                }
            },
            "event_bindings": [
                {"component_id": 2, "event": "click", "handler": "increment"}
            ]
        }
    }"#;

    #[test]
    fn test_full_pipeline_c() {
        let mut compiler = Compiler::from_str(COUNTER_KIR).unwrap();
        let target = Target::new(Language::C, Toolkit::Raylib);
        let files = compiler.generate(target, "counter.c").unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].content.contains("KRYON_APP("));
        assert!(!compiler.has_errors());
    }

    #[test]
    fn test_full_pipeline_tcl() {
        let mut compiler = Compiler::from_str(COUNTER_KIR).unwrap();
        let target = Target::new(Language::Tcl, Toolkit::Tk);
        let files = compiler.generate(target, "counter.tcl").unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].content.contains("package require Tk"));
    }

    #[test]
    fn test_bytecode_sibling_artifact() {
        let compiler = Compiler::from_str(COUNTER_KIR).unwrap();
        let registry = &compiler.context().registry;

        // count is state 0, increment offset 1.
        let func = registry.function(1).expect("increment should compile");
        assert_eq!(
            func.instructions,
            vec![
                Instruction::get_state(0),
                Instruction::push_int(1),
                Instruction::plain(Opcode::Add),
                Instruction::set_state(0),
                Instruction::plain(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn test_same_document_generates_for_both_targets() {
        // Independent contexts per target: separate compiler instances.
        let mut c = Compiler::from_str(COUNTER_KIR).unwrap();
        let mut tcl = Compiler::from_str(COUNTER_KIR).unwrap();

        let c_out = c
            .generate(Target::new(Language::C, Toolkit::Sdl3), "app.c")
            .unwrap();
        let tcl_out = tcl
            .generate(Target::new(Language::Tcl, Toolkit::Tk), "app.tcl")
            .unwrap();

        assert!(c_out[0].content.contains("ON_CLICK(increment)"));
        assert!(tcl_out[0].content.contains("-command increment"));
    }

    #[test]
    fn test_schema_error_reported_before_generation() {
        let err = Compiler::from_str("{\"root\": {\"id\": 1}}").unwrap_err();
        assert!(matches!(err, CompileError::Schema(_)));
        assert!(err.to_string().contains("root.type"));
    }

    #[test]
    fn test_arithmetic_round_trip_through_vm() {
        use crate::bytecode::{Value, Vm};

        // (4 + 2) * 3 lowered for C should equal the VM interpreting the
        // same arithmetic over instructions.
        let mut vm = Vm::new();
        vm.execute(&[
            Instruction::push_int(4),
            Instruction::push_int(2),
            Instruction::plain(Opcode::Add),
            Instruction::push_int(3),
            Instruction::plain(Opcode::Mul),
        ])
        .unwrap();
        assert_eq!(vm.pop(), Some(Value::Int(18)));
    }
}
