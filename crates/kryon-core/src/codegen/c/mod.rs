//! C code generator.
//!
//! Emits the macro-call widget DSL of the Kryon C runtime: one `.c` file
//! per app document (struct definitions, reactive signals, transpiled
//! handlers, `main()` with the component tree), or a header/implementation
//! pair for utility modules. Bytecode-compiled handlers are a sibling
//! artifact; the C output always carries the transpiled form so runtimes
//! that call generated functions directly keep working.

pub mod components;
pub mod expr;
pub mod reactive;

use crate::codegen::emit::CodeWriter;
use crate::codegen::{include_guard, CodegenError};
use crate::context::CompilationContext;
use crate::kir::{
    ComponentNode, ConstDeclaration, Expression, KirDocument, LogicFunction, StructType,
};

use components::TreeEmitter;
use expr::{c_type_for, CLowering};
use reactive::{
    generate_scoped_var_name, write_signal_cleanup, write_signal_declarations,
    write_signal_initialization,
};

/// Generate the C source for a document.
pub fn generate(
    doc: &KirDocument,
    ctx: &mut CompilationContext,
    output_path: &str,
) -> Result<String, CodegenError> {
    let mut w = CodeWriter::new();

    write_includes(&mut w, doc);
    write_struct_definitions(&mut w, &doc.structures.struct_types);
    write_signal_declarations(&mut w, &ctx.reactive);
    write_const_declarations(&mut w, doc, ctx, output_path)?;
    write_handlers(&mut w, doc, ctx, output_path)?;

    if doc.is_utility_module() {
        write_exported_functions(&mut w, doc, ctx, output_path)?;
    } else if doc.root.is_some() {
        write_main(&mut w, doc, ctx, output_path)?;
    }

    Ok(w.finish())
}

/// Generate the companion header for a utility module.
pub fn generate_module_header(doc: &KirDocument, module_name: &str) -> String {
    let guard = include_guard(module_name);
    let mut w = CodeWriter::new();

    w.writeln(&format!("#ifndef {guard}"));
    w.writeln(&format!("#define {guard}"));
    w.blank_line();
    w.writeln("#include <kryon/kryon.h>");
    w.blank_line();

    write_struct_definitions(&mut w, &doc.structures.struct_types);

    for export in &doc.structures.exports {
        if let Some(func) = doc.logic.find_function(&export.name) {
            w.writeln(&format!("{};", function_signature(func, false)));
        } else if let Some(decl) = doc
            .structures
            .const_declarations
            .iter()
            .find(|d| d.name == export.name)
        {
            if decl.is_array() {
                w.writeln(&format!("extern void* {};", decl.name));
                w.writeln(&format!("extern int {}_count;", decl.name));
            } else {
                w.writeln(&format!("extern {} {};", c_type_for(&decl.ty), decl.name));
            }
        }
    }

    w.blank_line();
    w.writeln(&format!("#endif /* {guard} */"));
    w.finish()
}

// ============================================================================
// File sections
// ============================================================================

fn write_includes(w: &mut CodeWriter, doc: &KirDocument) {
    w.writeln("#include <kryon/kryon.h>");
    w.writeln("#include <stdbool.h>");
    for import in &doc.imports {
        w.writeln(&format!("#include \"{import}.h\""));
    }
    w.blank_line();
}

fn write_struct_definitions(w: &mut CodeWriter, struct_types: &[StructType]) {
    for def in struct_types {
        w.writeln(&format!("/* Struct: {} */", def.name));
        w.writeln("typedef struct {");
        w.indented(|w| {
            for field in &def.fields {
                w.writeln(&format!("{} {};", struct_field_type(&field.ty), field.name));
            }
        });
        w.writeln(&format!("}} {};", def.name));
        w.blank_line();
    }
}

fn struct_field_type(kir_type: &str) -> &'static str {
    // Struct fields own their strings, unlike locals.
    match kir_type {
        "string" => "char*",
        "int" | "number" => "int",
        "float" => "float",
        "bool" => "bool",
        _ => "void*",
    }
}

fn write_const_declarations(
    w: &mut CodeWriter,
    doc: &KirDocument,
    ctx: &mut CompilationContext,
    output_path: &str,
) -> Result<(), CodegenError> {
    let decls = &doc.structures.const_declarations;
    if decls.is_empty() {
        return Ok(());
    }

    let lowering = CLowering::new(&ctx.reactive, output_path);

    for decl in decls {
        if decl.is_array() {
            // Arrays get a companion count variable and are filled by the
            // init function below.
            w.writeln(&format!("void* {} = NULL;", decl.name));
            w.writeln(&format!("int {}_count = 0;", decl.name));
        } else if decl.is_function_result() {
            w.writeln(&format!("void* {} = NULL;", decl.name));
        } else {
            let ty = c_type_for(&decl.ty);
            match &decl.value {
                Some(value) => w.writeln(&format!(
                    "{ty} {} = {};",
                    decl.name,
                    lowering.expr_to_c(value)
                )),
                None => w.writeln(&format!("{ty} {};", decl.name)),
            }
        }
    }
    w.blank_line();

    write_array_init(w, decls, &lowering, "kryon_init_arrays", |d| {
        d.is_array()
    });
    write_array_init(w, decls, &lowering, "kryon_init_function_arrays", |d| {
        d.is_function_result()
    });

    Ok(())
}

fn write_array_init(
    w: &mut CodeWriter,
    decls: &[ConstDeclaration],
    lowering: &CLowering<'_>,
    func_name: &str,
    select: impl Fn(&ConstDeclaration) -> bool,
) {
    let selected: Vec<&ConstDeclaration> = decls.iter().filter(|d| select(d)).collect();
    if selected.is_empty() {
        return;
    }

    w.writeln(&format!("static void {func_name}(void) {{"));
    w.indented(|w| {
        for decl in selected {
            match &decl.value {
                Some(Expression::Array(elements)) => {
                    w.writeln(&format!(
                        "{} = kryon_array_create({});",
                        decl.name,
                        elements.len()
                    ));
                    for (i, element) in elements.iter().enumerate() {
                        w.writeln(&format!(
                            "kryon_array_set({}, {i}, {});",
                            decl.name,
                            lowering.expr_to_c(element)
                        ));
                    }
                    w.writeln(&format!("{}_count = {};", decl.name, elements.len()));
                }
                Some(value) => {
                    w.writeln(&format!("{} = {};", decl.name, lowering.expr_to_c(value)));
                }
                None => {}
            }
        }
    });
    w.writeln("}");
    w.blank_line();
}

// ============================================================================
// Handlers
// ============================================================================

fn function_signature(func: &LogicFunction, is_static: bool) -> String {
    let params = if func.params.is_empty() {
        "void".to_string()
    } else {
        func.params
            .iter()
            .map(|p| format!("{} {}", c_type_for(&p.ty), p.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let linkage = if is_static { "static " } else { "" };
    format!("{linkage}void {}({params})", func.name)
}

/// Collect the `(handler, scope)` pairs referenced by the tree, so each
/// component instance gets its own scope-qualified handler function.
fn collect_handler_scopes(root: &ComponentNode) -> Vec<(String, Option<String>)> {
    fn walk(node: &ComponentNode, scope: Option<&str>, out: &mut Vec<(String, Option<String>)>) {
        let scope = node.scope.as_deref().or(scope);
        for event in &node.events {
            let entry = (event.logic_id.clone(), scope.map(String::from));
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        for child in &node.children {
            walk(child, scope, out);
        }
    }

    let mut out = Vec::new();
    walk(root, None, &mut out);
    out
}

fn write_handlers(
    w: &mut CodeWriter,
    doc: &KirDocument,
    ctx: &mut CompilationContext,
    output_path: &str,
) -> Result<(), CodegenError> {
    if doc.logic.functions.is_empty() || doc.is_utility_module() {
        return Ok(());
    }

    let referenced = doc
        .root
        .as_ref()
        .map(collect_handler_scopes)
        .unwrap_or_default();

    let mut emitted: Vec<(String, Option<String>)> = Vec::new();
    let mut bodies = CodeWriter::new();
    let mut declarations = CodeWriter::new();

    for func in &doc.logic.functions {
        // Every scope that instantiates this handler gets its own copy;
        // handlers never referenced from the tree are emitted unscoped.
        let mut scopes: Vec<Option<String>> = referenced
            .iter()
            .filter(|(name, _)| name == &func.name)
            .map(|(_, scope)| scope.clone())
            .collect();
        if scopes.is_empty() {
            scopes.push(None);
        }

        for scope in scopes {
            let emitted_name = match scope.as_deref() {
                Some(s) => generate_scoped_var_name(&func.name, s),
                None => func.name.clone(),
            };
            let key = (emitted_name.clone(), scope.clone());
            if emitted.contains(&key) {
                continue;
            }
            emitted.push(key);

            declarations.writeln(&format!("static void {emitted_name}(void);"));

            bodies.writeln(&format!("static void {emitted_name}(void) {{"));
            bodies.indent();
            if func.has_universal() {
                let mut lowering = CLowering::new(&ctx.reactive, output_path);
                lowering.current_scope = scope.clone();
                for decl in &doc.structures.const_declarations {
                    lowering.add_global(&decl.name);
                }
                lowering.reset_locals();
                for stmt in &func.statements {
                    lowering.stmt_to_c(&mut bodies, stmt)?;
                }
            } else if let Some(source) = func.source_for("c") {
                // Embedded native source is carried through verbatim.
                for line in source.lines() {
                    bodies.writeln(line);
                }
            }
            bodies.dedent();
            bodies.writeln("}");
            bodies.blank_line();
        }
    }

    w.writeln("// Event handlers");
    for line in declarations.finish().lines() {
        w.writeln(line);
    }
    w.blank_line();
    for line in bodies.finish().lines() {
        w.writeln(line);
    }
    Ok(())
}

fn write_exported_functions(
    w: &mut CodeWriter,
    doc: &KirDocument,
    ctx: &mut CompilationContext,
    output_path: &str,
) -> Result<(), CodegenError> {
    for export in &doc.structures.exports {
        let Some(func) = doc.logic.find_function(&export.name) else {
            continue;
        };

        w.writeln(&format!("{} {{", function_signature(func, false)));
        w.indent();
        let mut lowering = CLowering::new(&ctx.reactive, output_path);
        for decl in &doc.structures.const_declarations {
            lowering.add_global(&decl.name);
        }
        for param in &func.params {
            lowering.add_local(&param.name);
        }
        for stmt in &func.statements {
            lowering.stmt_to_c(w, stmt)?;
        }
        w.dedent();
        w.writeln("}");
        w.blank_line();
    }
    Ok(())
}

// ============================================================================
// main()
// ============================================================================

fn write_main(
    w: &mut CodeWriter,
    doc: &KirDocument,
    ctx: &mut CompilationContext,
    output_path: &str,
) -> Result<(), CodegenError> {
    let root = doc.root.as_ref().expect("write_main requires a root tree");

    let has_arrays = doc
        .structures
        .const_declarations
        .iter()
        .any(ConstDeclaration::is_array);
    let has_function_results = doc
        .structures
        .const_declarations
        .iter()
        .any(ConstDeclaration::is_function_result);

    w.writeln("int main(void) {");
    w.indent();

    w.writeln(&format!(
        "kryon_init({}, {}, {});",
        expr::escape_c_string(&doc.app.window_title),
        doc.app.window_width,
        doc.app.window_height
    ));
    w.blank_line();

    if has_arrays {
        w.writeln("kryon_init_arrays();");
    }
    if has_function_results {
        w.writeln("kryon_init_function_arrays();");
    }
    if has_arrays || has_function_results {
        w.blank_line();
    }

    write_signal_initialization(w, &ctx.reactive);

    w.writeln("KRYON_APP(");
    w.indent();
    {
        let mut emitter = TreeEmitter::new(
            &ctx.reactive,
            &doc.logic,
            &mut ctx.diagnostics,
            output_path,
        );
        emitter.emit_component(w, root)?;
    }
    w.newline();
    w.dedent();
    w.writeln(");");
    w.blank_line();

    w.writeln("KRYON_RUN();");
    w.blank_line();

    write_signal_cleanup(w, &ctx.reactive);
    if has_arrays {
        w.writeln("kryon_cleanup_arrays();");
    }
    w.writeln("return 0;");

    w.dedent();
    w.writeln("}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::parse_document;
    use serde_json::json;

    fn counter_doc() -> KirDocument {
        parse_document(&json!({
            "app": {"windowTitle": "Counter", "windowWidth": 400, "windowHeight": 300},
            "root": {
                "id": 0,
                "type": "Column",
                "gap": 8,
                "children": [
                    {
                        "id": 1,
                        "type": "Text",
                        "text_expression": "count",
                        "fontSize": 24,
                        "property_bindings": {
                            "text": {"binding_type": "static_template", "source_expr": "count"}
                        }
                    },
                    {
                        "id": 2,
                        "type": "Button",
                        "text": "+",
                        "width": "120.0px",
                        "events": [{"type": "click", "logic_id": "handler_2_click"}]
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
                    "handler_2_click": {
                        "universal": {
                            "statements": [
                                {"op": "assign", "target": "count",
                                 "expr": {"op": "add", "left": {"var": "count"}, "right": 1}}
                            ]
                        }
                    }
                },
                "event_bindings": [
                    {"component_id": 2, "event": "click", "handler": "handler_2_click"}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_counter_app_generation() {
        let doc = counter_doc();
        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "counter.c").unwrap();

        assert!(output.contains("#include <kryon/kryon.h>"));
        assert!(output.contains("KryonSignal* count_signal = NULL;"));
        assert!(output.contains("count_signal = kryon_signal_create_int(0);"));
        assert!(output.contains("static void handler_2_click(void)"));
        assert!(output.contains("kryon_signal_set(count_signal, (count + 1));"));
        assert!(output.contains("kryon_init(\"Counter\", 400, 300);"));
        assert!(output.contains("BIND_TEXT(count_signal)"));
        assert!(output.contains("ON_CLICK(handler_2_click)"));
        assert!(output.contains("kryon_signal_destroy(count_signal);"));
        assert!(!ctx.has_errors());
    }

    #[test]
    fn test_generation_is_deterministic() {
        let doc = counter_doc();
        let mut ctx_a = CompilationContext::for_document(&doc);
        let mut ctx_b = CompilationContext::for_document(&doc);
        let a = generate(&doc, &mut ctx_a, "counter.c").unwrap();
        let b = generate(&doc, &mut ctx_b, "counter.c").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_property_category_order() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Container",
                "alignItems": "center",
                "background": "#112233ff",
                "fontSize": 14,
                "gap": 4,
                "width": "200.0px",
                "events": []
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.c").unwrap();

        // size -> color -> spacing -> typography -> alignment.
        let width = output.find("WIDTH(200)").unwrap();
        let color = output.find("BG_COLOR(0x112233ff)").unwrap();
        let gap = output.find("GAP(4)").unwrap();
        let font = output.find("FONT_SIZE(14)").unwrap();
        let align = output.find("ALIGN_CENTER").unwrap();
        assert!(width < color && color < gap && gap < font && font < align);
    }

    #[test]
    fn test_static_for_unrolls_without_loop_construct() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Column",
                "children": [{
                    "id": 1,
                    "type": "For",
                    "for_def": {
                        "item_name": "label",
                        "source": {"op": "array_literal", "elements": ["a", "b", "c"]}
                    },
                    "children": [
                        {"id": 2, "type": "Text", "text_expression": "label"}
                    ]
                }]
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.c").unwrap();

        assert!(!output.contains("FOR_EACH"));
        assert_eq!(output.matches("TEXT(").count(), 3);
        assert!(output.contains("TEXT(\"a\")"));
        assert!(output.contains("TEXT(\"b\")"));
        assert!(output.contains("TEXT(\"c\")"));
    }

    #[test]
    fn test_dynamic_for_emits_runtime_loop() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Column",
                "children": [{
                    "id": 1,
                    "type": "For",
                    "for_def": {
                        "item_name": "habit",
                        "source": {"var": "habits"}
                    },
                    "children": [
                        {"id": 2, "type": "Text", "text": "row"}
                    ]
                }]
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.c").unwrap();
        assert!(output.contains("FOR_EACH(habit, habits, habits_count,"));
    }

    #[test]
    fn test_visible_condition_negation() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Container",
                "children": [{
                    "id": 1,
                    "type": "Text",
                    "text": "details",
                    "visible_condition": {"variable": "showDetails", "when_true": false}
                }]
            },
            "reactive_manifest": {
                "variables": [
                    {"name": "showDetails", "scope": "component", "type": "bool",
                     "initial_value": true}
                ]
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.c").unwrap();
        assert!(output.contains("BIND_VISIBLE_NOT(showDetails_signal)"));
    }

    #[test]
    fn test_unregistered_binding_warns_and_continues() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Text",
                "property_bindings": {
                    "text": {"binding_type": "static_template", "source_expr": "ghost"}
                }
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.c").unwrap();

        assert!(!output.contains("BIND_TEXT"));
        assert!(!ctx.has_errors());
        assert_eq!(ctx.diagnostics.len(), 1);
        assert!(ctx.diagnostics.render().contains("ghost"));
    }

    #[test]
    fn test_unsupported_statement_aborts_generation() {
        let doc = parse_document(&json!({
            "root": {"id": 0, "type": "Container"},
            "logic_block": {
                "functions": {
                    "weird": {
                        "universal": {
                            "statements": [{"op": "defer", "expr": 1}]
                        }
                    }
                }
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let err = generate(&doc, &mut ctx, "app.c").unwrap_err();
        match err {
            CodegenError::UnsupportedStatement { op, output_path } => {
                assert_eq!(op, "defer");
                assert_eq!(output_path, "app.c");
            }
            other => panic!("expected UnsupportedStatement, got {other}"),
        }
    }

    #[test]
    fn test_utility_module_header_pair() {
        let doc = parse_document(&json!({
            "source_structures": {
                "struct_types": [
                    {"name": "Habit", "fields": [
                        {"name": "name", "type": "string"},
                        {"name": "done", "type": "bool"}
                    ]}
                ],
                "const_declarations": [
                    {"name": "habits", "scope": "global", "value_type": "array", "type": "Habit",
                     "value": {"op": "array_literal", "elements": []}}
                ],
                "exports": [
                    {"name": "reset_all", "kind": "function"},
                    {"name": "habits", "kind": "const"}
                ]
            },
            "logic_block": {
                "functions": {
                    "reset_all": {
                        "universal": {
                            "statements": [{"op": "assign", "target": "habits_dirty", "expr": true}]
                        }
                    }
                }
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let header = generate_module_header(&doc, "widgets/habits.kry");
        assert!(header.contains("#ifndef WIDGETS_HABITS_KRY_H"));
        assert!(header.contains("typedef struct {"));
        assert!(header.contains("void reset_all(void);"));
        assert!(header.contains("extern void* habits;"));
        assert!(header.contains("extern int habits_count;"));

        let impl_file = generate(&doc, &mut ctx, "habits.c").unwrap();
        assert!(impl_file.contains("void reset_all(void) {"));
        assert!(impl_file.contains("void* habits = NULL;"));
        assert!(impl_file.contains("int habits_count = 0;"));
    }

    #[test]
    fn test_imports_emit_includes() {
        let doc = parse_document(&json!({
            "root": {"id": 0, "type": "Container"},
            "imports": ["widgets/habits", "util"]
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.c").unwrap();
        assert!(output.contains("#include \"widgets/habits.h\""));
        assert!(output.contains("#include \"util.h\""));
    }

    #[test]
    fn test_scoped_component_handlers() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Container",
                "children": [{
                    "id": 1,
                    "type": "Container",
                    "scope": "Counter_0",
                    "children": [{
                        "id": 2,
                        "type": "Button",
                        "text": "+",
                        "events": [{"type": "click", "logic_id": "handler_inc"}]
                    }]
                }]
            },
            "reactive_manifest": {
                "variables": [
                    {"name": "count", "scope": "Counter_0", "type": "int", "initial_value": 0}
                ]
            },
            "logic_block": {
                "functions": {
                    "handler_inc": {
                        "universal": {
                            "statements": [
                                {"op": "assign", "target": "count",
                                 "expr": {"op": "add", "left": {"var": "count"}, "right": 1}}
                            ]
                        }
                    }
                }
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.c").unwrap();

        assert!(output.contains("ON_CLICK(handler_inc_Counter_0)"));
        assert!(output.contains("static void handler_inc_Counter_0(void)"));
        assert!(output.contains("kryon_signal_set(count_Counter_0_signal,"));
    }
}
