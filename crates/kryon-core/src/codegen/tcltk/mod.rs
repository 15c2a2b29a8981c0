//! Tcl/Tk code generator.
//!
//! Widget-constructor style: each component becomes a Tk widget command
//! with a hierarchical path (`.w1.w3`), packed into its parent. Reactive
//! variables are plain Tcl variables; `trace add variable` propagates
//! changes to bound widgets, and `-textvariable` gives two-way input
//! binding for free.

pub mod expr;

use crate::codegen::emit::CodeWriter;
use crate::codegen::unroll::{instantiate_template, unrollable_elements};
use crate::codegen::CodegenError;
use crate::context::CompilationContext;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::kir::manifest::{ReactiveType, ReactiveValue, COMPONENT_SCOPE};
use crate::kir::{
    BindingKind, ComponentNode, Expression, KirDocument, LogicBlock, ReactiveTable,
};

use super::c::reactive::{formatted_binding, generate_scoped_var_name};
use expr::{escape_tcl_string, TclLowering};

/// Generate the Tcl/Tk script for a document.
pub fn generate(
    doc: &KirDocument,
    ctx: &mut CompilationContext,
    output_path: &str,
) -> Result<String, CodegenError> {
    let mut w = CodeWriter::new();

    w.writeln("#!/usr/bin/env wish");
    w.writeln("package require Tk");
    w.blank_line();
    for import in &doc.imports {
        w.writeln(&format!("source {import}.tcl"));
    }
    if !doc.imports.is_empty() {
        w.blank_line();
    }

    w.writeln(&format!(
        "wm title . {}",
        escape_tcl_string(&doc.app.window_title)
    ));
    w.writeln(&format!(
        "wm geometry . {}x{}",
        doc.app.window_width, doc.app.window_height
    ));
    w.blank_line();

    write_reactive_variables(&mut w, &ctx.reactive);
    write_handlers(&mut w, doc, &ctx.reactive, output_path)?;

    if let Some(ref root) = doc.root {
        let mut emitter = WidgetEmitter::new(
            &ctx.reactive,
            &doc.logic,
            &mut ctx.diagnostics,
            output_path,
        );
        emitter.emit_widget(&mut w, root, "", "Column")?;
    }

    Ok(w.finish())
}

fn write_reactive_variables(w: &mut CodeWriter, reactive: &ReactiveTable) {
    if reactive.is_empty() {
        return;
    }
    w.writeln("# Reactive state");
    for var in reactive.iter() {
        let name = generate_scoped_var_name(&var.name, &var.scope);
        let initial = match (&var.ty, &var.initial) {
            (ReactiveType::String, ReactiveValue::String(s)) => escape_tcl_string(s),
            (ReactiveType::Bool, ReactiveValue::Bool(b)) => {
                if *b { "1" } else { "0" }.to_string()
            }
            (_, ReactiveValue::Number(n)) => super::c::expr::render_number(*n),
            _ => "0".to_string(),
        };
        w.writeln(&format!("set {name} {initial}"));
    }
    w.blank_line();
}

fn write_handlers(
    w: &mut CodeWriter,
    doc: &KirDocument,
    reactive: &ReactiveTable,
    output_path: &str,
) -> Result<(), CodegenError> {
    if doc.logic.functions.is_empty() {
        return Ok(());
    }

    w.writeln("# Event handlers");
    for func in &doc.logic.functions {
        if !func.has_universal() {
            if let Some(source) = func.source_for("tcl") {
                w.writeln(&format!("proc {} {{}} {{", func.name));
                w.indented(|w| {
                    for line in source.lines() {
                        w.writeln(line);
                    }
                });
                w.writeln("}");
                w.blank_line();
            }
            continue;
        }

        w.writeln(&format!("proc {} {{}} {{", func.name));
        w.indent();

        // Tcl procs see globals only through `global` declarations.
        let globals = handler_globals(func, reactive);
        if !globals.is_empty() {
            w.writeln(&format!("global {}", globals.join(" ")));
        }

        let mut lowering = TclLowering::new(reactive, output_path);
        for stmt in &func.statements {
            lowering.stmt_to_tcl(w, stmt)?;
        }

        w.dedent();
        w.writeln("}");
        w.blank_line();
    }
    Ok(())
}

/// Global variables a handler touches: every free variable of its body
/// that is not one of its parameters.
fn handler_globals(func: &crate::kir::LogicFunction, reactive: &ReactiveTable) -> Vec<String> {
    use crate::kir::{AssignTarget, Statement};

    fn visit(stmt: &Statement, out: &mut Vec<String>) {
        match stmt {
            Statement::VarDecl { init, .. } => {
                if let Some(init) = init {
                    init.free_vars(out);
                }
            }
            Statement::Assign { target, value } => {
                if let AssignTarget::Name(name) = target {
                    if !out.iter().any(|v| v == name) {
                        out.push(name.clone());
                    }
                }
                value.free_vars(out);
            }
            Statement::Return(Some(e)) | Statement::Expr(e) => e.free_vars(out),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.free_vars(out);
                for s in then_branch.iter().chain(else_branch) {
                    visit(s, out);
                }
            }
            Statement::While { condition, body } => {
                condition.free_vars(out);
                for s in body {
                    visit(s, out);
                }
            }
            Statement::ForEach { source, body, .. } => {
                source.free_vars(out);
                for s in body {
                    visit(s, out);
                }
            }
            Statement::Block(stmts) => {
                for s in stmts {
                    visit(s, out);
                }
            }
            _ => {}
        }
    }

    let mut vars = Vec::new();
    for stmt in &func.statements {
        visit(stmt, &mut vars);
    }
    vars.retain(|name| {
        reactive.resolve(name, None).is_some()
            || !func.params.iter().any(|p| &p.name == name)
    });
    vars
}

// ============================================================================
// Widget emission
// ============================================================================

struct WidgetEmitter<'a> {
    reactive: &'a ReactiveTable,
    logic: &'a LogicBlock,
    diagnostics: &'a mut Diagnostics,
    lowering: TclLowering<'a>,
    counter: u32,
    current_scope: Option<String>,
}

impl<'a> WidgetEmitter<'a> {
    fn new(
        reactive: &'a ReactiveTable,
        logic: &'a LogicBlock,
        diagnostics: &'a mut Diagnostics,
        output_path: &str,
    ) -> Self {
        Self {
            reactive,
            logic,
            diagnostics,
            lowering: TclLowering::new(reactive, output_path),
            counter: 0,
            current_scope: None,
        }
    }

    fn fresh_path(&mut self, parent: &str) -> String {
        let path = format!("{parent}.w{}", self.counter);
        self.counter += 1;
        path
    }

    fn resolve_var(&self, name: &str) -> Option<String> {
        self.reactive
            .resolve(name, self.current_scope.as_deref())
            .map(|var| generate_scoped_var_name(&var.name, &var.scope))
    }

    fn emit_widget(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        parent: &str,
        parent_kind: &str,
    ) -> Result<(), CodegenError> {
        let previous_scope = self.current_scope.clone();
        if let Some(ref scope) = node.scope {
            self.current_scope = Some(scope.clone());
        }
        let result = self.emit_widget_inner(w, node, parent, parent_kind);
        self.current_scope = previous_scope;
        result
    }

    fn emit_widget_inner(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        parent: &str,
        parent_kind: &str,
    ) -> Result<(), CodegenError> {
        if node.kind == "For" {
            return self.emit_for_node(w, node, parent, parent_kind);
        }

        // Reusable components are procs that build their own subtree.
        if let Some(ref reference) = node.component_ref {
            let path = self.fresh_path(parent);
            let arg = node.arg.as_deref().unwrap_or("{}");
            w.writeln(&format!("{reference} {path} {arg}"));
            return Ok(());
        }

        let path = self.fresh_path(parent);
        let command = widget_command(&node.kind);
        let mut options = String::new();

        self.push_size_options(&mut options, node);
        self.push_color_options(&mut options, node);
        self.push_typography_options(&mut options, node);
        self.push_text_options(&mut options, node);
        self.push_event_options(&mut options, node);

        w.writeln(&format!("{command} {path}{options}"));
        self.emit_pack(w, node, parent_kind, &path);
        self.emit_trace_bindings(w, node, &path);

        let child_kind = node.kind.clone();
        for child in &node.children {
            self.emit_widget(w, child, &path, &child_kind)?;
        }
        Ok(())
    }

    // ========== Options, in canonical category order ==========

    fn push_size_options(&mut self, options: &mut String, node: &ComponentNode) {
        for (key, option) in [("width", "-width"), ("height", "-height")] {
            if let Some(value) = node.properties.get(key) {
                if let Some(text) = dimension_value(value) {
                    options.push_str(&format!(" {option} {text}"));
                }
            }
        }
    }

    fn push_color_options(&mut self, options: &mut String, node: &ComponentNode) {
        if let Some(color) = node.properties.get("background").and_then(|v| v.as_str()) {
            if color != "#00000000" {
                options.push_str(&format!(" -background {}", tk_color(color)));
            }
        }
        if let Some(color) = node.properties.get("color").and_then(|v| v.as_str()) {
            if color != "#00000000" {
                options.push_str(&format!(" -foreground {}", tk_color(color)));
            }
        }
    }

    fn push_typography_options(&mut self, options: &mut String, node: &ComponentNode) {
        let size = node
            .properties
            .get("fontSize")
            .and_then(|v| v.as_number())
            .map(|n| n.as_f64().round() as i64);
        let bold = node.properties.get("fontBold").and_then(|v| v.as_bool()) == Some(true);
        match (size, bold) {
            (Some(size), true) => {
                options.push_str(&format!(" -font {{TkDefaultFont {size} bold}}"))
            }
            (Some(size), false) => options.push_str(&format!(" -font {{TkDefaultFont {size}}}")),
            (None, true) => options.push_str(" -font {TkDefaultFont 10 bold}"),
            (None, false) => {}
        }
    }

    fn push_text_options(&mut self, options: &mut String, node: &ComponentNode) {
        // Two-way bindings and bound text use -textvariable; the trace
        // machinery handles computed templates.
        if let Some(binding) = node.property_bindings.get("text") {
            match (&binding.kind, &binding.source) {
                (BindingKind::TwoWay, Expression::Var(name))
                | (BindingKind::StaticTemplate, Expression::Var(name)) => {
                    match self.resolve_var(name) {
                        Some(var) => {
                            options.push_str(&format!(" -textvariable {var}"));
                            return;
                        }
                        None => self.binding_warning(name, node.id, "text"),
                    }
                }
                _ => {
                    // Computed templates bind through a companion variable
                    // created in emit_trace_bindings.
                    return;
                }
            }
        }

        if let Some(ref name) = node.text_expression {
            if let Some(var) = self.resolve_var(name) {
                options.push_str(&format!(" -textvariable {var}"));
                return;
            }
        }

        if let Some(ref text) = node.text {
            options.push_str(&format!(" -text {}", escape_tcl_string(text)));
        }

        // Checkbox state binds its variable directly.
        if node.kind == "Checkbox" {
            if let Some(binding) = node.property_bindings.get("checked") {
                if let Expression::Var(ref name) = binding.source {
                    match self.resolve_var(name) {
                        Some(var) => options.push_str(&format!(" -variable {var}")),
                        None => self.binding_warning(name, node.id, "checked"),
                    }
                }
            }
        }
    }

    fn push_event_options(&mut self, options: &mut String, node: &ComponentNode) {
        for event in &node.events {
            if event.event != "click" {
                continue;
            }
            let handler = self
                .logic
                .handler_for(node.id, &event.event)
                .unwrap_or(event.logic_id.as_str());
            let name = match self.current_scope.as_deref() {
                Some(scope) if scope != COMPONENT_SCOPE => {
                    generate_scoped_var_name(handler, scope)
                }
                _ => handler.to_string(),
            };
            options.push_str(&format!(" -command {name}"));
        }
    }

    // ========== Packing and traces ==========

    fn emit_pack(&mut self, w: &mut CodeWriter, node: &ComponentNode, parent_kind: &str, path: &str) {
        let side = if parent_kind == "Row" { "left" } else { "top" };
        let mut pack = format!("pack {path} -side {side}");

        if let Some(padding) = node.properties.get("padding").and_then(|v| v.as_number()) {
            let value = padding.as_f64().round() as i64;
            pack.push_str(&format!(" -padx {value} -pady {value}"));
        }
        if matches!(
            node.properties.get("width").and_then(|v| v.as_str()),
            Some("100.0px") | Some("100.0%")
        ) {
            pack.push_str(" -fill both -expand 1");
        }
        w.writeln(&pack);
    }

    fn emit_trace_bindings(&mut self, w: &mut CodeWriter, node: &ComponentNode, path: &str) {
        let widget_id = path.replace('.', "_");

        // Computed text templates: companion variable kept fresh by a
        // variable trace on each dependency.
        if let Some(binding) = node.property_bindings.get("text") {
            if binding.kind == BindingKind::StaticTemplate
                && !matches!(binding.source, Expression::Var(_))
            {
                if let Some(fmt) = formatted_binding(&binding.source) {
                    match self.resolve_var(&fmt.variable) {
                        Some(var) => {
                            let companion = format!("kryon{widget_id}_text");
                            let template = fmt.format.replace("%s", &format!("${var}"));
                            w.writeln(&format!("set {companion} \"\""));
                            w.writeln(&format!("proc kryon_update{widget_id} {{args}} {{"));
                            w.indented(|w| {
                                w.writeln(&format!("global {var} {companion}"));
                                w.writeln(&format!("set {companion} \"{template}\""));
                            });
                            w.writeln("}");
                            w.writeln(&format!(
                                "trace add variable {var} write kryon_update{widget_id}"
                            ));
                            w.writeln(&format!("kryon_update{widget_id}"));
                            w.writeln(&format!("{path} configure -textvariable {companion}"));
                        }
                        None => self.binding_warning(&fmt.variable, node.id, "text"),
                    }
                }
            }
        }

        // Conditional visibility: a trace re-packs or hides the subtree,
        // keeping its widget identity stable.
        if let Some(ref cond) = node.visible_condition {
            match self.resolve_var(&cond.variable) {
                Some(var) => {
                    let test = if cond.when_true {
                        format!("${var}")
                    } else {
                        format!("!${var}")
                    };
                    w.writeln(&format!("proc kryon_update{widget_id}_visible {{args}} {{"));
                    w.indented(|w| {
                        w.writeln(&format!("global {var}"));
                        w.writeln(&format!("if {{{test}}} {{"));
                        w.indented(|w| w.writeln(&format!("pack {path}")));
                        w.writeln("} else {");
                        w.indented(|w| w.writeln(&format!("pack forget {path}")));
                        w.writeln("}");
                    });
                    w.writeln("}");
                    w.writeln(&format!(
                        "trace add variable {var} write kryon_update{widget_id}_visible"
                    ));
                    w.writeln(&format!("kryon_update{widget_id}_visible"));
                }
                None => self.binding_warning(&cond.variable, node.id, "visible"),
            }
        }
    }

    // ========== For nodes ==========

    fn emit_for_node(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        parent: &str,
        parent_kind: &str,
    ) -> Result<(), CodegenError> {
        let Some(ref for_def) = node.for_def else {
            w.writeln("# UNSUPPORTED: For without for_def");
            return Ok(());
        };

        if let Some(elements) = unrollable_elements(&for_def.source) {
            for element in &elements {
                for child in &node.children {
                    let instantiated = instantiate_template(child, &for_def.item_name, element);
                    self.emit_widget(w, &instantiated, parent, parent_kind)?;
                }
            }
            return Ok(());
        }

        // Dynamic iteration: widget paths are made unique with a counter.
        let item = &for_def.item_name;
        let source = self.lowering.value_to_tcl(&for_def.source);
        let loop_id = self.fresh_path(parent).replace('.', "_");
        let index = format!("kryon{loop_id}_i");

        w.writeln(&format!("set {index} 0"));
        w.writeln(&format!("foreach {item} {source} {{"));
        w.indent();
        for child in &node.children {
            self.emit_loop_child(w, child, parent, parent_kind, item, &index)?;
        }
        w.writeln(&format!("incr {index}"));
        w.dedent();
        w.writeln("}");
        Ok(())
    }

    /// Emit one template child inside a dynamic loop body. The loop item
    /// is an opaque runtime value, so item-bound text renders as `$item`.
    fn emit_loop_child(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        parent: &str,
        parent_kind: &str,
        item: &str,
        index: &str,
    ) -> Result<(), CodegenError> {
        let path = format!("{parent}.item${{{index}}}_{}", self.counter);
        self.counter += 1;

        let command = widget_command(&node.kind);
        let mut options = String::new();
        self.push_color_options(&mut options, node);
        self.push_typography_options(&mut options, node);

        if node.text_expression.as_deref() == Some(item) {
            options.push_str(&format!(" -text ${item}"));
        } else if let Some(ref text) = node.text {
            options.push_str(&format!(" -text {}", escape_tcl_string(text)));
        }

        w.writeln(&format!("{command} {path}{options}"));
        let side = if parent_kind == "Row" { "left" } else { "top" };
        w.writeln(&format!("pack {path} -side {side}"));

        for child in &node.children {
            self.emit_loop_child(w, child, &path, &node.kind, item, index)?;
        }
        Ok(())
    }

    fn binding_warning(&mut self, variable: &str, node_id: u32, prop: &str) {
        self.diagnostics.push(
            Diagnostic::warning(format!(
                "binding references unregistered reactive variable '{variable}'"
            ))
            .with_context(format!("node {node_id}, property '{prop}'"))
            .with_note("falling back to the property's default value"),
        );
    }
}

/// Fixed `ComponentKind` -> Tk widget command table.
fn widget_command(kind: &str) -> &'static str {
    match kind {
        "Text" => "label",
        "Button" => "button",
        "Input" => "entry",
        "Checkbox" => "checkbutton",
        "Dropdown" => "ttk::combobox",
        "Image" => "label",
        _ => "frame",
    }
}

/// Numeric pixel value of a dimension property, when it has one.
fn dimension_value(value: &crate::kir::PropertyValue) -> Option<String> {
    use crate::kir::PropertyValue;
    match value {
        PropertyValue::Number(n) => Some((n.as_f64().round() as i64).to_string()),
        PropertyValue::String(s) => {
            let numeric: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            if numeric.is_empty() {
                None
            } else {
                Some(numeric)
            }
        }
        _ => None,
    }
}

/// Tk colors have no alpha channel: `#RRGGBBAA` -> `#RRGGBB`.
fn tk_color(color: &str) -> String {
    if color.len() == 9 && color.starts_with('#') {
        color[..7].to_string()
    } else {
        color.to_string()
    }
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
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_counter_script_generation() {
        let doc = counter_doc();
        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "counter.tcl").unwrap();

        assert!(output.contains("package require Tk"));
        assert!(output.contains("wm title . \"Counter\""));
        assert!(output.contains("wm geometry . 400x300"));
        assert!(output.contains("set count 0"));
        assert!(output.contains("proc handler_2_click {} {"));
        assert!(output.contains("global count"));
        assert!(output.contains("set count [expr {($count + 1)}]"));
        assert!(output.contains("-textvariable count"));
        assert!(output.contains("-command handler_2_click"));
        assert!(!ctx.has_errors());
    }

    #[test]
    fn test_formatted_binding_gets_trace() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Column",
                "children": [{
                    "id": 1,
                    "type": "Text",
                    "property_bindings": {
                        "text": {
                            "binding_type": "static_template",
                            "source_expr": {
                                "op": "add",
                                "left": "Total: ",
                                "right": {"var": "count"}
                            }
                        }
                    }
                }]
            },
            "reactive_manifest": {
                "variables": [
                    {"name": "count", "scope": "component", "type": "int", "initial_value": 0}
                ]
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.tcl").unwrap();

        assert!(output.contains("trace add variable count write"));
        assert!(output.contains("Total: $count"));
        assert!(output.contains("configure -textvariable"));
    }

    #[test]
    fn test_static_unroll_has_no_foreach() {
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
        let output = generate(&doc, &mut ctx, "app.tcl").unwrap();

        assert!(!output.contains("foreach"));
        assert_eq!(output.matches("-text \"").count(), 3);
    }

    #[test]
    fn test_dynamic_for_uses_foreach() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Column",
                "children": [{
                    "id": 1,
                    "type": "For",
                    "for_def": {"item_name": "habit", "source": {"var": "habits"}},
                    "children": [
                        {"id": 2, "type": "Text", "text_expression": "habit"}
                    ]
                }]
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.tcl").unwrap();

        assert!(output.contains("foreach habit $habits {"));
        assert!(output.contains("-text $habit"));
    }

    #[test]
    fn test_visibility_negation_trace() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Column",
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
        let output = generate(&doc, &mut ctx, "app.tcl").unwrap();

        assert!(output.contains("if {!$showDetails} {"));
        assert!(output.contains("pack forget"));
        assert!(output.contains("trace add variable showDetails write"));
    }

    #[test]
    fn test_two_way_input_binding() {
        let doc = parse_document(&json!({
            "root": {
                "id": 0,
                "type": "Column",
                "children": [{
                    "id": 1,
                    "type": "Input",
                    "property_bindings": {
                        "text": {"binding_type": "two_way", "source_expr": "name"}
                    }
                }]
            },
            "reactive_manifest": {
                "variables": [
                    {"name": "name", "scope": "component", "type": "string",
                     "initial_value": ""}
                ]
            }
        }))
        .unwrap();

        let mut ctx = CompilationContext::for_document(&doc);
        let output = generate(&doc, &mut ctx, "app.tcl").unwrap();

        assert!(output.contains("entry"));
        assert!(output.contains("-textvariable name"));
    }
}
