//! Component tree emission for the C backend.
//!
//! Walks the tree opening each node's macro construct before its children
//! (the macro-call style needs children nested inside the parent's
//! argument list) and closing it after them. Property emission follows a
//! canonical category order — size, position, color, spacing, typography,
//! layout alignment, events, bindings — so generated text is stable across
//! runs regardless of map iteration order.

use crate::codegen::emit::CodeWriter;
use crate::codegen::unroll::{instantiate_template, unrollable_elements};
use crate::codegen::CodegenError;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::kir::manifest::COMPONENT_SCOPE;
use crate::kir::{
    Binding, BindingKind, ComponentNode, Expression, LogicBlock, Number, PropertyValue,
    ReactiveTable,
};

use super::expr::CLowering;
use super::reactive::{
    formatted_binding, generate_scoped_var_name, signal_name_for, substitute_signals,
};

/// Fixed `ComponentKind` -> construct name table.
fn component_macro(kind: &str) -> &'static str {
    match kind {
        "Container" => "CONTAINER",
        "Column" => "COLUMN",
        "Row" => "ROW",
        "Center" => "CENTER",
        "Text" => "TEXT",
        "Button" => "BUTTON",
        "Input" => "INPUT",
        "Checkbox" => "CHECKBOX",
        "Dropdown" => "DROPDOWN",
        "Image" => "IMAGE",
        "Spacer" => "SPACER",
        "Grid" => "GRID",
        "GridRow" => "GRID_ROW",
        "GridCell" => "GRID_CELL",
        _ => "CONTAINER",
    }
}

/// A type name that is not a builtin widget names a reusable component.
fn is_custom_component(kind: &str) -> bool {
    component_macro(kind) == "CONTAINER"
        && kind != "Container"
        && kind.starts_with(|c: char| c.is_ascii_uppercase())
}

/// Component tree emitter state.
pub struct TreeEmitter<'a> {
    reactive: &'a ReactiveTable,
    logic: &'a LogicBlock,
    diagnostics: &'a mut Diagnostics,
    lowering: CLowering<'a>,
    current_scope: Option<String>,
}

impl<'a> TreeEmitter<'a> {
    pub fn new(
        reactive: &'a ReactiveTable,
        logic: &'a LogicBlock,
        diagnostics: &'a mut Diagnostics,
        output_path: &str,
    ) -> Self {
        Self {
            reactive,
            logic,
            diagnostics,
            lowering: CLowering::new(reactive, output_path),
            current_scope: None,
        }
    }

    /// Emit one component subtree. Does not write a trailing newline so
    /// the caller controls separators between siblings.
    pub fn emit_component(&mut self, w: &mut CodeWriter, node: &ComponentNode) -> Result<(), CodegenError> {
        let previous_scope = self.current_scope.clone();
        if let Some(ref scope) = node.scope {
            self.current_scope = Some(scope.clone());
            self.lowering.current_scope = Some(scope.clone());
        }

        let result = self.emit_component_inner(w, node);

        self.current_scope = previous_scope.clone();
        self.lowering.current_scope = previous_scope;
        result
    }

    fn emit_component_inner(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
    ) -> Result<(), CodegenError> {
        // Reference to a previously-defined reusable component.
        if let Some(ref reference) = node.component_ref {
            let arg = node.arg.as_deref().unwrap_or("");
            w.write(&format!("{reference}({arg})"));
            return Ok(());
        }
        if is_custom_component(&node.kind) {
            let arg = node.arg.as_deref().unwrap_or("");
            w.write(&format!("{}({arg})", node.kind));
            return Ok(());
        }

        // For-each template nodes are structurally distinct from widgets.
        if node.kind == "For" {
            return self.emit_for_node(w, node);
        }

        let macro_name = component_macro(&node.kind);
        w.write(&format!("{macro_name}("));

        let mut first = true;

        // Text argument comes first in the construct's argument list. A
        // reactive text binding leaves an empty literal; the value comes
        // from the signal.
        if node.text_expression.is_some() || node.property_bindings.contains_key("text") {
            w.write("\"\"");
            first = false;
        } else if let Some(ref text) = node.text {
            w.write(&super::expr::escape_c_string(text));
            first = false;
        }

        // Properties render into a staging buffer so the argument-list
        // commas can be placed without backtracking.
        let mut props = CodeWriter::new();
        props.indent();
        let mut first_prop = true;
        self.emit_properties(&mut props, node, &mut first_prop)?;
        let prop_text = props.finish();

        let has_props = !first_prop;
        let has_children = !node.children.is_empty();

        if has_props {
            if !first {
                w.write(",");
            }
            w.newline();
            // Keep the last property line open so a child separator can
            // continue it.
            let lines: Vec<&str> = prop_text.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if i + 1 < lines.len() {
                    w.writeln(line);
                } else {
                    w.write(line);
                }
            }
            first = false;
        }

        if has_children {
            if !first {
                w.writeln(",");
                w.newline();
            } else {
                w.newline();
            }
            w.indent();
            let count = node.children.len();
            for (i, child) in node.children.iter().enumerate() {
                self.emit_component(w, child)?;
                if i + 1 < count {
                    w.writeln(",");
                } else {
                    w.newline();
                }
            }
            w.dedent();
            w.write(")");
            return Ok(());
        }

        if has_props {
            w.newline();
        }
        w.write(")");
        Ok(())
    }

    // ========== Properties in canonical category order ==========

    fn emit_properties(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        first: &mut bool,
    ) -> Result<(), CodegenError> {
        self.emit_size(w, node, first);
        self.emit_position(w, node, first);
        self.emit_colors(w, node, first);
        self.emit_spacing(w, node, first);
        self.emit_typography(w, node, first);
        self.emit_alignment(w, node, first);
        self.emit_events(w, node, first);
        self.emit_bindings(w, node, first);
        Ok(())
    }

    fn emit_prop(&mut self, w: &mut CodeWriter, first: &mut bool, text: &str) {
        if !*first {
            w.writeln(",");
        }
        w.write(text);
        *first = false;
    }

    fn emit_size(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        let full_width = dimension_is_full(node.properties.get("width"));
        let full_height = dimension_is_full(node.properties.get("height"));

        if full_width && full_height {
            self.emit_prop(w, first, "FULL_SIZE");
        } else {
            if let Some(value) = node.properties.get("width") {
                let text = dimension_macro("WIDTH", "FULL_WIDTH", value, full_width);
                self.emit_prop(w, first, &text);
            }
            if let Some(value) = node.properties.get("height") {
                let text = dimension_macro("HEIGHT", "FULL_HEIGHT", value, full_height);
                self.emit_prop(w, first, &text);
            }
        }

        for (key, macro_name) in [
            ("minWidth", "MIN_WIDTH"),
            ("maxWidth", "MAX_WIDTH"),
            ("minHeight", "MIN_HEIGHT"),
            ("maxHeight", "MAX_HEIGHT"),
        ] {
            if let Some(value) = node.properties.get(key) {
                let text = dimension_macro(macro_name, macro_name, value, false);
                self.emit_prop(w, first, &text);
            }
        }
    }

    fn emit_position(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        for (key, macro_name) in [("x", "POS_X"), ("y", "POS_Y")] {
            if let Some(PropertyValue::Number(n)) = node.properties.get(key) {
                let text = format!("{macro_name}({})", render_scalar(*n));
                self.emit_prop(w, first, &text);
            }
        }
    }

    fn emit_colors(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        // Fully transparent is the default; emitting it would be noise.
        if let Some(color) = node.properties.get("background").and_then(PropertyValue::as_str) {
            if color != "#00000000" {
                let text = format!("BG_COLOR(0x{})", color.trim_start_matches('#'));
                self.emit_prop(w, first, &text);
            }
        }
        if let Some(color) = node.properties.get("color").and_then(PropertyValue::as_str) {
            if color != "#00000000" {
                let text = format!("TEXT_COLOR(0x{})", color.trim_start_matches('#'));
                self.emit_prop(w, first, &text);
            }
        }
    }

    fn emit_spacing(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        match node.properties.get("padding") {
            Some(PropertyValue::Number(n)) => {
                let text = format!("PADDING({})", render_scalar(*n));
                self.emit_prop(w, first, &text);
            }
            Some(PropertyValue::Array(sides)) if sides.len() == 4 => {
                let rendered: Vec<String> = sides
                    .iter()
                    .map(|s| s.as_number().map_or_else(|| "0".to_string(), render_scalar))
                    .collect();
                let text = format!("PADDING_SIDES({})", rendered.join(", "));
                self.emit_prop(w, first, &text);
            }
            _ => {}
        }
        for (key, macro_name) in [("margin", "MARGIN"), ("gap", "GAP")] {
            if let Some(PropertyValue::Number(n)) = node.properties.get(key) {
                let text = format!("{macro_name}({})", render_scalar(*n));
                self.emit_prop(w, first, &text);
            }
        }
    }

    fn emit_typography(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        if let Some(PropertyValue::Number(n)) = node.properties.get("fontSize") {
            let text = format!("FONT_SIZE({})", render_scalar(*n));
            self.emit_prop(w, first, &text);
        }
        if node.properties.get("fontBold").and_then(PropertyValue::as_bool) == Some(true) {
            self.emit_prop(w, first, "FONT_BOLD");
        }
    }

    fn emit_alignment(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        if let Some(value) = node.properties.get("justifyContent").and_then(PropertyValue::as_str) {
            let text = format!("JUSTIFY_{}", alignment_suffix(value));
            self.emit_prop(w, first, &text);
        }
        if let Some(value) = node.properties.get("alignItems").and_then(PropertyValue::as_str) {
            let suffix = match value {
                "stretch" => "STRETCH".to_string(),
                other => alignment_suffix(other),
            };
            let text = format!("ALIGN_{suffix}");
            self.emit_prop(w, first, &text);
        }
        if let Some(PropertyValue::Number(n)) = node.properties.get("flexShrink") {
            let text = format!("FLEX_SHRINK({})", render_scalar(*n));
            self.emit_prop(w, first, &text);
        }
        if let Some(visible) = node.properties.get("visible").and_then(PropertyValue::as_bool) {
            let text = format!("VISIBLE({visible})");
            self.emit_prop(w, first, &text);
        }
    }

    fn emit_events(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        for event in &node.events {
            let handler = self
                .logic
                .handler_for(node.id, &event.event)
                .unwrap_or(event.logic_id.as_str());

            // Handlers inside component instances are scope-qualified so
            // each instance gets its own function.
            let name = match self.current_scope.as_deref() {
                Some(scope) if scope != COMPONENT_SCOPE => {
                    generate_scoped_var_name(handler, scope)
                }
                _ => handler.to_string(),
            };

            let macro_name = match event.event.as_str() {
                "click" => "ON_CLICK",
                "change" => "ON_CHANGE",
                "submit" => "ON_SUBMIT",
                "hover" => "ON_HOVER",
                _ => continue,
            };
            let text = format!("{macro_name}({name})");
            self.emit_prop(w, first, &text);
        }
    }

    fn emit_bindings(&mut self, w: &mut CodeWriter, node: &ComponentNode, first: &mut bool) {
        if let Some(ref cond) = node.visible_condition {
            match self.reactive.resolve(&cond.variable, self.current_scope.as_deref()) {
                Some(var) => {
                    let signal = signal_name_for(&var.name, &var.scope);
                    // when_true == false binds to the negation of the signal.
                    let text = if cond.when_true {
                        format!("BIND_VISIBLE({signal})")
                    } else {
                        format!("BIND_VISIBLE_NOT({signal})")
                    };
                    self.emit_prop(w, first, &text);
                }
                None => self.binding_warning(&cond.variable, node.id, "visible"),
            }
        }

        for (prop, binding) in &node.property_bindings {
            match binding.kind {
                BindingKind::TwoWay => self.emit_two_way_binding(w, node, prop, binding, first),
                BindingKind::StaticTemplate => {
                    self.emit_template_binding(w, node, prop, binding, first)
                }
            }
        }

        // Fallback: text_expression naming a reactive variable, with no
        // explicit binding entry (expanded component instances).
        if !node.property_bindings.contains_key("text") {
            if let Some(ref name) = node.text_expression {
                if let Some(var) = self.reactive.resolve(name, self.current_scope.as_deref()) {
                    let text = format!("BIND_TEXT_EXPR({})", signal_name_for(&var.name, &var.scope));
                    self.emit_prop(w, first, &text);
                }
            }
        }
    }

    /// Two-way bindings wire both the read and the write-back callback in
    /// one construct; this is the only place the emitter generates a
    /// callback implicitly.
    fn emit_two_way_binding(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        prop: &str,
        binding: &Binding,
        first: &mut bool,
    ) {
        let Expression::Var(ref name) = binding.source else {
            self.diagnostics.push(
                Diagnostic::warning("two-way binding source must be a variable reference")
                    .with_context(format!("node {}, property '{prop}'", node.id)),
            );
            return;
        };
        match self.reactive.resolve(name, self.current_scope.as_deref()) {
            Some(var) => {
                let text = format!("BIND_INPUT_VALUE({})", signal_name_for(&var.name, &var.scope));
                self.emit_prop(w, first, &text);
            }
            None => self.binding_warning(name, node.id, prop),
        }
    }

    fn emit_template_binding(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        prop: &str,
        binding: &Binding,
        first: &mut bool,
    ) {
        // The restricted "prefix" + var shape gets the dedicated
        // formatted-binding construct.
        if let Some(fmt) = formatted_binding(&binding.source) {
            match self.reactive.resolve(&fmt.variable, self.current_scope.as_deref()) {
                Some(var) => {
                    let signal = signal_name_for(&var.name, &var.scope);
                    let text = format!(
                        "BIND_TEXT_FMT({}, {signal})",
                        super::expr::escape_c_string(&fmt.format)
                    );
                    self.emit_prop(w, first, &text);
                    return;
                }
                None => {
                    self.binding_warning(&fmt.variable, node.id, prop);
                    return;
                }
            }
        }

        // Bare variable references bind the property to the signal directly.
        if let Expression::Var(ref name) = binding.source {
            match self.reactive.resolve(name, self.current_scope.as_deref()) {
                Some(var) => {
                    let signal = signal_name_for(&var.name, &var.scope);
                    let text = match prop {
                        "text" => format!("BIND_TEXT({signal})"),
                        "visible" => format!("BIND_VISIBLE({signal})"),
                        "background" => format!("BIND_BACKGROUND({signal})"),
                        "color" => format!("BIND_COLOR({signal})"),
                        other => format!("BIND({other}, {signal})"),
                    };
                    self.emit_prop(w, first, &text);
                }
                None => self.binding_warning(name, node.id, prop),
            }
            return;
        }

        // General expressions render once and then have every free
        // reactive-variable occurrence substituted with its signal
        // identifier (identifier-boundary checked).
        let mut free = Vec::new();
        binding.source.free_vars(&mut free);
        let unresolved: Vec<&String> = free
            .iter()
            .filter(|name| {
                self.reactive
                    .resolve(name, self.current_scope.as_deref())
                    .is_none()
            })
            .collect();
        if !unresolved.is_empty() {
            self.binding_warning(unresolved[0], node.id, prop);
            return;
        }

        let rendered = self.lowering.expr_to_c(&binding.source);
        let substituted =
            substitute_signals(&rendered, self.reactive, self.current_scope.as_deref());
        let text = format!("BIND_EXPR({prop}, {substituted})");
        self.emit_prop(w, first, &text);
    }

    fn binding_warning(&mut self, variable: &str, node_id: u32, prop: &str) {
        // Binding errors are recoverable: the UI still renders with the
        // property's default, so warn and continue.
        self.diagnostics.push(
            Diagnostic::warning(format!(
                "binding references unregistered reactive variable '{variable}'"
            ))
            .with_context(format!("node {node_id}, property '{prop}'"))
            .with_note("falling back to the property's default value"),
        );
    }

    // ========== For-each nodes ==========

    fn emit_for_node(&mut self, w: &mut CodeWriter, node: &ComponentNode) -> Result<(), CodegenError> {
        let Some(ref for_def) = node.for_def else {
            // A For node without a definition renders nothing visible but
            // must not vanish silently.
            w.write("/* UNSUPPORTED: For without for_def */");
            return Ok(());
        };

        // Provably fixed collections unroll at build time so the rest of
        // the pipeline sees iteration variables as ordinary constants.
        if let Some(elements) = unrollable_elements(&for_def.source) {
            return self.emit_unrolled(w, node, &for_def.item_name, &elements);
        }

        // Dynamic iteration backed by a runtime length variable.
        let source = self.lowering.expr_to_c(&for_def.source);
        w.writeln(&format!(
            "FOR_EACH({}, {source}, {source}_count,",
            for_def.item_name
        ));
        w.indent();
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            self.emit_component(w, child)?;
            if i + 1 < count {
                w.writeln(",");
            } else {
                w.newline();
            }
        }
        w.dedent();
        w.write(")");
        Ok(())
    }

    fn emit_unrolled(
        &mut self,
        w: &mut CodeWriter,
        node: &ComponentNode,
        item: &str,
        elements: &[Expression],
    ) -> Result<(), CodegenError> {
        let mut emitted = 0;
        let total = elements.len() * node.children.len();
        for element in elements {
            for child in &node.children {
                let instantiated = instantiate_template(child, item, element);
                self.emit_component(w, &instantiated)?;
                emitted += 1;
                if emitted < total {
                    w.writeln(",");
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Rendering helpers
// ============================================================================

fn dimension_is_full(value: Option<&PropertyValue>) -> bool {
    matches!(
        value.and_then(PropertyValue::as_str),
        Some("100.0px") | Some("100.0%")
    )
}

fn dimension_macro(
    macro_name: &str,
    full_macro: &str,
    value: &PropertyValue,
    is_full: bool,
) -> String {
    if is_full {
        return full_macro.to_string();
    }
    match value {
        PropertyValue::Number(n) => format!("{macro_name}({})", render_scalar(*n)),
        PropertyValue::String(s) => {
            // Dimension strings carry a unit suffix ("200.0px" -> 200).
            let numeric: String = s
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if numeric.is_empty() {
                format!("{macro_name}(\"{s}\")")
            } else {
                format!("{macro_name}({numeric})")
            }
        }
        _ => format!("{macro_name}(0)"),
    }
}

fn render_scalar(n: Number) -> String {
    match n {
        Number::Int(v) => v.to_string(),
        Number::Float(v) => format!("{}", v.round() as i64),
    }
}

fn alignment_suffix(value: &str) -> String {
    match value {
        "center" => "CENTER".to_string(),
        "flex-start" | "start" => "START".to_string(),
        "flex-end" | "end" => "END".to_string(),
        "space-between" => "SPACE_BETWEEN".to_string(),
        "space-around" => "SPACE_AROUND".to_string(),
        _ => "CENTER".to_string(),
    }
}
