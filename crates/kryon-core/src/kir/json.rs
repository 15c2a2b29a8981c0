//! KIR JSON loading.
//!
//! Deserializes a KIR document into the typed model once, at load time,
//! with explicit schema errors naming the offending field. Lowering never
//! re-queries raw JSON.

use serde_json::Value;
use thiserror::Error;

use super::document::{
    AppConfig, ConstDeclaration, ExportDeclaration, KirDocument, SourceStructures, StructType,
};
use super::expr::{AssignTarget, BinOp, Expression, Number, Statement, UnaryOp};
use super::logic::{EventBinding, LogicBlock, LogicFunction, LogicParam};
use super::manifest::{ReactiveTable, ReactiveType, ReactiveValue, ReactiveVariable};
use super::node::{
    Binding, BindingKind, ComponentNode, EventRef, ForDef, PropertyValue, VisibleCondition,
};

/// Malformed or missing KIR fields. Reported immediately; generation never
/// starts on a document that fails to load.
#[derive(Error, Debug)]
#[error("schema error at {path}: {message}")]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, SchemaError>;

/// Parse a KIR document from JSON text.
pub fn parse_document_str(input: &str) -> Result<KirDocument> {
    let value: Value = serde_json::from_str(input)
        .map_err(|e| SchemaError::new("$", format!("invalid JSON: {e}")))?;
    parse_document(&value)
}

/// Parse a KIR document from a JSON value.
pub fn parse_document(value: &Value) -> Result<KirDocument> {
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::new("$", "document must be a JSON object"))?;

    let root = match obj.get("root") {
        Some(Value::Null) | None => None,
        Some(v) => Some(parse_component(v, "root")?),
    };

    let app = match obj.get("app") {
        Some(v) => serde_json::from_value::<AppConfig>(v.clone())
            .map_err(|e| SchemaError::new("app", e.to_string()))?,
        None => AppConfig::default(),
    };

    let reactive = match obj.get("reactive_manifest") {
        Some(v) => parse_reactive_manifest(v)?,
        None => ReactiveTable::new(),
    };

    let logic = match obj.get("logic_block") {
        Some(v) => parse_logic_block(v)?,
        None => LogicBlock::new(),
    };

    let structures = match obj.get("source_structures") {
        Some(v) => parse_source_structures(v)?,
        None => SourceStructures::default(),
    };

    let imports = match obj.get("imports") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_str().map(String::from).ok_or_else(|| {
                    SchemaError::new(format!("imports[{i}]"), "import must be a string")
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(SchemaError::new("imports", "imports must be an array")),
        None => Vec::new(),
    };

    Ok(KirDocument {
        root,
        app,
        reactive,
        logic,
        structures,
        imports,
    })
}

// ============================================================================
// Reactive manifest
// ============================================================================

fn parse_reactive_manifest(value: &Value) -> Result<ReactiveTable> {
    let variables = match value.get("variables") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(SchemaError::new(
                "reactive_manifest.variables",
                "variables must be an array",
            ))
        }
        None => return Ok(ReactiveTable::new()),
    };

    let mut table = ReactiveTable::new();
    for (i, var) in variables.iter().enumerate() {
        let path = format!("reactive_manifest.variables[{i}]");
        let name = require_str(var, "name", &path)?;
        let scope = var
            .get("scope")
            .and_then(Value::as_str)
            .unwrap_or(super::manifest::COMPONENT_SCOPE)
            .to_string();
        let ty = match var.get("type").and_then(Value::as_str) {
            Some("int") => ReactiveType::Int,
            Some("float") => ReactiveType::Float,
            Some("string") => ReactiveType::String,
            Some("bool") => ReactiveType::Bool,
            Some(other) => {
                return Err(SchemaError::new(
                    format!("{path}.type"),
                    format!("unknown reactive type '{other}'"),
                ))
            }
            None => {
                return Err(SchemaError::new(
                    format!("{path}.type"),
                    "missing required field",
                ))
            }
        };
        let initial = parse_reactive_value(var.get("initial_value"), ty);
        table.register(ReactiveVariable {
            name,
            scope,
            ty,
            initial,
        });
    }
    Ok(table)
}

fn parse_reactive_value(value: Option<&Value>, ty: ReactiveType) -> ReactiveValue {
    match value {
        Some(Value::Number(n)) => ReactiveValue::Number(number_from_json(n)),
        Some(Value::String(s)) => ReactiveValue::String(s.clone()),
        Some(Value::Bool(b)) => ReactiveValue::Bool(*b),
        // Missing or null: zero value of the declared type.
        _ => match ty {
            ReactiveType::Int => ReactiveValue::Number(Number::Int(0)),
            ReactiveType::Float => ReactiveValue::Number(Number::Float(0.0)),
            ReactiveType::String => ReactiveValue::String(String::new()),
            ReactiveType::Bool => ReactiveValue::Bool(false),
        },
    }
}

// ============================================================================
// Logic block
// ============================================================================

fn parse_logic_block(value: &Value) -> Result<LogicBlock> {
    let mut block = LogicBlock::new();

    match value.get("functions") {
        // Canonical encoding: object keyed by function name.
        Some(Value::Object(map)) => {
            for (name, func) in map {
                block.functions.push(parse_logic_function(name, func)?);
            }
        }
        // Array-of-named-objects encoding used by some front ends.
        Some(Value::Array(items)) => {
            for (i, func) in items.iter().enumerate() {
                let path = format!("logic_block.functions[{i}]");
                let name = require_str(func, "name", &path)?;
                block.functions.push(parse_logic_function(&name, func)?);
            }
        }
        Some(_) => {
            return Err(SchemaError::new(
                "logic_block.functions",
                "functions must be an object or array",
            ))
        }
        None => {}
    }

    if let Some(Value::Array(items)) = value.get("event_bindings") {
        for (i, binding) in items.iter().enumerate() {
            let parsed: EventBinding = serde_json::from_value(binding.clone()).map_err(|e| {
                SchemaError::new(format!("logic_block.event_bindings[{i}]"), e.to_string())
            })?;
            block.event_bindings.push(parsed);
        }
    }

    Ok(block)
}

fn parse_logic_function(name: &str, value: &Value) -> Result<LogicFunction> {
    let path = format!("logic_block.functions.{name}");
    let mut func = LogicFunction::new(name);

    if let Some(universal) = value.get("universal").filter(|v| !v.is_null()) {
        if let Some(Value::Array(params)) = universal.get("params") {
            for (i, param) in params.iter().enumerate() {
                let parsed: LogicParam = serde_json::from_value(param.clone())
                    .map_err(|e| SchemaError::new(format!("{path}.params[{i}]"), e.to_string()))?;
                func.params.push(parsed);
            }
        }
        let statements = universal.get("statements").ok_or_else(|| {
            SchemaError::new(format!("{path}.universal"), "missing statements array")
        })?;
        let statements = statements.as_array().ok_or_else(|| {
            SchemaError::new(
                format!("{path}.universal.statements"),
                "statements must be an array",
            )
        })?;
        for (i, stmt) in statements.iter().enumerate() {
            func.statements
                .push(parse_statement(stmt, &format!("{path}.statements[{i}]"))?);
        }
    }

    if let Some(Value::Object(sources)) = value.get("sources") {
        for (language, source) in sources {
            if let Some(text) = source.as_str() {
                func.sources.push((language.clone(), text.to_string()));
            }
        }
    }

    Ok(func)
}

// ============================================================================
// Source structures
// ============================================================================

fn parse_source_structures(value: &Value) -> Result<SourceStructures> {
    let mut structures = SourceStructures::default();

    if let Some(Value::Array(items)) = value.get("struct_types") {
        for (i, item) in items.iter().enumerate() {
            let parsed: StructType = serde_json::from_value(item.clone()).map_err(|e| {
                SchemaError::new(format!("source_structures.struct_types[{i}]"), e.to_string())
            })?;
            structures.struct_types.push(parsed);
        }
    }

    if let Some(Value::Array(items)) = value.get("const_declarations") {
        for (i, item) in items.iter().enumerate() {
            let path = format!("source_structures.const_declarations[{i}]");
            let name = require_str(item, "name", &path)?;
            let scope = item
                .get("scope")
                .and_then(Value::as_str)
                .unwrap_or("global")
                .to_string();
            let value_type = item
                .get("value_type")
                .and_then(Value::as_str)
                .unwrap_or("scalar")
                .to_string();
            let ty = item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("any")
                .to_string();
            let init = match item.get("value") {
                Some(Value::Null) | None => None,
                Some(v) => Some(parse_expression(v, &format!("{path}.value"))?),
            };
            structures.const_declarations.push(ConstDeclaration {
                name,
                scope,
                value_type,
                ty,
                value: init,
            });
        }
    }

    if let Some(Value::Array(items)) = value.get("exports") {
        for (i, item) in items.iter().enumerate() {
            let parsed: ExportDeclaration = serde_json::from_value(item.clone()).map_err(|e| {
                SchemaError::new(format!("source_structures.exports[{i}]"), e.to_string())
            })?;
            structures.exports.push(parsed);
        }
    }

    Ok(structures)
}

// ============================================================================
// Component tree
// ============================================================================

/// Keys that carry structure rather than plain properties.
const STRUCTURAL_KEYS: &[&str] = &[
    "id",
    "type",
    "text",
    "text_expression",
    "children",
    "scope",
    "events",
    "for_def",
    "visible_condition",
    "component_ref",
    "arg",
    "property_bindings",
];

pub fn parse_component(value: &Value, path: &str) -> Result<ComponentNode> {
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::new(path, "component must be an object"))?;

    let id = obj
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| SchemaError::new(format!("{path}.id"), "missing numeric id"))?
        as u32;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::new(format!("{path}.type"), "missing component type"))?;

    let mut node = ComponentNode::new(id, kind);
    node.text = obj.get("text").and_then(Value::as_str).map(String::from);
    node.text_expression = obj
        .get("text_expression")
        .and_then(Value::as_str)
        .map(String::from);
    node.scope = obj.get("scope").and_then(Value::as_str).map(String::from);
    node.component_ref = obj
        .get("component_ref")
        .and_then(Value::as_str)
        .map(String::from);
    node.arg = obj.get("arg").and_then(Value::as_str).map(String::from);

    if let Some(Value::Array(events)) = obj.get("events") {
        for (i, event) in events.iter().enumerate() {
            let event_path = format!("{path}.events[{i}]");
            node.events.push(EventRef {
                event: require_str(event, "type", &event_path)?,
                logic_id: require_str(event, "logic_id", &event_path)?,
            });
        }
    }

    if let Some(for_def) = obj.get("for_def") {
        let def_path = format!("{path}.for_def");
        let item_name = require_str(for_def, "item_name", &def_path)?;
        let source = for_def
            .get("source")
            .ok_or_else(|| SchemaError::new(&def_path, "missing source"))?;
        // The source may be wrapped as {"expression": ...} or given directly.
        let source_expr = match source.get("expression") {
            Some(inner) => parse_expression(inner, &format!("{def_path}.source.expression"))?,
            None => parse_expression(source, &format!("{def_path}.source"))?,
        };
        node.for_def = Some(ForDef {
            item_name,
            source: source_expr,
        });
    }

    if let Some(cond) = obj.get("visible_condition") {
        let cond_path = format!("{path}.visible_condition");
        node.visible_condition = Some(VisibleCondition {
            variable: require_str(cond, "variable", &cond_path)?,
            when_true: cond.get("when_true").and_then(Value::as_bool).unwrap_or(true),
        });
    }

    if let Some(Value::Object(bindings)) = obj.get("property_bindings") {
        for (prop, binding) in bindings {
            let binding_path = format!("{path}.property_bindings.{prop}");
            let kind_name = require_str(binding, "binding_type", &binding_path)?;
            let kind = BindingKind::from_wire_name(&kind_name).ok_or_else(|| {
                SchemaError::new(
                    format!("{binding_path}.binding_type"),
                    format!("unknown binding type '{kind_name}'"),
                )
            })?;
            let source_value = binding
                .get("source_expr")
                .ok_or_else(|| SchemaError::new(&binding_path, "missing source_expr"))?;
            // A bare string is shorthand for a variable reference.
            let source = match source_value {
                Value::String(name) => Expression::Var(name.clone()),
                other => parse_expression(other, &format!("{binding_path}.source_expr"))?,
            };
            node.property_bindings
                .insert(prop.clone(), Binding { kind, source });
        }
    }

    if let Some(Value::Array(children)) = obj.get("children") {
        for (i, child) in children.iter().enumerate() {
            node.children
                .push(parse_component(child, &format!("{path}.children[{i}]"))?);
        }
    }

    // Everything else is a plain property.
    for (key, value) in obj {
        if STRUCTURAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        node.properties
            .insert(key.clone(), parse_property_value(value));
    }

    Ok(node)
}

fn parse_property_value(value: &Value) -> PropertyValue {
    match value {
        Value::String(s) if looks_like_color(s) => PropertyValue::Color(s.clone()),
        Value::String(s) => PropertyValue::String(s.clone()),
        Value::Number(n) => PropertyValue::Number(number_from_json(n)),
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::Array(items) => {
            PropertyValue::Array(items.iter().map(parse_property_value).collect())
        }
        Value::Null | Value::Object(_) => PropertyValue::Null,
    }
}

fn looks_like_color(s: &str) -> bool {
    s.starts_with('#') && s.len() >= 7 && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

// ============================================================================
// Expressions
// ============================================================================

pub fn parse_expression(value: &Value, path: &str) -> Result<Expression> {
    match value {
        Value::String(s) => Ok(Expression::String(s.clone())),
        Value::Number(n) => Ok(Expression::Number(number_from_json(n))),
        Value::Bool(b) => Ok(Expression::Bool(*b)),
        Value::Null => Ok(Expression::Null),
        Value::Array(_) => Err(SchemaError::new(
            path,
            "bare arrays are not expressions; use an array_literal op",
        )),
        Value::Object(obj) => {
            // Variable reference: {"var": "name"}
            if let Some(name) = obj.get("var").and_then(Value::as_str) {
                return Ok(Expression::Var(name.to_string()));
            }

            // Implicit index access: {"index": arr, "at": idx}
            if let (Some(arr), Some(at)) = (obj.get("index"), obj.get("at")) {
                return Ok(Expression::Index {
                    object: Box::new(parse_expression(arr, &format!("{path}.index"))?),
                    index: Box::new(parse_expression(at, &format!("{path}.at"))?),
                });
            }

            let op = obj.get("op").and_then(Value::as_str).ok_or_else(|| {
                SchemaError::new(path, "expression object needs an 'op' or 'var' field")
            })?;

            parse_op_expression(op, value, path)
        }
    }
}

fn parse_op_expression(op: &str, value: &Value, path: &str) -> Result<Expression> {
    if let Some(bin) = BinOp::from_wire_name(op) {
        let lhs = child_expr(value, "left", path)?;
        let rhs = child_expr(value, "right", path)?;
        return Ok(Expression::Binary {
            op: bin,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        });
    }

    match op {
        "string" => Ok(Expression::String(
            value
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )),
        "number" => match value.get("value") {
            Some(Value::Number(n)) => Ok(Expression::Number(number_from_json(n))),
            _ => Err(SchemaError::new(path, "number op needs a numeric value")),
        },
        "not" => Ok(Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(child_expr(value, "operand", path)?),
        }),
        "neg" => Ok(Expression::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(child_expr(value, "operand", path)?),
        }),
        "member_access" => {
            let object = child_expr(value, "object", path)?;
            // Some front ends leave trailing whitespace on property names.
            let property = require_str(value, "property", path)?.trim_end().to_string();
            Ok(Expression::Member {
                object: Box::new(object),
                property,
            })
        }
        "index_access" => Ok(Expression::Index {
            object: Box::new(child_expr(value, "object", path)?),
            index: Box::new(child_expr(value, "index", path)?),
        }),
        "array_literal" => {
            let elements = value
                .get("elements")
                .and_then(Value::as_array)
                .ok_or_else(|| SchemaError::new(path, "array_literal needs an elements array"))?;
            let parsed = elements
                .iter()
                .enumerate()
                .map(|(i, e)| parse_expression(e, &format!("{path}.elements[{i}]")))
                .collect::<Result<Vec<_>>>()?;
            Ok(Expression::Array(parsed))
        }
        "call" => {
            let function = require_str(value, "function", path)?;
            Ok(Expression::Call {
                function,
                args: parse_args(value, path)?,
            })
        }
        "method_call" => {
            let receiver = child_expr(value, "receiver", path)?;
            let method = require_str(value, "method", path)?;
            Ok(Expression::MethodCall {
                receiver: Box::new(receiver),
                method,
                args: parse_args(value, path)?,
            })
        }
        "ternary" | "conditional" => Ok(Expression::Ternary {
            condition: Box::new(child_expr(value, "condition", path)?),
            then_expr: Box::new(child_expr(value, "then", path)?),
            else_expr: Box::new(child_expr(value, "else", path)?),
        }),
        // Unknown ops are carried through for the lowerer to surface.
        other => Ok(Expression::Unsupported(other.to_string())),
    }
}

fn parse_args(value: &Value, path: &str) -> Result<Vec<Expression>> {
    match value.get("args") {
        Some(Value::Array(args)) => args
            .iter()
            .enumerate()
            .map(|(i, a)| parse_expression(a, &format!("{path}.args[{i}]")))
            .collect(),
        Some(_) => Err(SchemaError::new(path, "args must be an array")),
        None => Ok(Vec::new()),
    }
}

// ============================================================================
// Statements
// ============================================================================

pub fn parse_statement(value: &Value, path: &str) -> Result<Statement> {
    let op = value
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::new(path, "statement needs an 'op' field"))?;

    match op {
        "var_decl" | "let" | "const" => {
            let name = require_str(value, "name", path)?;
            let ty = value.get("type").and_then(Value::as_str).map(String::from);
            let init = match value.get("init") {
                Some(Value::Null) | None => None,
                Some(v) => Some(parse_expression(v, &format!("{path}.init"))?),
            };
            Ok(Statement::VarDecl { name, ty, init })
        }
        "assign" => {
            let target = match value.get("target") {
                Some(Value::String(name)) => AssignTarget::Name(name.clone()),
                Some(v) => AssignTarget::Lvalue(parse_expression(v, &format!("{path}.target"))?),
                None => return Err(SchemaError::new(path, "assign needs a target")),
            };
            let expr = value
                .get("expr")
                .or_else(|| value.get("value"))
                .ok_or_else(|| SchemaError::new(path, "assign needs an expr"))?;
            Ok(Statement::Assign {
                target,
                value: parse_expression(expr, &format!("{path}.expr"))?,
            })
        }
        "return" => {
            let ret = match value.get("value") {
                Some(Value::Null) | None => None,
                Some(v) => Some(parse_expression(v, &format!("{path}.value"))?),
            };
            Ok(Statement::Return(ret))
        }
        "expr_stmt" => {
            let expr = value
                .get("expr")
                .ok_or_else(|| SchemaError::new(path, "expr_stmt needs an expr"))?;
            Ok(Statement::Expr(parse_expression(
                expr,
                &format!("{path}.expr"),
            )?))
        }
        "if" => Ok(Statement::If {
            condition: child_expr(value, "condition", path)?,
            then_branch: parse_statement_list(value.get("then"), &format!("{path}.then"))?,
            else_branch: parse_statement_list(value.get("else"), &format!("{path}.else"))?,
        }),
        "while" => Ok(Statement::While {
            condition: child_expr(value, "condition", path)?,
            body: parse_statement_list(value.get("body"), &format!("{path}.body"))?,
        }),
        "for" => {
            let init = optional_expr(value, "init", path)?;
            let condition = optional_expr(value, "condition", path)?;
            let update = optional_expr(value, "update", path)?;
            Ok(Statement::For {
                init,
                condition,
                update,
                body: parse_statement_list(value.get("body"), &format!("{path}.body"))?,
            })
        }
        "for_each" => Ok(Statement::ForEach {
            item: require_str(value, "item", path)?,
            source: child_expr(value, "in", path)?,
            body: parse_statement_list(value.get("body"), &format!("{path}.body"))?,
        }),
        "break" => Ok(Statement::Break),
        "continue" => Ok(Statement::Continue),
        "block" => Ok(Statement::Block(parse_statement_list(
            value.get("statements"),
            &format!("{path}.statements"),
        )?)),
        // Unknown ops are carried through; statement lowerers reject them
        // with an error naming the op and the file being generated.
        other => Ok(Statement::Unsupported(other.to_string())),
    }
}

fn parse_statement_list(value: Option<&Value>, path: &str) -> Result<Vec<Statement>> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, s)| parse_statement(s, &format!("{path}[{i}]")))
            .collect(),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(SchemaError::new(path, "expected a statement array")),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn child_expr(value: &Value, key: &str, path: &str) -> Result<Expression> {
    let child = value
        .get(key)
        .ok_or_else(|| SchemaError::new(path, format!("missing '{key}' field")))?;
    parse_expression(child, &format!("{path}.{key}"))
}

fn optional_expr(value: &Value, key: &str, path: &str) -> Result<Option<Expression>> {
    match value.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(v) => Ok(Some(parse_expression(v, &format!("{path}.{key}"))?)),
    }
}

fn require_str(value: &Value, key: &str, path: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| SchemaError::new(path, format!("missing string field '{key}'")))
}

fn number_from_json(n: &serde_json::Number) -> Number {
    if let Some(i) = n.as_i64() {
        Number::Int(i)
    } else {
        Number::Float(n.as_f64().unwrap_or(0.0))
    }
}
