//! Kryon Intermediate Representation (KIR).
//!
//! KIR is the compiler's sole input: a serialized component tree with
//! reactive data bindings, a reactive-variable manifest, a logic block of
//! event handlers, and the struct/const/export declarations of the source
//! module. This module holds the typed model and its JSON loader; semantic
//! validation (e.g. "variable exists") is left to the lowering engines so
//! error messages carry lowering context.

pub mod document;
pub mod expr;
pub mod json;
pub mod logic;
pub mod manifest;
pub mod node;

pub use document::{
    AppConfig, ConstDeclaration, ExportDeclaration, KirDocument, SourceStructures, StructField,
    StructType,
};
pub use expr::{AssignTarget, BinOp, Expression, Number, Statement, UnaryOp};
pub use json::{parse_document, parse_document_str, SchemaError};
pub use logic::{EventBinding, LogicBlock, LogicFunction, LogicParam};
pub use manifest::{
    ReactiveTable, ReactiveType, ReactiveValue, ReactiveVariable, COMPONENT_SCOPE,
};
pub use node::{
    Binding, BindingKind, ComponentNode, EventRef, ForDef, PropertyValue, VisibleCondition,
};
