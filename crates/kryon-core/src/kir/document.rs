//! Top-level KIR document.

use serde::{Deserialize, Serialize};

use super::expr::Expression;
use super::logic::LogicBlock;
use super::manifest::ReactiveTable;
use super::node::ComponentNode;

/// Application window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "windowTitle", default = "default_title")]
    pub window_title: String,
    #[serde(rename = "windowWidth", default = "default_width")]
    pub window_width: u32,
    #[serde(rename = "windowHeight", default = "default_height")]
    pub window_height: u32,
}

fn default_title() -> String {
    "Kryon App".to_string()
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_title: default_title(),
            window_width: default_width(),
            window_height: default_height(),
        }
    }
}

/// A field of a user-declared struct type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type", default = "any_type")]
    pub ty: String,
}

fn any_type() -> String {
    "any".to_string()
}

/// A user-declared struct type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<StructField>,
}

/// A top-level constant/global declaration.
#[derive(Debug, Clone, Serialize)]
pub struct ConstDeclaration {
    pub name: String,
    /// `"global"` or a component scope.
    pub scope: String,
    /// Value category: `"scalar"`, `"array"`, or `"function_result"`.
    pub value_type: String,
    /// Element/value type name for code generation.
    pub ty: String,
    pub value: Option<Expression>,
}

impl ConstDeclaration {
    pub fn is_array(&self) -> bool {
        self.value_type == "array"
    }

    pub fn is_function_result(&self) -> bool {
        self.value_type == "function_result"
    }
}

/// An exported symbol of a utility module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDeclaration {
    pub name: String,
    #[serde(default)]
    pub kind: String,
}

/// Struct, const, and export declarations of the source module.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStructures {
    pub struct_types: Vec<StructType>,
    pub const_declarations: Vec<ConstDeclaration>,
    pub exports: Vec<ExportDeclaration>,
}

/// A complete KIR document: the compiler's sole input.
#[derive(Debug, Clone, Serialize)]
pub struct KirDocument {
    /// Root of the component tree. Utility/component modules have none.
    pub root: Option<ComponentNode>,
    pub app: AppConfig,
    pub reactive: ReactiveTable,
    pub logic: LogicBlock,
    pub structures: SourceStructures,
    /// Module identifiers for multi-file builds.
    pub imports: Vec<String>,
}

impl KirDocument {
    /// A document with no tree and no side tables.
    pub fn empty() -> Self {
        Self {
            root: None,
            app: AppConfig::default(),
            reactive: ReactiveTable::new(),
            logic: LogicBlock::new(),
            structures: SourceStructures::default(),
            imports: Vec::new(),
        }
    }

    /// True when this document is a utility module: declarations to export
    /// but no component tree to mount.
    pub fn is_utility_module(&self) -> bool {
        self.root.is_none()
            && (!self.structures.exports.is_empty()
                || !self.structures.const_declarations.is_empty())
    }
}
