//! Code generation from KIR.
//!
//! This module contains code generators for the supported targets:
//! - C (macro-call widget DSL over the Kryon runtime)
//! - Tcl/Tk (widget-constructor scripts)
//!
//! Each backend lowers the same typed KIR model; the shared pieces are the
//! [`CodeWriter`] output buffer and the combination validator consulted
//! before any file is written.

pub mod c;
pub mod combo;
pub mod emit;
pub mod tcltk;
pub mod unroll;

use thiserror::Error;

use crate::context::CompilationContext;
use crate::kir::KirDocument;

pub use combo::{ComboValidity, Language, Toolkit};
pub use emit::CodeWriter;

/// Code generation error.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("unsupported statement op '{op}' while generating {output_path}")]
    UnsupportedStatement { op: String, output_path: String },

    #[error("unknown target '{0}' (expected <language>[+<toolkit>])")]
    UnknownTarget(String),

    #[error("invalid combination {language}+{toolkit}: {reason}")]
    InvalidCombo {
        language: Language,
        toolkit: Toolkit,
        reason: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

/// A build target: language plus toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub language: Language,
    pub toolkit: Toolkit,
}

impl Target {
    pub fn new(language: Language, toolkit: Toolkit) -> Self {
        Self { language, toolkit }
    }

    /// Parse `<language>[+<toolkit>]`, e.g. `c`, `c+sdl3`, `tcl+tk`.
    pub fn parse(spec: &str) -> Result<Self, CodegenError> {
        let (lang_name, toolkit_name) = match spec.split_once('+') {
            Some((lang, toolkit)) => (lang, Some(toolkit)),
            None => (spec, None),
        };

        let language = Language::from_name(lang_name)
            .ok_or_else(|| CodegenError::UnknownTarget(spec.to_string()))?;
        let toolkit = match toolkit_name {
            Some(name) => Toolkit::from_name(name)
                .ok_or_else(|| CodegenError::UnknownTarget(spec.to_string()))?,
            None => language.default_toolkit(),
        };

        Ok(Self { language, toolkit })
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.language, self.toolkit)
    }
}

/// Derive a collision-free include guard from a module identifier:
/// non-alphanumeric characters become `_`, the result is upper-cased and
/// suffixed `_H`.
pub fn include_guard(module: &str) -> String {
    let mut guard: String = module
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    guard.push_str("_H");
    guard
}

/// Generate target source for a document.
///
/// Validates the language/toolkit combination first and aborts before
/// producing any output when it is invalid. Returns the rendered file
/// content; the caller is responsible for writing it to disk, which keeps
/// failed generations from leaving partial files.
pub fn generate(
    doc: &KirDocument,
    ctx: &mut CompilationContext,
    target: Target,
    output_path: &str,
) -> Result<String, CodegenError> {
    if let ComboValidity::Invalid { reason } = combo::validate(target.language, target.toolkit) {
        return Err(CodegenError::InvalidCombo {
            language: target.language,
            toolkit: target.toolkit,
            reason,
        });
    }

    let span = tracing::debug_span!("generate", target = %target, output = output_path);
    let _guard = span.enter();

    match target.language {
        Language::C => c::generate(doc, ctx, output_path),
        Language::Tcl => tcltk::generate(doc, ctx, output_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse_with_and_without_toolkit() {
        let plain = Target::parse("c").unwrap();
        assert_eq!(plain.language, Language::C);
        assert_eq!(plain.toolkit, Toolkit::Raylib);

        let full = Target::parse("c+sdl3").unwrap();
        assert_eq!(full.toolkit, Toolkit::Sdl3);

        assert!(Target::parse("brainfuck").is_err());
        assert!(Target::parse("c+gtk").is_err());
    }

    #[test]
    fn test_include_guard() {
        assert_eq!(include_guard("widgets/extra.kry"), "WIDGETS_EXTRA_KRY_H");
        assert_eq!(include_guard("habits"), "HABITS_H");
    }

    #[test]
    fn test_generate_rejects_invalid_combo() {
        let doc = KirDocument::empty();
        let mut ctx = CompilationContext::for_document(&doc);
        let target = Target::new(Language::Tcl, Toolkit::Sdl3);

        let err = generate(&doc, &mut ctx, target, "out.tcl").unwrap_err();
        assert!(matches!(err, CodegenError::InvalidCombo { .. }));
    }
}
