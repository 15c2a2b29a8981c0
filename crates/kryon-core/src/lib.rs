//! Kryon Compiler Core
//!
//! This crate implements the Kryon IR (KIR) code generation pipeline:
//! - Strongly-typed KIR model with schema-validated JSON loading
//! - Per-backend expression/statement lowering and component tree emission
//! - Reactive signal lowering with deterministic scope-qualified names
//! - A pattern-matching bytecode compiler and its stack VM for simple
//!   event handlers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      CompilationContext                         │
//! │   ┌──────────────┐  ┌──────────────────┐  ┌─────────────┐       │
//! │   │ ReactiveTable│  │ MetadataRegistry │  │ Diagnostics │       │
//! │   │ (signals)    │  │ (bytecode+hosts) │  │             │       │
//! │   └──────────────┘  └──────────────────┘  └─────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//!          ↑                    ↑
//!          │                    │
//!     ┌────┴─────┐   ┌──────────┴─────┐   ┌──────────────┐
//!     │ KIR load │ → │ Bytecode       │ → │ Codegen      │ → target
//!     │ (JSON)   │   │ compile (or    │   │ (C, Tcl/Tk)  │   source
//!     └──────────┘   │ transpile)     │   └──────────────┘
//!                    └────────────────┘
//! ```
//!
//! Data flows one direction; the pipeline is single-threaded and
//! synchronous. Builds for different targets use independent contexts.

// Core modules
pub mod compiler;
pub mod context;
pub mod diagnostic;

// KIR model
pub mod kir;

// Handler bytecode
pub mod bytecode;

// Code generation
pub mod codegen;

// Re-exports
pub use compiler::{CompileError, CompileResult, Compiler, GeneratedFile};
pub use context::CompilationContext;
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use kir::{KirDocument, SchemaError};
pub use codegen::{CodegenError, Language, Target, Toolkit};
