//! Kryon Compiler CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use kryon_core::codegen::Target;
use kryon_core::Compiler;

#[derive(Parser)]
#[command(name = "kryonc")]
#[command(author, version, about = "Kryon IR compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate target source from a KIR document
    Generate {
        /// Input KIR file (JSON)
        kir_path: PathBuf,

        /// Output file path
        output_path: PathBuf,

        /// Target as <language>[+<toolkit>], e.g. c, c+sdl3, tcl+tk
        #[arg(short, long, default_value = "c")]
        target: String,
    },

    /// Check a KIR document for schema and lowering errors
    Check {
        /// Input KIR file(s) to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Dump the reactive manifest, logic block, and compiled bytecode
    Inspect {
        /// Input KIR file to inspect
        kir_path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Generate {
            kir_path,
            output_path,
            target,
        } => generate(kir_path, output_path, &target),
        Commands::Check { files } => check(files),
        Commands::Inspect { kir_path } => inspect(kir_path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn generate(kir_path: PathBuf, output_path: PathBuf, target: &str) -> Result<()> {
    let target = Target::parse(target)?;

    let mut compiler = Compiler::load_file(&kir_path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("failed to load {}", kir_path.display()))?;

    let output = output_path.to_string_lossy().into_owned();
    compiler
        .generate_to_disk(target, &output)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // Binding warnings are recoverable; surface them without failing.
    if !compiler.context().diagnostics.is_empty() {
        eprintln!("{}", compiler.render_diagnostics());
    }

    Ok(())
}

fn check(files: Vec<PathBuf>) -> Result<()> {
    let mut checked = 0;
    for file in &files {
        Compiler::load_file(file)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("check failed for {}", file.display()))?;
        checked += 1;
    }
    eprintln!("OK: {checked} document(s) checked");
    Ok(())
}

fn inspect(kir_path: PathBuf) -> Result<()> {
    let compiler = Compiler::load_file(&kir_path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("failed to load {}", kir_path.display()))?;

    let doc = compiler.document();
    let ctx = compiler.context();

    println!("=== Reactive variables ({}) ===", ctx.reactive.len());
    for var in ctx.reactive.iter() {
        println!("  {} [{}] : {:?} = {:?}", var.name, var.scope, var.ty, var.initial);
    }

    println!("\n=== Logic functions ({}) ===", doc.logic.functions.len());
    for func in &doc.logic.functions {
        let mode = if ctx.is_bytecode_handler(&func.name) {
            "bytecode"
        } else if func.has_universal() {
            "transpiled"
        } else {
            "embedded source"
        };
        println!("  {} ({} statements, {mode})", func.name, func.statements.len());
    }

    println!(
        "\n=== Bytecode functions ({}) ===",
        ctx.registry.functions().len()
    );
    for func in ctx.registry.functions() {
        println!("  [{}] {}", func.id, func.name);
        for instruction in &func.instructions {
            println!("    {instruction}");
        }
    }

    println!(
        "\n=== Host functions ({}) ===",
        ctx.registry.host_functions().len()
    );
    for decl in ctx.registry.host_functions() {
        println!("  [{}] {}", decl.id, decl.name);
    }

    if let Some(ref root) = doc.root {
        println!("\n=== Component tree ({} nodes) ===", root.subtree_size());
        print_tree(root, 1);
    }

    Ok(())
}

fn print_tree(node: &kryon_core::kir::ComponentNode, indent: usize) {
    let pad = "  ".repeat(indent);
    let mut extras = Vec::new();
    if let Some(ref text) = node.text {
        extras.push(format!("text={text:?}"));
    }
    if let Some(ref expr) = node.text_expression {
        extras.push(format!("text_expr={expr}"));
    }
    if !node.property_bindings.is_empty() {
        extras.push(format!("{} binding(s)", node.property_bindings.len()));
    }
    let extras = if extras.is_empty() {
        String::new()
    } else {
        format!(" ({})", extras.join(", "))
    };
    println!("{pad}[{}] {}{extras}", node.id, node.kind);

    for child in &node.children {
        print_tree(child, indent + 1);
    }
}
