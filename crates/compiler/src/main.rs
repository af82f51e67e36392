//! Opal CLI
//!
//! One binary covers the whole toolchain:
//!
//! ```text
//! opal <file>            compile and execute
//! opal -c <file>         compile to <basename>.gvm
//! opal -r <file.gvm>     load and execute a bytecode image
//! opal --ast <file>      write the parsed AST to ast.dot
//! opal --doc <file>      write doc.html
//! opal --completions <shell>   shell completion script
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use opal_runtime::Vm;

#[derive(ClapParser)]
#[command(name = "opal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Opal toolchain - compile and run Opal programs", long_about = None)]
struct Cli {
    /// Source file to compile and execute
    file: Option<PathBuf>,

    /// Compile a source file to a .gvm bytecode image
    #[arg(short = 'c', value_name = "FILE", conflicts_with_all = ["file", "run", "ast", "doc"])]
    compile: Option<PathBuf>,

    /// Run a compiled .gvm bytecode image
    #[arg(short = 'r', value_name = "FILE", conflicts_with_all = ["file", "ast", "doc"])]
    run: Option<PathBuf>,

    /// Write the parsed AST as a graphviz file (ast.dot)
    #[arg(long = "ast", value_name = "FILE", conflicts_with_all = ["file", "doc"])]
    ast: Option<PathBuf>,

    /// Write an HTML documentation page (doc.html)
    #[arg(long = "doc", value_name = "FILE", conflicts_with = "file")]
    doc: Option<PathBuf>,

    /// Generate a shell completion script
    #[arg(long = "completions", value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("OPAL_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "opal", &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }
    if let Some(path) = &cli.compile {
        return run_compile(path);
    }
    if let Some(path) = &cli.run {
        return run_image(path);
    }
    if let Some(path) = &cli.ast {
        return run_ast_dump(path);
    }
    if let Some(path) = &cli.doc {
        return run_doc(path);
    }
    if let Some(path) = &cli.file {
        return run_source(path);
    }

    // No mode selected: print usage and fail
    let _ = Cli::command().print_help();
    ExitCode::FAILURE
}

/// Compile and execute a source file.
fn run_source(path: &Path) -> ExitCode {
    let buffer = match opalc::compile_file(&path.to_string_lossy()) {
        Ok(buffer) => buffer,
        Err(error) => {
            println!("{}", error);
            return ExitCode::FAILURE;
        }
    };

    execute(&buffer)
}

/// Compile a source file into `<basename>.gvm`.
fn run_compile(path: &Path) -> ExitCode {
    let buffer = match opalc::compile_file(&path.to_string_lossy()) {
        Ok(buffer) => buffer,
        Err(error) => {
            println!("{}", error);
            return ExitCode::FAILURE;
        }
    };

    let out = path.with_extension("gvm");
    match opalc::serializer::serialize(&out, &buffer) {
        Ok(()) => {
            println!("Wrote bytecode to file '{}'", out.display());
            ExitCode::SUCCESS
        }
        Err(error) => {
            println!("{}", error);
            ExitCode::FAILURE
        }
    }
}

/// Load and execute a compiled image.
fn run_image(path: &Path) -> ExitCode {
    match opalc::serializer::deserialize(path) {
        Ok(buffer) => execute(&buffer),
        Err(error) => {
            println!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn execute(buffer: &[opal_core::Instruction]) -> ExitCode {
    let mut vm = Vm::new();
    vm.set_argv(std::env::args().collect());
    match vm.run(buffer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Parse a source file and write `ast.dot`.
fn run_ast_dump(path: &Path) -> ExitCode {
    let name = path.to_string_lossy();
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(_) => {
            println!("File '{}' does not exist", name);
            return ExitCode::FAILURE;
        }
    };

    let mut context = opalc::TypeContext::new();
    let root = match opalc::Parser::new(&name, &mut context).run(&source) {
        Ok(root) => root,
        Err(error) => {
            println!("{}", error);
            return ExitCode::FAILURE;
        }
    };

    let dot = opalc::graphviz::render(&root);
    match std::fs::File::create("ast.dot").and_then(|mut f| f.write_all(dot.as_bytes())) {
        Ok(()) => {
            println!("Wrote AST graph to file 'ast.dot'");
            ExitCode::SUCCESS
        }
        Err(error) => {
            println!("{}", error);
            ExitCode::FAILURE
        }
    }
}

/// Compile a source file and write `doc.html`.
fn run_doc(path: &Path) -> ExitCode {
    let name = path.to_string_lossy();
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(_) => {
            println!("File '{}' does not exist", name);
            return ExitCode::FAILURE;
        }
    };

    let buffer = match opalc::compile_source(&name, &source) {
        Ok(buffer) => buffer,
        Err(error) => {
            println!("{}", error);
            return ExitCode::FAILURE;
        }
    };

    let html = match opalc::doc::render(&name, &source, &buffer) {
        Ok(html) => html,
        Err(error) => {
            println!("{}", error);
            return ExitCode::FAILURE;
        }
    };

    match std::fs::File::create("doc.html").and_then(|mut f| f.write_all(html.as_bytes())) {
        Ok(()) => {
            println!("Wrote documentation to file 'doc.html'");
            ExitCode::SUCCESS
        }
        Err(error) => {
            println!("{}", error);
            ExitCode::FAILURE
        }
    }
}
