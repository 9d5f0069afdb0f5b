//! Quill: a small imperative scripting language compiled to stack bytecode.
//!
//! Source text goes through [`frontend`] (lexer, parser) into the syntax
//! tree of [`lang`], is lowered by [`bytecode::compile`], optionally folded
//! by [`bytecode::optimize`], and executed by [`runtime::Vm`].

pub mod bytecode;
pub mod frontend;
pub mod lang;
pub mod runtime;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt};

use crate::bytecode::{
    ProgramBc, compile::compile, compile_error::CompileError, ir::FormatError, optimize::optimize,
};
use crate::frontend::{
    lexer::{Lexer, LexerError},
    parser::{Parser, ParserError},
};
use crate::lang::{program::Program, value::Value};
use crate::runtime::{Vm, VmConfig, runtime_error::RuntimeError};

/// Any failure along the source → execution pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("bytecode image error: {0}")]
    Format(#[from] FormatError),
}

pub fn parse_source(source: &str) -> Result<Program, Error> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(Parser::new(tokens).parse()?)
}

/// Parse and compile `source`, constant-folding when `fold` is set.
pub fn compile_source(source: &str, fold: bool) -> Result<ProgramBc, Error> {
    let program = parse_source(source)?;
    let bc = compile(&program)?;
    Ok(if fold { optimize(&bc) } else { bc })
}

/// Compile `source` with folding, run it with default limits and return
/// the program's result together with everything it printed.
pub fn run_source(source: &str) -> Result<(Value, String), Error> {
    let bc = compile_source(source, true)?;
    let mut vm = Vm::with_output(VmConfig::default(), Vec::new());
    let value = vm.run(&bc)?;
    let output = String::from_utf8_lossy(vm.output()).into_owned();
    Ok((value, output))
}

/// Install the `tracing` subscriber used by the `quill` binary.
///
/// `RUST_LOG` overrides the default filter. Events go to stderr so they
/// never interleave with program output.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,quill=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
