use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{debug, error, info, warn};

use quill::bytecode::{
    ProgramBc,
    compile::compile,
    disasm::{print_bc, print_bc_stats},
    optimize::optimize_with_stats,
};
use quill::frontend::{lexer::Lexer, token_dumper::TokenDumper};
use quill::runtime::{Vm, VmConfig};

/// Extension of compiled bytecode images.
const IMAGE_EXTENSION: &str = "qlc";

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(about = "Compile and run Quill programs on the bytecode VM")]
struct Args {
    /// Source file, or a compiled `.qlc` image
    file: PathBuf,

    /// Print the token stream and exit
    #[arg(long)]
    tokens: bool,

    /// Disable ANSI colors in the token dump
    #[arg(long = "no-color")]
    no_color: bool,

    /// Show tokens as source text instead of their Debug form
    #[arg(long)]
    pretty: bool,

    /// Print the syntax tree and exit
    #[arg(long)]
    ast: bool,

    /// Print the disassembled bytecode before running
    #[arg(long)]
    bc: bool,

    /// Print bytecode statistics before running
    #[arg(long)]
    stats: bool,

    /// Skip constant folding
    #[arg(long = "no-opt")]
    no_opt: bool,

    /// Write a bytecode image to this path instead of running
    #[arg(long)]
    emit: Option<PathBuf>,

    /// Maximum nesting of user function calls
    #[arg(long = "max-depth", default_value_t = 1000)]
    max_depth: usize,

    /// Abort after this many executed instructions
    #[arg(long = "max-steps")]
    max_steps: Option<usize>,
}

fn main() {
    quill::init_logging();

    let args = Args::parse();

    let program = if has_extension(&args.file, IMAGE_EXTENSION) {
        if args.tokens || args.ast {
            warn!("--tokens and --ast need source text; ignored for a bytecode image");
        }
        load_image(&args.file)
    } else {
        match compile_file(&args) {
            Some(program) => program,
            None => return,
        }
    };

    if args.bc {
        print_bc(&program);
    }
    if args.stats {
        print_bc_stats(&program);
    }

    if let Some(path) = &args.emit {
        emit_image(&program, path);
        return;
    }

    let config = VmConfig {
        max_call_depth: args.max_depth,
        max_steps: args.max_steps,
        ..VmConfig::default()
    };
    let mut vm = Vm::with_config(config);

    match vm.run(&program) {
        Ok(value) => debug!(result = %value, steps = vm.steps(), "finished"),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

fn read_source(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Front end plus compiler. `None` when a dump mode already finished.
fn compile_file(args: &Args) -> Option<ProgramBc> {
    let source = read_source(&args.file);

    if args.tokens {
        dump_tokens(&source, args.no_color, args.pretty);
        return None;
    }

    let program = match quill::parse_source(&source) {
        Ok(program) => program,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if args.ast {
        println!("{:#?}", program);
        return None;
    }

    let bc = match compile(&program) {
        Ok(bc) => bc,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if args.no_opt {
        return Some(bc);
    }

    let (optimized, stats) = optimize_with_stats(&bc);
    if stats.folded > 0 {
        info!(
            folded = stats.folded,
            blocked = stats.blocked,
            "{} -> {} instructions",
            bc.len(),
            optimized.len()
        );
    }
    Some(optimized)
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) {
    let mut lexer = Lexer::new(source);

    match lexer.tokenize() {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();

            if no_color {
                dumper = dumper.no_color();
            }
            if pretty {
                dumper = dumper.pretty();
            }

            dumper.dump(&tokens);
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn load_image(path: &Path) -> ProgramBc {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read '{}': {}", path.display(), e);
            process::exit(1);
        }
    };

    match ProgramBc::from_bytes(&bytes) {
        Ok(program) => {
            info!("Loaded {} instructions from {}", program.len(), path.display());
            program
        }
        Err(e) => {
            error!("{}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn emit_image(program: &ProgramBc, path: &Path) {
    let encoded = match program.to_bytes() {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to encode bytecode image: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(path, encoded) {
        error!("Failed to write {}: {}", path.display(), e);
        process::exit(1);
    }

    info!("Wrote bytecode image to {}", path.display());
}
