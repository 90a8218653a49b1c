use std::{
    env,
    fs::File,
    io::{self, BufRead, BufReader},
};

use anyhow::Context as _;
use tracing::info;

use kaleido::{
    backend::Backend,
    config::{BackendKind, Config},
    interpreter::Interpreter,
    lexer::{Lexer, ReaderChars},
    logger, Driver, Parser, Summary,
};

type InputParser<R> = Parser<ReaderChars<R>>;

fn main() -> anyhow::Result<()> {
    let config = Config::from_args(env::args_os()).unwrap_or_else(|e| e.exit());
    logger::init(config.log_level)?;

    let summary = match &config.input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            run(BufReader::new(file), &config)?
        }
        None => {
            let stdin = io::stdin();
            run(stdin.lock(), &config)?
        }
    };

    info!(
        definitions = summary.definitions,
        externs = summary.externs,
        evaluations = summary.evaluations,
        errors = summary.errors,
        "session finished"
    );
    Ok(())
}

fn run<R: BufRead>(reader: R, config: &Config) -> anyhow::Result<Summary> {
    let parser = Parser::new(Lexer::from_reader(reader));
    match config.backend {
        BackendKind::Interpreter => drive(parser, Interpreter::new(io::stdout()), config),
        BackendKind::Llvm => run_llvm(parser, config),
    }
}

fn drive<R: BufRead, B: Backend>(
    parser: InputParser<R>,
    backend: B,
    config: &Config,
) -> anyhow::Result<Summary> {
    let mut driver = Driver::new(parser, backend, io::stdout())
        .with_prompt(config.prompt)
        .with_ast_dump(config.dump_ast);
    let summary = driver.run()?;
    if config.prompt {
        println!();
    }
    Ok(summary)
}

#[cfg(feature = "llvm")]
fn run_llvm<R: BufRead>(parser: InputParser<R>, config: &Config) -> anyhow::Result<Summary> {
    let context = inkwell::context::Context::create();
    let jit = kaleido::codegen::Jit::new(&context)?;
    drive(parser, jit, config)
}

#[cfg(not(feature = "llvm"))]
fn run_llvm<R: BufRead>(_parser: InputParser<R>, _config: &Config) -> anyhow::Result<Summary> {
    anyhow::bail!("the llvm backend needs kaleido built with `--features llvm`")
}
