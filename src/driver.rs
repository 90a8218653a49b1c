use std::io::{self, Write};

use tracing::{debug, info};

use crate::ast::{Function, Prototype};
use crate::backend::{Backend, BackendError};
use crate::lexer::Token;
use crate::parser::{Parser, ParserError};
use crate::registry::PrototypeRegistry;

pub const PROMPT: &str = "ready> ";

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to write to console: {0}")]
    Console(#[from] io::Error),
}

/// why a unit was abandoned
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error(transparent)]
    Syntax(#[from] ParserError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// tallies of one session, returned when the input runs out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub definitions: usize,
    pub externs: usize,
    pub evaluations: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingUnit,
    ProcessingDef,
    ProcessingExtern,
    ProcessingExpression,
    Done,
}

enum Accepted {
    Defined(Function),
    Declared(Prototype),
    Evaluated(Function, f64),
}

/// Reads top-level units one at a time and hands each to a [`Backend`].
///
/// A unit that fails to parse or lower is reported on the console and
/// skipped; the session only ends at end of input.
pub struct Driver<I, B, W> {
    parser: Parser<I>,
    backend: B,
    registry: PrototypeRegistry,
    console: W,
    prompt: bool,
    dump_ast: bool,
    summary: Summary,
}

impl<I, B, W> Driver<I, B, W>
where
    I: Iterator<Item = char>,
    B: Backend,
    W: Write,
{
    /// `parser` must not have been advanced yet
    pub fn new(parser: Parser<I>, backend: B, console: W) -> Self {
        Self {
            parser,
            backend,
            registry: PrototypeRegistry::new(),
            console,
            prompt: false,
            dump_ast: false,
            summary: Summary::default(),
        }
    }

    /// start from prototypes accepted in an earlier session
    pub fn with_registry(mut self, registry: PrototypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_ast_dump(mut self, dump_ast: bool) -> Self {
        self.dump_ast = dump_ast;
        self
    }

    pub fn registry(&self) -> &PrototypeRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn console(&self) -> &W {
        &self.console
    }

    pub fn run(&mut self) -> Result<Summary, DriverError> {
        self.show_prompt()?;
        self.parser.advance();

        let mut state = State::AwaitingUnit;
        loop {
            state = match state {
                State::AwaitingUnit => self.await_unit(),
                State::Done => {
                    info!(summary = ?self.summary, "end of input");
                    return Ok(self.summary);
                }
                unit => {
                    let start_line = self.parser.current_line();
                    match self.process(unit) {
                        Ok(accepted) => self.report(accepted)?,
                        Err(err) => self.recover(err, start_line)?,
                    }
                    self.show_prompt()?;
                    State::AwaitingUnit
                }
            };
        }
    }

    fn await_unit(&mut self) -> State {
        match self.parser.current() {
            Token::Eof => State::Done,
            Token::Char(';') => {
                self.parser.advance();
                State::AwaitingUnit
            }
            Token::Def => State::ProcessingDef,
            Token::Extern => State::ProcessingExtern,
            _ => State::ProcessingExpression,
        }
    }

    fn process(&mut self, state: State) -> Result<Accepted, UnitError> {
        match state {
            State::ProcessingDef => self.handle_definition(),
            State::ProcessingExtern => self.handle_extern(),
            _ => self.handle_top_level_expression(),
        }
    }

    fn handle_definition(&mut self) -> Result<Accepted, UnitError> {
        let function = self.parser.parse_definition()?;
        self.backend.define(&function, &self.registry)?;
        self.backend.begin_unit();
        Ok(Accepted::Defined(function))
    }

    fn handle_extern(&mut self) -> Result<Accepted, UnitError> {
        let prototype = self.parser.parse_extern()?;
        self.backend.declare(&prototype, &self.registry)?;
        self.backend.begin_unit();
        Ok(Accepted::Declared(prototype))
    }

    fn handle_top_level_expression(&mut self) -> Result<Accepted, UnitError> {
        let function = self.parser.parse_top_level_expression()?;
        let value = self.backend.evaluate(&function, &self.registry)?;
        Ok(Accepted::Evaluated(function, value))
    }

    fn report(&mut self, accepted: Accepted) -> Result<(), DriverError> {
        match accepted {
            Accepted::Defined(function) => {
                info!(name = %function.prototype.name, "defined function");
                writeln!(self.console, "Parsed a function definition.")?;
                if self.dump_ast {
                    writeln!(self.console, "{}", function)?;
                }
                self.summary.definitions += 1;
                self.registry.put(function.prototype);
            }
            Accepted::Declared(prototype) => {
                info!(name = %prototype.name, "declared extern");
                writeln!(self.console, "Parsed an extern.")?;
                if self.dump_ast {
                    writeln!(self.console, "extern {}", prototype)?;
                }
                self.summary.externs += 1;
                self.registry.put(prototype);
            }
            Accepted::Evaluated(function, value) => {
                info!(%value, "evaluated top-level expression");
                if self.dump_ast {
                    writeln!(self.console, "{}", function)?;
                }
                writeln!(self.console, "Evaluated to: {}", value)?;
                self.summary.evaluations += 1;
            }
        }
        Ok(())
    }

    /// Report `err` and skip one token so the loop always moves forward. A
    /// token that starts on a later line than the failed unit is kept, since
    /// it most likely begins the next unit.
    fn recover(&mut self, err: UnitError, start_line: usize) -> Result<(), DriverError> {
        self.summary.errors += 1;
        writeln!(self.console, "Error: {}", err)?;

        if self.parser.current_line() > start_line {
            debug!(
                line = self.parser.current_line(),
                "resuming at {}",
                self.parser.current()
            );
        } else {
            debug!("skipping {} after error", self.parser.current());
            self.parser.advance();
        }
        Ok(())
    }

    fn show_prompt(&mut self) -> Result<(), DriverError> {
        if self.prompt {
            write!(self.console, "{}", PROMPT)?;
            self.console.flush()?;
        }
        Ok(())
    }
}
