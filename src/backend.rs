use crate::ast::{Function, Prototype};
use crate::registry::PrototypeRegistry;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown variable referenced {0}")]
    UnknownVariable(String),
    #[error("unknown operator {0}")]
    UnknownOperator(char),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("invalid number of args in call {0} expected {1} found {2}")]
    InvalidCall(String, usize, usize),
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
    #[error("extern {0} has no implementation")]
    UnresolvedExternal(String),
    #[error("call depth exceeded {0} while calling {1}")]
    RecursionLimit(usize, String),
    #[error("jit failure: {0}")]
    Jit(String),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// The stage that turns parsed units into something runnable.
///
/// The driver calls exactly one of `declare`, `define` or `evaluate` per
/// accepted unit, and `begin_unit` after every successful declare or define.
/// The registry passed in already holds every earlier accepted prototype; the
/// one being declared or defined is added only after the call succeeds.
pub trait Backend {
    fn declare(
        &mut self,
        prototype: &Prototype,
        registry: &PrototypeRegistry,
    ) -> Result<(), BackendError>;

    fn define(
        &mut self,
        function: &Function,
        registry: &PrototypeRegistry,
    ) -> Result<(), BackendError>;

    /// run an anonymous nullary function right away, returning its value
    fn evaluate(
        &mut self,
        function: &Function,
        registry: &PrototypeRegistry,
    ) -> Result<f64, BackendError>;

    fn begin_unit(&mut self);
}
