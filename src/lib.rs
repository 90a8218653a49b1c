//! Front end of an interactive expression language: a streaming lexer, a
//! precedence-climbing parser, and a driver loop that hands each top-level
//! unit to a pluggable [`backend::Backend`].

pub mod ast;
pub mod backend;
#[cfg(feature = "llvm")]
pub mod codegen;
pub mod config;
pub mod driver;
pub mod interpreter;
pub mod lexer;
pub mod logger;
pub mod parser;
pub mod registry;

pub use driver::{Driver, Summary};
pub use parser::Parser;
