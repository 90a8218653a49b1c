use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{Expression, Function, Prototype};
use crate::backend::{Backend, BackendError};
use crate::registry::PrototypeRegistry;

/// without control flow no recursion can terminate, so cap it
const MAX_CALL_DEPTH: usize = 200;

#[derive(Debug, Clone, Copy)]
enum Builtin {
    Unary(fn(f64) -> f64),
    Binary(fn(f64, f64) -> f64),
    PutChar,
    PrintDouble,
}

/// host functions an `extern` can bind to, with their arity
fn builtin(name: &str) -> Option<(usize, Builtin)> {
    let builtin = match name {
        "sin" => Builtin::Unary(f64::sin),
        "cos" => Builtin::Unary(f64::cos),
        "tan" => Builtin::Unary(f64::tan),
        "atan" => Builtin::Unary(f64::atan),
        "exp" => Builtin::Unary(f64::exp),
        "log" => Builtin::Unary(f64::ln),
        "sqrt" => Builtin::Unary(f64::sqrt),
        "floor" => Builtin::Unary(f64::floor),
        "ceil" => Builtin::Unary(f64::ceil),
        "fabs" => Builtin::Unary(f64::abs),
        "pow" => Builtin::Binary(f64::powf),
        "putchard" => Builtin::PutChar,
        "printd" => Builtin::PrintDouble,
        _ => return None,
    };
    let arity = match builtin {
        Builtin::Binary(_) => 2,
        _ => 1,
    };
    Some((arity, builtin))
}

/// Evaluates trees directly. Definitions are checked when they are handed
/// over and become callable once the unit that defined them is closed.
pub struct Interpreter<W> {
    functions: HashMap<String, Rc<Function>>,
    externs: HashSet<String>,
    staged: Vec<Function>,
    out: W,
}

impl<W: Write> Interpreter<W> {
    /// `out` receives whatever `putchard` and `printd` print
    pub fn new(out: W) -> Self {
        Self {
            functions: HashMap::new(),
            externs: HashSet::new(),
            staged: Vec::new(),
            out,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn is_callable(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.externs.contains(name)
    }

    fn check_expr(
        &self,
        expr: &Expression,
        current: &Prototype,
        registry: &PrototypeRegistry,
    ) -> Result<(), BackendError> {
        match expr {
            Expression::Number(_) => Ok(()),
            Expression::Variable(name) => {
                if current.args.contains(name) {
                    Ok(())
                } else {
                    Err(BackendError::UnknownVariable(name.clone()))
                }
            }
            Expression::Binary(op, lhs, rhs) => {
                if !"+-*/<>".contains(*op) {
                    return Err(BackendError::UnknownOperator(*op));
                }
                self.check_expr(lhs, current, registry)?;
                self.check_expr(rhs, current, registry)
            }
            Expression::Call(callee, args) => {
                let expected = if *callee == current.name {
                    current.arity()
                } else {
                    match registry.arity(callee) {
                        Some(arity) => arity,
                        None => return Err(BackendError::UnknownFunction(callee.clone())),
                    }
                };
                if expected != args.len() {
                    return Err(BackendError::InvalidCall(callee.clone(), expected, args.len()));
                }
                for arg in args {
                    self.check_expr(arg, current, registry)?;
                }
                Ok(())
            }
        }
    }

    fn eval(
        &mut self,
        expr: &Expression,
        params: &[String],
        values: &[f64],
        depth: usize,
    ) -> Result<f64, BackendError> {
        match expr {
            Expression::Number(value) => Ok(*value),
            Expression::Variable(name) => match params.iter().rposition(|p| p == name) {
                Some(i) => Ok(values[i]),
                None => Err(BackendError::UnknownVariable(name.clone())),
            },
            Expression::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, params, values, depth)?;
                let rhs = self.eval(rhs, params, values, depth)?;
                match op {
                    '+' => Ok(lhs + rhs),
                    '-' => Ok(lhs - rhs),
                    '*' => Ok(lhs * rhs),
                    '/' => Ok(lhs / rhs),
                    '<' => Ok(if lhs < rhs { 1.0 } else { 0.0 }),
                    '>' => Ok(if lhs > rhs { 1.0 } else { 0.0 }),
                    _ => Err(BackendError::UnknownOperator(*op)),
                }
            }
            Expression::Call(callee, args) => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg, params, values, depth)?);
                }
                self.call(callee, &evaluated, depth + 1)
            }
        }
    }

    fn call(&mut self, callee: &str, args: &[f64], depth: usize) -> Result<f64, BackendError> {
        if depth > MAX_CALL_DEPTH {
            return Err(BackendError::RecursionLimit(MAX_CALL_DEPTH, callee.to_string()));
        }

        if let Some(function) = self.functions.get(callee).cloned() {
            let params = &function.prototype.args;
            if params.len() != args.len() {
                return Err(BackendError::InvalidCall(
                    callee.to_string(),
                    params.len(),
                    args.len(),
                ));
            }
            return self.eval(&function.body, params, args, depth);
        }

        if !self.externs.contains(callee) {
            return Err(BackendError::UnknownFunction(callee.to_string()));
        }
        match builtin(callee) {
            Some((arity, _)) if arity != args.len() => Err(BackendError::InvalidCall(
                callee.to_string(),
                arity,
                args.len(),
            )),
            Some((_, Builtin::Unary(f))) => Ok(f(args[0])),
            Some((_, Builtin::Binary(f))) => Ok(f(args[0], args[1])),
            Some((_, Builtin::PutChar)) => {
                write!(self.out, "{}", char::from(args[0] as u8))?;
                Ok(0.0)
            }
            Some((_, Builtin::PrintDouble)) => {
                writeln!(self.out, "{}", args[0])?;
                Ok(0.0)
            }
            None => Err(BackendError::UnresolvedExternal(callee.to_string())),
        }
    }
}

impl<W: Write> Backend for Interpreter<W> {
    fn declare(
        &mut self,
        prototype: &Prototype,
        _registry: &PrototypeRegistry,
    ) -> Result<(), BackendError> {
        if let Some((arity, _)) = builtin(&prototype.name) {
            if arity != prototype.arity() {
                return Err(BackendError::InvalidCall(
                    prototype.name.clone(),
                    arity,
                    prototype.arity(),
                ));
            }
        }
        debug!(name = %prototype.name, "declared extern");
        self.externs.insert(prototype.name.clone());
        Ok(())
    }

    fn define(
        &mut self,
        function: &Function,
        registry: &PrototypeRegistry,
    ) -> Result<(), BackendError> {
        self.check_expr(&function.body, &function.prototype, registry)?;
        debug!(name = %function.prototype.name, "staged definition");
        self.staged.push(function.clone());
        Ok(())
    }

    fn evaluate(
        &mut self,
        function: &Function,
        registry: &PrototypeRegistry,
    ) -> Result<f64, BackendError> {
        self.check_expr(&function.body, &function.prototype, registry)?;
        let value = self.eval(&function.body, &function.prototype.args, &[], 0)?;
        self.out.flush()?;
        Ok(value)
    }

    fn begin_unit(&mut self) {
        for function in self.staged.drain(..) {
            self.functions
                .insert(function.prototype.name.clone(), Rc::new(function));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn define(interp: &mut Interpreter<Vec<u8>>, registry: &mut PrototypeRegistry, src: &str) {
        let function = Parser::from_source(src).parse_definition().unwrap();
        interp.define(&function, registry).unwrap();
        registry.put(function.prototype);
        interp.begin_unit();
    }

    fn declare(interp: &mut Interpreter<Vec<u8>>, registry: &mut PrototypeRegistry, src: &str) {
        let prototype = Parser::from_source(src).parse_extern().unwrap();
        interp.declare(&prototype, registry).unwrap();
        registry.put(prototype);
        interp.begin_unit();
    }

    fn evaluate(
        interp: &mut Interpreter<Vec<u8>>,
        registry: &PrototypeRegistry,
        src: &str,
    ) -> Result<f64, BackendError> {
        let function = Parser::from_source(src)
            .parse_top_level_expression()
            .unwrap();
        interp.evaluate(&function, registry)
    }

    #[test]
    fn evaluates_arithmetic() {
        let mut interp = Interpreter::new(Vec::new());
        let registry = PrototypeRegistry::new();
        assert_eq!(evaluate(&mut interp, &registry, "1 + 2 * 3").unwrap(), 7.0);
        assert_eq!(evaluate(&mut interp, &registry, "8 - 2 - 1").unwrap(), 5.0);
        assert_eq!(evaluate(&mut interp, &registry, "(1 < 2) + (1 > 2)").unwrap(), 1.0);
        assert_eq!(evaluate(&mut interp, &registry, "1 / 4").unwrap(), 0.25);
    }

    #[test]
    fn calls_user_functions() {
        let mut interp = Interpreter::new(Vec::new());
        let mut registry = PrototypeRegistry::new();
        define(&mut interp, &mut registry, "def sq(x) x * x");
        define(&mut interp, &mut registry, "def hyp2(a b) sq(a) + sq(b)");
        assert_eq!(evaluate(&mut interp, &registry, "hyp2(3, 4)").unwrap(), 25.0);
    }

    #[test]
    fn calls_builtin_externs() {
        let mut interp = Interpreter::new(Vec::new());
        let mut registry = PrototypeRegistry::new();
        declare(&mut interp, &mut registry, "extern sqrt(x)");
        declare(&mut interp, &mut registry, "extern printd(x)");
        assert_eq!(evaluate(&mut interp, &registry, "sqrt(16)").unwrap(), 4.0);
        assert_eq!(evaluate(&mut interp, &registry, "printd(2.5)").unwrap(), 0.0);
        assert_eq!(String::from_utf8_lossy(interp.output()), "2.5\n");
    }

    #[test]
    fn extern_without_builtin_fails_when_called() {
        let mut interp = Interpreter::new(Vec::new());
        let mut registry = PrototypeRegistry::new();
        declare(&mut interp, &mut registry, "extern mystery(a b)");
        match evaluate(&mut interp, &registry, "mystery(1, 2)") {
            Err(BackendError::UnresolvedExternal(name)) => assert_eq!(name, "mystery"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn extern_with_wrong_builtin_arity_is_rejected() {
        let mut interp = Interpreter::new(Vec::new());
        let registry = PrototypeRegistry::new();
        let prototype = Parser::from_source("extern sin(a b)").parse_extern().unwrap();
        assert!(matches!(
            interp.declare(&prototype, &registry),
            Err(BackendError::InvalidCall(_, 1, 2))
        ));
    }

    #[test]
    fn definition_body_is_checked() {
        let mut interp = Interpreter::new(Vec::new());
        let registry = PrototypeRegistry::new();

        let function = Parser::from_source("def f(x) y").parse_definition().unwrap();
        assert!(matches!(
            interp.define(&function, &registry),
            Err(BackendError::UnknownVariable(_))
        ));

        let function = Parser::from_source("def f(x) g(x)").parse_definition().unwrap();
        assert!(matches!(
            interp.define(&function, &registry),
            Err(BackendError::UnknownFunction(_))
        ));
        interp.begin_unit();
        assert!(!interp.is_callable("f"));
    }

    #[test]
    fn arity_is_checked_against_registry() {
        let mut interp = Interpreter::new(Vec::new());
        let mut registry = PrototypeRegistry::new();
        define(&mut interp, &mut registry, "def twice(x) x + x");
        assert!(matches!(
            evaluate(&mut interp, &registry, "twice(1, 2)"),
            Err(BackendError::InvalidCall(_, 1, 2))
        ));
    }

    #[test]
    fn definitions_wait_for_unit_boundary() {
        let mut interp = Interpreter::new(Vec::new());
        let registry = PrototypeRegistry::new();
        let function = Parser::from_source("def one() 1").parse_definition().unwrap();
        interp.define(&function, &registry).unwrap();
        assert!(!interp.is_callable("one"));
        interp.begin_unit();
        assert!(interp.is_callable("one"));
    }

    #[test]
    fn recursion_hits_limit() {
        let mut interp = Interpreter::new(Vec::new());
        let mut registry = PrototypeRegistry::new();
        define(&mut interp, &mut registry, "def loop(x) loop(x + 1)");
        assert!(matches!(
            evaluate(&mut interp, &registry, "loop(0)"),
            Err(BackendError::RecursionLimit(MAX_CALL_DEPTH, _))
        ));
    }
}
