use std::collections::HashMap;

use inkwell::{
    builder::Builder,
    context::Context,
    execution_engine::{ExecutionEngine, JitFunction},
    module::Module,
    passes::PassManager,
    targets::{InitializationConfig, Target},
    types::BasicTypeEnum,
    values::{BasicValueEnum, FloatValue, FunctionValue},
    FloatPredicate, OptimizationLevel,
};
use tracing::{debug, error};

use crate::ast::{Expression, Function, Prototype, ANON_FN_NAME};
use crate::backend::{Backend, BackendError};
use crate::registry::PrototypeRegistry;

type AnonFunc = unsafe extern "C" fn() -> f64;

fn create_fpm<'a>(module: &Module<'a>) -> PassManager<FunctionValue<'a>> {
    let fpm = PassManager::create(module);
    fpm.add_instruction_combining_pass();
    fpm.add_reassociate_pass();
    fpm.add_new_gvn_pass();
    fpm.add_cfg_simplification_pass();
    fpm.initialize();
    fpm
}

/// Lowers each unit into its own LLVM module and hands finished modules to
/// an MCJIT execution engine, so earlier definitions stay callable.
pub struct Jit<'a> {
    pub context: &'a Context,
    pub module: Module<'a>,
    pub builder: Builder<'a>,
    fpm: PassManager<FunctionValue<'a>>,
    engine: ExecutionEngine<'a>,
    // the engine is created from this module and owns it
    _runtime: Module<'a>,
    named_values: HashMap<String, BasicValueEnum<'a>>,
    unit: usize,
}

impl<'a> Jit<'a> {
    pub fn new(context: &'a Context) -> Result<Jit<'a>, BackendError> {
        Target::initialize_native(&InitializationConfig::default()).map_err(BackendError::Jit)?;

        let runtime = context.create_module("kaleido_runtime");
        let engine = runtime
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|e| BackendError::Jit(e.to_string_lossy().into_owned()))?;

        let module = context.create_module("kaleido_0");
        let fpm = create_fpm(&module);

        Ok(Jit {
            context,
            module,
            builder: context.create_builder(),
            fpm,
            engine,
            _runtime: runtime,
            named_values: HashMap::new(),
            unit: 0,
        })
    }

    fn fresh_module(&mut self) -> Module<'a> {
        self.unit += 1;
        let module = self.context.create_module(&format!("kaleido_{}", self.unit));
        self.fpm = create_fpm(&module);
        std::mem::replace(&mut self.module, module)
    }

    /// the function from this module, or a fresh declaration of the latest
    /// prototype seen for it in an earlier unit
    fn get_func(&self, name: &str, registry: &PrototypeRegistry) -> Option<FunctionValue<'a>> {
        if let Some(func) = self.module.get_function(name) {
            return Some(func);
        }
        registry.get(name).map(|proto| self.compile_proto(proto))
    }

    fn codegen_expr(
        &mut self,
        expr: &Expression,
        registry: &PrototypeRegistry,
    ) -> Result<FloatValue<'a>, BackendError> {
        match expr {
            Expression::Number(value) => Ok(self.context.f64_type().const_float(*value)),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(var) => Ok(var.into_float_value()),
                None => Err(BackendError::UnknownVariable(name.clone())),
            },
            Expression::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left, registry)?;
                let rhs = self.codegen_expr(right, registry)?;

                let predicate = match op {
                    '+' => return Ok(self.builder.build_float_add(lhs, rhs, "tmpadd")),
                    '-' => return Ok(self.builder.build_float_sub(lhs, rhs, "tmpsub")),
                    '*' => return Ok(self.builder.build_float_mul(lhs, rhs, "tmpmul")),
                    '/' => return Ok(self.builder.build_float_div(lhs, rhs, "tmpdiv")),
                    '<' => FloatPredicate::ULT,
                    '>' => FloatPredicate::UGT,
                    _ => return Err(BackendError::UnknownOperator(*op)),
                };
                let cmp = self
                    .builder
                    .build_float_compare(predicate, lhs, rhs, "tmpcmp");
                Ok(self
                    .builder
                    .build_unsigned_int_to_float(cmp, self.context.f64_type(), "tmpbool"))
            }
            Expression::Call(callee, args) => match self.get_func(callee, registry) {
                Some(func) => {
                    if func.get_params().len() != args.len() {
                        return Err(BackendError::InvalidCall(
                            callee.clone(),
                            func.get_params().len(),
                            args.len(),
                        ));
                    }

                    let mut argsv: Vec<BasicValueEnum> = Vec::with_capacity(args.len());
                    for arg in args {
                        argsv.push(self.codegen_expr(arg, registry)?.into());
                    }

                    match self
                        .builder
                        .build_call(func, argsv.as_slice(), "tmp")
                        .try_as_basic_value()
                        .left()
                    {
                        Some(value) => Ok(value.into_float_value()),
                        None => Err(BackendError::InvalidFunction(callee.clone())),
                    }
                }
                None => Err(BackendError::UnknownFunction(callee.clone())),
            },
        }
    }

    fn compile_proto(&self, proto: &Prototype) -> FunctionValue<'a> {
        let args_types = std::iter::repeat(self.context.f64_type())
            .take(proto.args.len())
            .map(|f| f.into())
            .collect::<Vec<BasicTypeEnum>>();

        let fn_type = self.context.f64_type().fn_type(args_types.as_slice(), false);
        let fn_val = self.module.add_function(proto.name.as_str(), fn_type, None);

        for (i, arg) in fn_val.get_param_iter().enumerate() {
            arg.into_float_value().set_name(proto.args[i].as_str());
        }

        fn_val
    }

    fn compile_fn(
        &mut self,
        function: &Function,
        registry: &PrototypeRegistry,
    ) -> Result<FunctionValue<'a>, BackendError> {
        let Function {
            prototype: proto,
            body,
        } = function;
        let llvm_func = self.compile_proto(proto);

        let entry = self.context.append_basic_block(llvm_func, "entry");
        self.builder.position_at_end(entry);

        self.named_values.clear();
        for (i, arg) in llvm_func.get_param_iter().enumerate() {
            self.named_values.insert(proto.args[i].clone(), arg);
        }

        let body = match self.codegen_expr(body, registry) {
            Ok(body) => body,
            Err(e) => {
                unsafe {
                    llvm_func.delete();
                }
                return Err(e);
            }
        };

        self.builder.build_return(Some(&body));

        if llvm_func.verify(true) {
            self.fpm.run_on(&llvm_func);
            debug!(
                "lowered {}:\n{}",
                proto.name,
                llvm_func.print_to_string().to_string_lossy()
            );
            Ok(llvm_func)
        } else {
            unsafe {
                llvm_func.delete();
            }

            Err(BackendError::InvalidFunction(proto.name.clone()))
        }
    }
}

impl<'a> Backend for Jit<'a> {
    fn declare(
        &mut self,
        prototype: &Prototype,
        _registry: &PrototypeRegistry,
    ) -> Result<(), BackendError> {
        let func = self.compile_proto(prototype);
        debug!("declared {}", func.print_to_string().to_string_lossy());
        Ok(())
    }

    fn define(
        &mut self,
        function: &Function,
        registry: &PrototypeRegistry,
    ) -> Result<(), BackendError> {
        self.compile_fn(function, registry).map(|_| ())
    }

    fn evaluate(
        &mut self,
        function: &Function,
        registry: &PrototypeRegistry,
    ) -> Result<f64, BackendError> {
        self.compile_fn(function, registry)?;

        let module = self.fresh_module();
        self.engine
            .add_module(&module)
            .map_err(|_| BackendError::Jit("module already owned by an engine".to_string()))?;

        let result = unsafe { self.engine.get_function::<AnonFunc>(ANON_FN_NAME) }
            .map(|entry: JitFunction<AnonFunc>| unsafe { entry.call() })
            .map_err(|e| BackendError::Jit(e.to_string()));

        if let Err(e) = self.engine.remove_module(&module) {
            error!("failed to remove evaluated module: {}", e.to_string_lossy());
        }

        result
    }

    fn begin_unit(&mut self) {
        let module = self.fresh_module();
        if self.engine.add_module(&module).is_err() {
            error!("failed to add {:?} to the engine", module.get_name());
        }
    }
}
