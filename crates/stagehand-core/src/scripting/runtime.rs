//! # Script Runtime
//!
//! `ScriptRuntime` is created once per [`Manager`](crate::Manager). It owns the
//! shared Rhai standard package and the configured limits. Every action or text
//! region gets its own [`ScriptEngine`] built from it, so no script state is
//! shared between nodes.

use super::api;
use super::convert::{infer_value, to_dynamic, to_value};
use crate::config::EngineConfig;
use crate::errors::ScriptError;
use crate::events::LogLevel;
use crate::value::{Value, ValueKind};
use rhai::packages::{Package, StandardPackage};
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

/// Shared scripting context threaded into every engine instance.
pub struct ScriptRuntime {
    package: StandardPackage,
    config: EngineConfig,
}

impl ScriptRuntime {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            package: StandardPackage::new(),
            config: config.clone(),
        }
    }

    /// Builds an isolated engine with its own scope and properties.
    pub fn create_engine(&self) -> ScriptEngine {
        let mut engine = Engine::new_raw();
        engine.register_global_module(self.package.as_shared_module());

        let c = &self.config;
        engine.set_max_operations(c.max_operations);
        engine.set_max_call_levels(c.max_call_levels);
        engine.set_max_expr_depths(c.max_expr_depth, c.max_expr_depth);
        engine.set_max_string_size(c.max_string_size);
        engine.set_max_array_size(c.max_array_size);
        engine.set_max_map_size(c.max_map_size);

        api::register(&mut engine);

        let properties: Rc<RefCell<Map>> = Rc::new(RefCell::new(Map::new()));
        let logs: Rc<RefCell<Vec<(LogLevel, String)>>> = Rc::new(RefCell::new(Vec::new()));

        // Properties are visible by bare name everywhere, including inside
        // script functions, unless a local variable of the same name is in scope.
        let props = properties.clone();
        engine.on_var(move |name, index, context| {
            if index > 0 || context.scope().contains(name) {
                return Ok(None);
            }
            Ok(props.borrow().get(name).cloned())
        });

        let print_logs = logs.clone();
        engine.on_print(move |s| {
            info!(target: "script", "{}", s);
            print_logs.borrow_mut().push((LogLevel::Info, s.to_string()));
        });

        let debug_logs = logs.clone();
        engine.on_debug(move |s, _source, pos| {
            debug!(target: "script", "{} @ {}", s, pos);
            debug_logs.borrow_mut().push((LogLevel::Debug, s.to_string()));
        });

        ScriptEngine {
            engine,
            scope: Scope::new(),
            ast: AST::empty(),
            properties,
            logs,
        }
    }
}

/// One isolated script context: evaluate source, invoke its functions, and
/// bind named properties that the script reads as plain variables.
pub struct ScriptEngine {
    engine: Engine,
    scope: Scope<'static>,
    ast: AST,
    properties: Rc<RefCell<Map>>,
    logs: Rc<RefCell<Vec<(LogLevel, String)>>>,
}

impl ScriptEngine {
    /// Evaluates `source` in this context.
    ///
    /// Functions it defines stay callable through [`invoke`](Self::invoke);
    /// top-level `let` bindings persist in the scope.
    pub fn evaluate(&mut self, source: &str) -> Result<Value, ScriptError> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| ScriptError::Parse(e.to_string()))?;
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast)
            .map_err(runtime_error)?;
        self.ast += ast;
        infer_value(result)
    }

    /// Calls a script function and converts its result to `expected`.
    pub fn invoke(
        &mut self,
        function: &str,
        args: &[Value],
        expected: ValueKind,
    ) -> Result<Value, ScriptError> {
        if !self.has_function(function) {
            return Err(ScriptError::MissingFunction(function.to_string()));
        }
        let args: Vec<Dynamic> = args.iter().map(to_dynamic).collect();
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, function, args)
            .map_err(runtime_error)?;
        to_value(result, expected)
    }

    pub fn has_function(&self, function: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == function)
    }

    pub fn set_property(&mut self, name: &str, value: &Value) {
        self.properties
            .borrow_mut()
            .insert(name.into(), to_dynamic(value));
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.borrow().contains_key(name)
    }

    /// Takes the `print`/`debug` output collected since the last call.
    pub fn take_logs(&mut self) -> Vec<(LogLevel, String)> {
        std::mem::take(&mut *self.logs.borrow_mut())
    }
}

fn runtime_error(err: Box<EvalAltResult>) -> ScriptError {
    match *err {
        EvalAltResult::ErrorFunctionNotFound(signature, _) => {
            ScriptError::MissingFunction(signature)
        }
        other => ScriptError::Runtime(other.to_string()),
    }
}
