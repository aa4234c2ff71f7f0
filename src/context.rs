use std::{cell::RefCell, io::{self, Write}, path::Path};

use tracing::debug;

use crate::{
    builtin::{builtin_frame, PRELUDE},
    env::Env,
    error::MalletError,
    interpreter::evaluate,
    parser::parse,
    printer::print,
    value::Value,
};


/// State shared by every evaluation: the global environment, which `eval`
/// always targets, and the sink that printing primitives write to.
pub struct RuntimeContext {
    pub(crate) global: Env,
    output: RefCell<Box<dyn Write>>,
}

impl RuntimeContext {
    pub(crate) fn write_line(&self, line: &str) -> Result<(), MalletError> {
        let mut output = self.output.borrow_mut();
        writeln!(output, "{}", line)
            .and_then(|_| output.flush())
            .map_err(|err| MalletError::runtime(format!("cannot write output: {}", err)))
    }
}

/// An evaluation context that reads source text, evaluates it against one
/// long-lived global environment and hands back values.
///
/// Definitions made by one call stay visible to the next, and a failing
/// call leaves whatever it managed to define in place.
pub struct EvaluationContext {
    runtime: RuntimeContext,
}

impl EvaluationContext {
    pub const ARGV: &'static str = "*ARGV*";

    /// A context whose printing primitives write to stdout.
    pub fn new() -> Result<Self, MalletError> {
        Self::with_output(io::stdout())
    }

    pub fn with_output(output: impl Write + 'static) -> Result<Self, MalletError> {
        let context = Self {
            runtime: RuntimeContext {
                global: builtin_frame(),
                output: RefCell::new(Box::new(output)),
            },
        };

        for source in PRELUDE {
            context.evaluate_str(source)?;
        }
        context.set_argv(&[]);

        Ok(context)
    }

    pub fn global(&self) -> &Env {
        &self.runtime.global
    }

    pub fn set_argv(&self, arguments: &[String]) {
        let arguments = arguments.iter().map(|argument| Value::string(argument)).collect();
        self.runtime.global.insert(Self::ARGV.into(), Value::list(arguments));
    }

    pub fn evaluate(&self, value: Value) -> Result<Value, MalletError> {
        debug!(form = %value, "evaluating");
        evaluate(value, self.runtime.global.clone(), &self.runtime)
    }

    pub fn evaluate_str(&self, input: &str) -> Result<Value, MalletError> {
        self.evaluate(parse(input)?)
    }

    /// Read, evaluate, print: the result is rendered readably.
    pub fn rep(&self, input: &str) -> Result<String, MalletError> {
        self.evaluate_str(input).map(|value| print(&value, true))
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value, MalletError> {
        let path = path.as_ref().to_string_lossy();
        debug!(%path, "loading file");
        self.evaluate(Value::list(vec![Value::symbol("load-file"), Value::string(&path)]))
    }
}
