use std::{collections::HashMap, rc::Rc};

use itertools::Itertools;
use tracing::trace;

use crate::{
    context::RuntimeContext,
    env::Env,
    error::MalletError,
    printer::print,
    value::{EvaluationResult, Function, Parameters, Value},
};


pub(crate) const DEBUG_EVAL: &str = "DEBUG-EVAL";

/// What a special form or an application asks the evaluator to do next.
///
/// Forms whose result is "evaluate this other expression" hand it back as
/// a [`Step::TailCall`] so the loop in [`evaluate`] can carry on without
/// growing the native stack.
enum Step {
    Return(Value),
    TailCall(Value, Env),
}

type StepResult = Result<Step, MalletError>;

fn error_at(form: &Value, message: impl AsRef<str>) -> MalletError {
    MalletError::eval(format!("{}: {}", print(form, true), message.as_ref()))
}

fn expect_arity(form: &Value, arguments: &[Value], allowed: &[usize]) -> Result<(), MalletError> {
    if allowed.contains(&arguments.len()) { return Ok(()); }

    let expected = allowed.iter().join(" or ");
    Err(error_at(form, format!("expected {} arguments, got {}", expected, arguments.len())))
}

fn evaluate_each(values: &[Value], environment: &Env, ctx: &RuntimeContext) -> Result<Vec<Value>, MalletError> {
    values.iter()
        .map(|value| evaluate(value.clone(), environment.clone(), ctx))
        .collect()
}

// Shared by `do`, `let*` and closure bodies: everything but the last form
// runs for effect and the last one is handed back in tail position.
fn evaluate_body(body: &[Value], environment: Env, ctx: &RuntimeContext) -> StepResult {
    let Some((last, init)) = body.split_last() else {
        return Ok(Step::Return(Value::Nil));
    };

    for form in init {
        evaluate(form.clone(), environment.clone(), ctx)?;
    }
    Ok(Step::TailCall(last.clone(), environment))
}

fn evaluate_define(form: &Value, arguments: &[Value], environment: &Env, ctx: &RuntimeContext) -> StepResult {
    // (def! name expr) binds in the current frame, never in a parent
    expect_arity(form, arguments, &[2])?;

    let Value::Symbol(name) = &arguments[0] else {
        return Err(error_at(form, "definition target must be a symbol"));
    };

    let value = evaluate(arguments[1].clone(), environment.clone(), ctx)?;
    environment.insert(name.clone(), value.clone());
    Ok(Step::Return(value))
}

fn evaluate_let(form: &Value, arguments: &[Value], environment: &Env, ctx: &RuntimeContext) -> StepResult {
    // (let* (name expr ...) body...) evaluates each expr in the frame built
    // so far, so later bindings can see earlier ones
    let Some((bindings, body)) = arguments.split_first() else {
        return Err(error_at(form, "expected a binding list"));
    };
    let bindings = bindings.as_sequence()
        .ok_or_else(|| error_at(form, "binding list must be a list or a vector"))?;
    if bindings.len() % 2 != 0 {
        return Err(error_at(form, "binding list needs an even number of forms"));
    }

    let sub_environment = Env::new(environment);
    for pair in bindings.chunks_exact(2) {
        let Value::Symbol(name) = &pair[0] else {
            return Err(error_at(form, format!("cannot bind to {}", print(&pair[0], true))));
        };
        let value = evaluate(pair[1].clone(), sub_environment.clone(), ctx)?;
        sub_environment.insert(name.clone(), value);
    }

    evaluate_body(body, sub_environment, ctx)
}

fn evaluate_if(form: &Value, arguments: &[Value], environment: &Env, ctx: &RuntimeContext) -> StepResult {
    expect_arity(form, arguments, &[2, 3])?;

    if evaluate(arguments[0].clone(), environment.clone(), ctx)?.is_truthy() {
        Ok(Step::TailCall(arguments[1].clone(), environment.clone()))
    } else if let Some(otherwise) = arguments.get(2) {
        Ok(Step::TailCall(otherwise.clone(), environment.clone()))
    } else {
        Ok(Step::Return(Value::Nil))
    }
}

fn evaluate_lambda(form: &Value, arguments: &[Value], environment: &Env) -> StepResult {
    let Some((parameters, body)) = arguments.split_first() else {
        return Err(error_at(form, "expected a parameter list"));
    };
    let parameters = parameters.as_sequence()
        .ok_or_else(|| error_at(form, "parameter list must be a list or a vector"))?;
    let parameters = Parameters::from_forms(parameters)
        .map_err(|err| error_at(form, err.to_string()))?;

    Ok(Step::Return(Value::closure(parameters, Rc::from(body), environment.clone())))
}

fn evaluate_quote(form: &Value, arguments: &[Value]) -> StepResult {
    expect_arity(form, arguments, &[1])?;
    Ok(Step::Return(arguments[0].clone()))
}

// Both `quasiquote` and `quasiquoteexpand` hand back the rewritten
// template unevaluated; `eval` is what rebuilds the value from it.
fn evaluate_quasiquote(form: &Value, arguments: &[Value]) -> StepResult {
    expect_arity(form, arguments, &[1])?;
    Ok(Step::Return(quasiquote(&arguments[0])?))
}

fn call(name: &str, arguments: Vec<Value>) -> Value {
    let mut form = Vec::with_capacity(arguments.len() + 1);
    form.push(Value::symbol(name));
    form.extend(arguments);
    Value::list(form)
}

// Returns the single argument of `(head x)` when `form` has that shape.
fn unquoted<'v>(form: &'v Value, head: &str) -> Result<Option<&'v Value>, MalletError> {
    match form {
        Value::List(items) if items.first().is_some_and(|first| first.is_symbol(head)) => {
            match &items[1..] {
                [argument] => Ok(Some(argument)),
                _ => Err(error_at(form, format!("{} expects exactly one argument", head))),
            }
        }
        _ => Ok(None),
    }
}

fn quasiquote_sequence(items: &[Value]) -> EvaluationResult {
    let mut result = Value::list(vec![]);
    for item in items.iter().rev() {
        result = match unquoted(item, "splice-unquote")? {
            Some(spliced) => call("concat", vec![spliced.clone(), result]),
            None => call("cons", vec![quasiquote(item)?, result]),
        };
    }
    Ok(result)
}

/// Rewrites a quasiquoted template into an ordinary expression that
/// rebuilds it, evaluating only the `unquote` and `splice-unquote` holes.
pub(crate) fn quasiquote(template: &Value) -> EvaluationResult {
    match template {
        Value::List(items) => match unquoted(template, "unquote")? {
            Some(argument) => Ok(argument.clone()),
            None => quasiquote_sequence(items),
        },
        Value::Vector(items) => Ok(call("vec", vec![quasiquote_sequence(items)?])),
        Value::Symbol(_) | Value::HashMap(_) => Ok(call("quote", vec![template.clone()])),
        _ => Ok(template.clone()),
    }
}

/// Calls `function` with already evaluated arguments and runs it to
/// completion. Primitives such as `swap!` and `apply` go through here.
pub(crate) fn apply(function: &Function, arguments: Vec<Value>, ctx: &RuntimeContext) -> EvaluationResult {
    match apply_step(function, arguments, ctx)? {
        Step::Return(value) => Ok(value),
        Step::TailCall(form, environment) => evaluate(form, environment, ctx),
    }
}

fn apply_step(function: &Function, arguments: Vec<Value>, ctx: &RuntimeContext) -> StepResult {
    match function {
        Function::Builtin(builtin) => Ok(Step::Return((builtin.func)(arguments, ctx)?)),
        Function::Closure(closure) => {
            let environment = Env::bind(&closure.environment, &closure.parameters, arguments)?;
            evaluate_body(&closure.body, environment, ctx)
        }
    }
}

fn evaluate_application(form: &Value, items: &[Value], environment: &Env, ctx: &RuntimeContext) -> StepResult {
    let mut values = evaluate_each(items, environment, ctx)?;
    let arguments = values.split_off(1);

    match &values[0] {
        Value::Function(function) => apply_step(function, arguments, ctx),
        other => Err(error_at(form, format!("{} is not a function", print(other, true)))),
    }
}

fn debug_eval_enabled(environment: &Env) -> bool {
    environment.get(DEBUG_EVAL).is_some_and(|value| value.is_truthy())
}

fn evaluate_list(form: &Value, items: &[Value], environment: &Env, ctx: &RuntimeContext) -> StepResult {
    let arguments = &items[1..];
    let special_form = match &items[0] {
        Value::Symbol(name) => &**name,
        _ => "",
    };

    trace!(special_form, "dispatching");
    match special_form {
        "def!" => evaluate_define(form, arguments, environment, ctx),
        "let*" => evaluate_let(form, arguments, environment, ctx),
        "do" => evaluate_body(arguments, environment.clone(), ctx),
        "if" => evaluate_if(form, arguments, environment, ctx),
        "fn*" => evaluate_lambda(form, arguments, environment),
        "quote" => evaluate_quote(form, arguments),
        "quasiquote" | "quasiquoteexpand" => evaluate_quasiquote(form, arguments),
        _ => evaluate_application(form, items, environment, ctx),
    }
}

/// Evaluates `ast` in `environment`.
///
/// Tail positions (`do`, `if`, `let*` bodies and closure bodies) replace
/// the current expression and environment and go round the loop again,
/// so self-recursive programs run in constant native stack.
pub(crate) fn evaluate(mut ast: Value, mut environment: Env, ctx: &RuntimeContext) -> EvaluationResult {
    loop {
        if debug_eval_enabled(&environment) {
            ctx.write_line(&format!("EVAL: {}", print(&ast, true)))?;
        }

        let step = match &ast {
            Value::Symbol(name) => {
                return environment.get(name)
                    .ok_or_else(|| MalletError::eval(format!("symbol '{}' not found", name)));
            }
            Value::Vector(items) => return Ok(Value::vector(evaluate_each(items, &environment, ctx)?)),
            Value::HashMap(entries) => {
                // Key order, so side effects in the values happen in a fixed order
                let entries = entries.iter()
                    .sorted_by(|(a, _), (b, _)| a.cmp(b))
                    .map(|(key, value)| Ok((key.clone(), evaluate(value.clone(), environment.clone(), ctx)?)))
                    .collect::<Result<HashMap<_, _>, MalletError>>()?;
                return Ok(Value::hash_map(entries));
            }
            Value::List(items) if !items.is_empty() => evaluate_list(&ast, items, &environment, ctx)?,
            Value::Nil | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Keyword(_)
            | Value::List(_) | Value::Function(_) | Value::Atom(_) => return Ok(ast.clone()),
        };

        match step {
            Step::Return(value) => return Ok(value),
            Step::TailCall(next, next_environment) => {
                trace!("tail call");
                ast = next;
                environment = next_environment;
            }
        }
    }
}
