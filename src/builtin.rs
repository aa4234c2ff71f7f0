use std::{collections::HashMap, rc::Rc};

use itertools::Itertools;

use crate::{
    context::RuntimeContext,
    env::Env,
    error::MalletError,
    interpreter::{apply, evaluate, DEBUG_EVAL},
    parser::parse,
    printer::print_all,
    value::{BuiltinFn, EvaluationResult, Function, HashKey, Value},
};


/// Definitions written in the language itself, evaluated into every new
/// global environment.
pub(crate) const PRELUDE: &[&str] = &[
    "(def! not (fn* (a) (if a false true)))",
    "(def! compose (fn* (f g) (fn* (x) (g (f x)))))",
    "(def! load-file
        (let* (do-str (fn* (s) (str \"(do \" s \"\nnil)\"))
               eval-from-string (compose read-string eval))
          (compose (compose slurp do-str) eval-from-string)))",
];

fn type_error(name: &str, expected: &str, value: &Value) -> MalletError {
    MalletError::runtime(format!("{}: expected {}, got {}", name, expected, value.type_name()))
}

fn expect_args<const N: usize>(name: &str, values: Vec<Value>) -> Result<[Value; N], MalletError> {
    values.try_into().map_err(|values: Vec<Value>| {
        MalletError::runtime(format!("{}: expected {} arguments, got {}", name, N, values.len()))
    })
}

fn expect_at_least(name: &str, values: &[Value], count: usize) -> Result<(), MalletError> {
    if values.len() >= count { return Ok(()); }
    Err(MalletError::runtime(format!("{}: expected at least {} arguments, got {}", name, count, values.len())))
}

fn value_list_to_numbers(name: &str, values: &[Value]) -> Result<Vec<i64>, MalletError> {
    values.iter()
        .map(|value| match value {
            Value::Number(number) => Ok(*number),
            other => Err(type_error(name, "a number", other)),
        }).collect()
}

// `nil` behaves as an empty sequence wherever a sequence is expected
fn sequence<'v>(name: &str, value: &'v Value) -> Result<&'v [Value], MalletError> {
    match value {
        Value::Nil => Ok(&[]),
        other => other.as_sequence().ok_or_else(|| type_error(name, "a sequence", other)),
    }
}

fn function<'v>(name: &str, value: &'v Value) -> Result<&'v Function, MalletError> {
    match value {
        Value::Function(function) => Ok(&**function),
        other => Err(type_error(name, "a function", other)),
    }
}

fn text<'v>(name: &str, value: &'v Value) -> Result<&'v str, MalletError> {
    match value {
        Value::String(text) => Ok(&**text),
        other => Err(type_error(name, "a string", other)),
    }
}

fn hash_key(name: &str, value: &Value) -> Result<HashKey, MalletError> {
    HashKey::from_value(value).ok_or_else(|| type_error(name, "a string or keyword key", value))
}

fn overflow(name: &str) -> MalletError {
    MalletError::runtime(format!("{}: integer overflow", name))
}

fn builtin_add(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let numbers = value_list_to_numbers("+", &values)?;
    numbers.into_iter()
        .try_fold(0i64, |a, b| a.checked_add(b))
        .map(Value::Number)
        .ok_or_else(|| overflow("+"))
}

fn builtin_sub(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    expect_at_least("-", &values, 1)?;

    let numbers = value_list_to_numbers("-", &values)?;
    let result = match numbers.split_first() {
        Some((first, [])) => first.checked_neg(),
        Some((first, rest)) => rest.iter().try_fold(*first, |a, b| a.checked_sub(*b)),
        None => None,
    };
    result.map(Value::Number).ok_or_else(|| overflow("-"))
}

fn builtin_mul(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let numbers = value_list_to_numbers("*", &values)?;
    numbers.into_iter()
        .try_fold(1i64, |a, b| a.checked_mul(b))
        .map(Value::Number)
        .ok_or_else(|| overflow("*"))
}

fn checked_div(a: i64, b: i64) -> Result<i64, MalletError> {
    if b == 0 { return Err(MalletError::runtime("/: division by zero")); }
    a.checked_div(b).ok_or_else(|| overflow("/"))
}

fn builtin_div(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    expect_at_least("/", &values, 1)?;

    let numbers = value_list_to_numbers("/", &values)?;
    let result = match numbers.split_first() {
        Some((first, [])) => checked_div(1, *first),
        Some((first, rest)) => rest.iter().try_fold(*first, |a, b| checked_div(a, *b)),
        None => Err(MalletError::runtime("/: expected at least 1 arguments, got 0")),
    };
    result.map(Value::Number)
}

fn builtin_compare(name: &str, values: Vec<Value>, f: impl Fn(i64, i64) -> bool) -> EvaluationResult {
    let numbers = value_list_to_numbers(name, &values)?;
    Ok(Value::Bool(numbers.into_iter().tuple_windows().all(|(a, b)| f(a, b))))
}

fn builtin_less(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_compare("<", values, |a, b| a < b)
}

fn builtin_less_eq(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_compare("<=", values, |a, b| a <= b)
}

fn builtin_greater(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_compare(">", values, |a, b| a > b)
}

fn builtin_greater_eq(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_compare(">=", values, |a, b| a >= b)
}

fn builtin_equal(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    Ok(Value::Bool(values.iter().tuple_windows().all(|(a, b)| a.equals(b))))
}

fn builtin_identical(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    Ok(Value::Bool(values.iter().tuple_windows().all(|(a, b)| a.identical(b))))
}

fn builtin_list(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    Ok(Value::list(values))
}

fn builtin_vector(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    Ok(Value::vector(values))
}

fn builtin_type_check(name: &str, values: Vec<Value>, f: impl Fn(&Value) -> bool) -> EvaluationResult {
    let [value] = expect_args(name, values)?;
    Ok(Value::Bool(f(&value)))
}

fn builtin_is_list(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("list?", values, |value| matches!(value, Value::List(_)))
}

fn builtin_is_vector(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("vector?", values, |value| matches!(value, Value::Vector(_)))
}

fn builtin_is_sequential(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("sequential?", values, |value| value.as_sequence().is_some())
}

fn builtin_is_map(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("map?", values, |value| matches!(value, Value::HashMap(_)))
}

fn builtin_is_nil(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("nil?", values, |value| matches!(value, Value::Nil))
}

fn builtin_is_true(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("true?", values, |value| matches!(value, Value::Bool(true)))
}

fn builtin_is_false(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("false?", values, |value| matches!(value, Value::Bool(false)))
}

fn builtin_is_symbol(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("symbol?", values, |value| matches!(value, Value::Symbol(_)))
}

fn builtin_is_keyword(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("keyword?", values, |value| matches!(value, Value::Keyword(_)))
}

fn builtin_is_string(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("string?", values, |value| matches!(value, Value::String(_)))
}

fn builtin_is_function(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("fn?", values, |value| matches!(value, Value::Function(_)))
}

fn builtin_is_atom(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    builtin_type_check("atom?", values, |value| matches!(value, Value::Atom(_)))
}

fn builtin_is_empty(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("empty?", values)?;
    match &value {
        Value::HashMap(entries) => Ok(Value::Bool(entries.is_empty())),
        other => Ok(Value::Bool(sequence("empty?", other)?.is_empty())),
    }
}

fn builtin_count(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("count", values)?;
    let count = match &value {
        Value::HashMap(entries) => entries.len(),
        other => sequence("count", other)?.len(),
    };
    i64::try_from(count).map(Value::Number).map_err(|_| overflow("count"))
}

fn builtin_cons(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [head, tail] = expect_args("cons", values)?;
    let tail = sequence("cons", &tail)?;

    let mut result = Vec::with_capacity(tail.len() + 1);
    result.push(head);
    result.extend_from_slice(tail);
    Ok(Value::list(result))
}

fn builtin_concat(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let mut result = vec![];
    for value in &values {
        result.extend_from_slice(sequence("concat", value)?);
    }
    Ok(Value::list(result))
}

fn builtin_vec(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("vec", values)?;
    match value {
        vector @ Value::Vector(_) => Ok(vector),
        other => Ok(Value::vector(sequence("vec", &other)?.to_vec())),
    }
}

fn builtin_first(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("first", values)?;
    Ok(sequence("first", &value)?.first().cloned().unwrap_or(Value::Nil))
}

fn builtin_rest(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("rest", values)?;
    let items = sequence("rest", &value)?;
    Ok(Value::list(items.get(1..).unwrap_or_default().to_vec()))
}

fn builtin_nth(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value, index] = expect_args("nth", values)?;
    let items = sequence("nth", &value)?;
    let Value::Number(index) = index else {
        return Err(type_error("nth", "a number", &index));
    };

    usize::try_from(index).ok()
        .and_then(|index| items.get(index))
        .cloned()
        .ok_or_else(|| MalletError::runtime(format!("nth: index {} out of range", index)))
}

fn builtin_hash_map(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    if values.len() % 2 != 0 {
        return Err(MalletError::runtime("hash-map: expected an even number of arguments"));
    }

    // Later keys silently replace earlier ones
    let entries = values.into_iter()
        .tuples()
        .map(|(key, value)| Ok((hash_key("hash-map", &key)?, value)))
        .collect::<Result<HashMap<_, _>, MalletError>>()?;
    Ok(Value::hash_map(entries))
}

fn hash_map_argument<'v>(name: &str, value: &'v Value) -> Result<Option<&'v HashMap<HashKey, Value>>, MalletError> {
    match value {
        Value::HashMap(entries) => Ok(Some(&**entries)),
        Value::Nil => Ok(None),
        other => Err(type_error(name, "a hash-map", other)),
    }
}

fn builtin_get(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [map, key] = expect_args("get", values)?;
    let key = hash_key("get", &key)?;
    Ok(hash_map_argument("get", &map)?
        .and_then(|entries| entries.get(&key))
        .cloned()
        .unwrap_or(Value::Nil))
}

fn builtin_contains(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [map, key] = expect_args("contains?", values)?;
    let key = hash_key("contains?", &key)?;
    Ok(Value::Bool(hash_map_argument("contains?", &map)?.is_some_and(|entries| entries.contains_key(&key))))
}

fn builtin_keys(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [map] = expect_args("keys", values)?;
    let keys = hash_map_argument("keys", &map)?
        .map(|entries| entries.keys().sorted().map(HashKey::to_value).collect::<Vec<_>>())
        .unwrap_or_default();
    Ok(Value::list(keys))
}

fn builtin_vals(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [map] = expect_args("vals", values)?;
    let vals = hash_map_argument("vals", &map)?
        .map(|entries| entries.iter().sorted_by(|(a, _), (b, _)| a.cmp(b)).map(|(_, value)| value.clone()).collect::<Vec<_>>())
        .unwrap_or_default();
    Ok(Value::list(vals))
}

fn builtin_assoc(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    expect_at_least("assoc", &values, 1)?;
    if values.len() % 2 != 1 {
        return Err(MalletError::runtime("assoc: expected a hash-map followed by key/value pairs"));
    }

    let mut values = values.into_iter();
    let map = values.next().unwrap_or(Value::Nil);
    let mut entries = hash_map_argument("assoc", &map)?.cloned().unwrap_or_default();
    for (key, value) in values.tuples() {
        entries.insert(hash_key("assoc", &key)?, value);
    }
    Ok(Value::hash_map(entries))
}

fn builtin_keyword(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("keyword", values)?;
    match value {
        keyword @ Value::Keyword(_) => Ok(keyword),
        Value::String(name) => Ok(Value::Keyword(name)),
        other => Err(type_error("keyword", "a string", &other)),
    }
}

fn builtin_symbol(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("symbol", values)?;
    Ok(Value::symbol(text("symbol", &value)?))
}

fn builtin_pr_str(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    Ok(Value::string(&print_all(&values, true, " ")))
}

fn builtin_str(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    Ok(Value::string(&print_all(&values, false, "")))
}

fn builtin_prn(values: Vec<Value>, ctx: &RuntimeContext) -> EvaluationResult {
    ctx.write_line(&print_all(&values, true, " "))?;
    Ok(Value::Nil)
}

fn builtin_println(values: Vec<Value>, ctx: &RuntimeContext) -> EvaluationResult {
    ctx.write_line(&print_all(&values, false, " "))?;
    Ok(Value::Nil)
}

fn builtin_read_string(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("read-string", values)?;
    match parse(text("read-string", &value)?) {
        Err(MalletError::NoTokens) => Ok(Value::Nil),
        result => result,
    }
}

fn builtin_slurp(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("slurp", values)?;
    let path = text("slurp", &value)?;
    std::fs::read_to_string(path)
        .map(|contents| Value::string(&contents))
        .map_err(|err| MalletError::runtime(format!("slurp: cannot read {}: {}", path, err)))
}

fn builtin_eval(values: Vec<Value>, ctx: &RuntimeContext) -> EvaluationResult {
    // Always the global environment, whatever scope the call came from
    let [form] = expect_args("eval", values)?;
    evaluate(form, ctx.global.clone(), ctx)
}

fn builtin_atom(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("atom", values)?;
    Ok(Value::atom(value))
}

fn builtin_deref(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [value] = expect_args("deref", values)?;
    match &value {
        Value::Atom(cell) => Ok(cell.borrow().clone()),
        other => Err(type_error("deref", "an atom", other)),
    }
}

fn builtin_reset(values: Vec<Value>, _ctx: &RuntimeContext) -> EvaluationResult {
    let [atom, value] = expect_args("reset!", values)?;
    match &atom {
        Value::Atom(cell) => {
            cell.replace(value.clone());
            Ok(value)
        }
        other => Err(type_error("reset!", "an atom", other)),
    }
}

fn builtin_swap(values: Vec<Value>, ctx: &RuntimeContext) -> EvaluationResult {
    expect_at_least("swap!", &values, 2)?;

    let Value::Atom(cell) = &values[0] else {
        return Err(type_error("swap!", "an atom", &values[0]));
    };
    let function = function("swap!", &values[1])?;

    // The cell is not borrowed while the function runs, it may read the atom
    let current = cell.borrow().clone();
    let mut arguments = Vec::with_capacity(values.len() - 1);
    arguments.push(current);
    arguments.extend_from_slice(&values[2..]);

    let value = apply(function, arguments, ctx)?;
    cell.replace(value.clone());
    Ok(value)
}

fn builtin_apply(values: Vec<Value>, ctx: &RuntimeContext) -> EvaluationResult {
    expect_at_least("apply", &values, 2)?;

    let function = function("apply", &values[0])?;
    let Some((last, middle)) = values[1..].split_last() else {
        return Err(MalletError::runtime("apply: expected an argument sequence"));
    };
    let mut arguments = middle.to_vec();
    arguments.extend_from_slice(sequence("apply", last)?);

    apply(function, arguments, ctx)
}

fn builtin_map(values: Vec<Value>, ctx: &RuntimeContext) -> EvaluationResult {
    let [function_value, list] = expect_args("map", values)?;
    let function = function("map", &function_value)?;

    sequence("map", &list)?.iter()
        .map(|value| apply(function, vec![value.clone()], ctx))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::list)
}

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("+", builtin_add),
    ("-", builtin_sub),
    ("*", builtin_mul),
    ("/", builtin_div),

    ("<", builtin_less),
    ("<=", builtin_less_eq),
    (">", builtin_greater),
    (">=", builtin_greater_eq),
    ("=", builtin_equal),
    ("eq?", builtin_identical),

    ("list", builtin_list),
    ("list?", builtin_is_list),
    ("vector", builtin_vector),
    ("vector?", builtin_is_vector),
    ("sequential?", builtin_is_sequential),
    ("empty?", builtin_is_empty),
    ("count", builtin_count),
    ("cons", builtin_cons),
    ("concat", builtin_concat),
    ("vec", builtin_vec),
    ("first", builtin_first),
    ("rest", builtin_rest),
    ("nth", builtin_nth),

    ("hash-map", builtin_hash_map),
    ("map?", builtin_is_map),
    ("get", builtin_get),
    ("contains?", builtin_contains),
    ("keys", builtin_keys),
    ("vals", builtin_vals),
    ("assoc", builtin_assoc),

    ("nil?", builtin_is_nil),
    ("true?", builtin_is_true),
    ("false?", builtin_is_false),
    ("symbol", builtin_symbol),
    ("symbol?", builtin_is_symbol),
    ("keyword", builtin_keyword),
    ("keyword?", builtin_is_keyword),
    ("string?", builtin_is_string),
    ("fn?", builtin_is_function),

    ("pr-str", builtin_pr_str),
    ("str", builtin_str),
    ("prn", builtin_prn),
    ("println", builtin_println),
    ("read-string", builtin_read_string),
    ("slurp", builtin_slurp),
    ("eval", builtin_eval),

    ("atom", builtin_atom),
    ("atom?", builtin_is_atom),
    ("deref", builtin_deref),
    ("reset!", builtin_reset),
    ("swap!", builtin_swap),

    ("apply", builtin_apply),
    ("map", builtin_map),
];

/// The root of every environment chain: all primitives plus `DEBUG-EVAL`.
pub(crate) fn builtin_frame() -> Env {
    let mut bindings: HashMap<Rc<str>, Value> = BUILTINS.iter()
        .map(|&(name, func)| (Rc::from(name), Value::builtin(name, func)))
        .collect();
    bindings.insert(Rc::from(DEBUG_EVAL), Value::Bool(false));

    Env::root(bindings)
}
