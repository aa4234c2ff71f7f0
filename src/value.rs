use core::fmt;
use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{context::RuntimeContext, env::Env, error::MalletError, printer::print};

pub(crate) type EvaluationResult = Result<Value, MalletError>;

pub(crate) type BuiltinFn = fn(Vec<Value>, &RuntimeContext) -> EvaluationResult;


/// Every value a program can read, build or return.
///
/// Scalars are copied (or share an immutable `Rc<str>`), while lists,
/// vectors, hashmaps, functions and atoms are shared by reference. The
/// only mutable cell is the one inside an [`Value::Atom`].
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(i64),
    Symbol(Rc<str>),
    String(Rc<str>),
    Keyword(Rc<str>),
    List(Rc<Vec<Value>>),
    Vector(Rc<Vec<Value>>),
    HashMap(Rc<HashMap<HashKey, Value>>),
    Function(Rc<Function>),
    Atom(Rc<RefCell<Value>>),
}

// Hashmap keys keep the namespace next to the text, so "a" and :a
// hash and compare differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKey {
    String(Rc<str>),
    Keyword(Rc<str>),
}

impl HashKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::String(text.clone())),
            Value::Keyword(text) => Some(Self::Keyword(text.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::String(text) => Value::String(text.clone()),
            Self::Keyword(text) => Value::Keyword(text.clone()),
        }
    }
}

pub enum Function {
    Builtin(Builtin),
    Closure(Closure),
}

pub struct Builtin {
    pub(crate) name: &'static str,
    pub(crate) func: BuiltinFn,
}

/// A user function: the parameter names, the body forms (run like `do`)
/// and the environment the `fn*` form was evaluated in.
pub struct Closure {
    pub(crate) parameters: Parameters,
    pub(crate) body: Rc<[Value]>,
    pub(crate) environment: Env,
}

#[derive(Debug, Clone)]
pub(crate) struct Parameters {
    pub(crate) positional: Vec<Rc<str>>,
    pub(crate) rest: Option<Rc<str>>,
}

impl Parameters {
    pub(crate) const VARIADIC_MARKER: &'static str = "&";

    /// Builds the parameter list of a `fn*` form. The `&` marker may only
    /// appear as the second-to-last name.
    pub(crate) fn from_forms(forms: &[Value]) -> Result<Self, MalletError> {
        let mut positional = Vec::with_capacity(forms.len());
        let mut rest = None;

        let mut names = forms.iter();
        while let Some(form) = names.next() {
            let name = match form {
                Value::Symbol(name) => name,
                other => return Err(MalletError::eval(format!("{}: parameter name must be a symbol", print(other, true)))),
            };

            if &**name != Self::VARIADIC_MARKER {
                positional.push(name.clone());
                continue;
            }

            rest = match (names.next(), names.next()) {
                (Some(Value::Symbol(name)), None) if &**name != Self::VARIADIC_MARKER => Some(name.clone()),
                _ => return Err(MalletError::eval("'&' must be followed by exactly one parameter name")),
            };
        }

        Ok(Self { positional, rest })
    }

    pub(crate) fn arity_matches(&self, count: usize) -> bool {
        match self.rest {
            Some(_) => count >= self.positional.len(),
            None => count == self.positional.len(),
        }
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rest {
            Some(_) => write!(f, "at least {}", self.positional.len()),
            None => write!(f, "{}", self.positional.len()),
        }
    }
}

impl Value {
    pub fn list(values: Vec<Value>) -> Self {
        Self::List(Rc::new(values))
    }

    pub fn vector(values: Vec<Value>) -> Self {
        Self::Vector(Rc::new(values))
    }

    pub fn hash_map(entries: HashMap<HashKey, Value>) -> Self {
        Self::HashMap(Rc::new(entries))
    }

    pub fn symbol(name: &str) -> Self {
        Self::Symbol(Rc::from(name))
    }

    pub fn string(text: &str) -> Self {
        Self::String(Rc::from(text))
    }

    pub fn keyword(name: &str) -> Self {
        Self::Keyword(Rc::from(name))
    }

    pub fn atom(value: Value) -> Self {
        Self::Atom(Rc::new(RefCell::new(value)))
    }

    pub(crate) fn builtin(name: &'static str, func: BuiltinFn) -> Self {
        Self::Function(Rc::new(Function::Builtin(Builtin { name, func })))
    }

    pub(crate) fn closure(parameters: Parameters, body: Rc<[Value]>, environment: Env) -> Self {
        Self::Function(Rc::new(Function::Closure(Closure { parameters, body, environment })))
    }

    /// Everything except `nil` and `false` counts as true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Lists and vectors are both sequences.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::List(values) | Self::Vector(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Self::Symbol(symbol) if &**symbol == name)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Symbol(_) => "symbol",
            Self::String(_) => "string",
            Self::Keyword(_) => "keyword",
            Self::List(_) => "list",
            Self::Vector(_) => "vector",
            Self::HashMap(_) => "hash-map",
            Self::Function(_) => "function",
            Self::Atom(_) => "atom",
        }
    }

    /// Structural equality as seen by `=`. Lists and vectors with equal
    /// elements compare equal; functions and atoms only equal themselves.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b))
            | (Self::String(a), Self::String(b))
            | (Self::Keyword(a), Self::Keyword(b)) => a == b,
            (Self::List(a) | Self::Vector(a), Self::List(b) | Self::Vector(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.equals(b))
            }
            (Self::HashMap(a), Self::HashMap(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, value)| b.get(key).is_some_and(|other| value.equals(other)))
            }
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Atom(a), Self::Atom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Identity as seen by `eq?`: reference types compare by storage,
    /// scalars by value.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) | (Self::Vector(a), Self::Vector(b)) => Rc::ptr_eq(a, b),
            (Self::HashMap(a), Self::HashMap(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Atom(a), Self::Atom(b)) => Rc::ptr_eq(a, b),
            (Self::List(_) | Self::Vector(_) | Self::HashMap(_) | Self::Function(_) | Self::Atom(_), _) => false,
            _ => self.equals(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print(self, true))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(builtin) => write!(f, "Builtin({})", builtin.name),
            Self::Closure(closure) => write!(f, "Closure({:?})", closure.parameters),
        }
    }
}
