use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{error::MalletError, value::{Parameters, Value}};


/// A handle to one frame of the environment chain.
///
/// Cloning the handle shares the frame. Frames live as long as some
/// closure or in-flight evaluation still holds them.
#[derive(Clone)]
pub struct Env(Rc<Frame>);

struct Frame {
    bindings: RefCell<HashMap<Rc<str>, Value>>,
    parent: Option<Env>,
}

impl Env {
    pub fn root(bindings: HashMap<Rc<str>, Value>) -> Self {
        Self(Rc::new(Frame {
            bindings: RefCell::new(bindings),
            parent: None,
        }))
    }

    pub fn new(parent: &Env) -> Self {
        Self(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        }))
    }

    /// Binds `key` in this frame only; parents are never written.
    pub fn insert(&self, key: Rc<str>, value: Value) {
        self.0.bindings.borrow_mut().insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.0.bindings.borrow().get(key) {
                return Some(value.clone());
            }
            frame = frame.0.parent.as_ref()?;
        }
    }

    /// Creates the frame for one call: positional names bind in order and
    /// the rest name, if any, receives a list of whatever is left.
    pub(crate) fn bind(parent: &Env, parameters: &Parameters, mut arguments: Vec<Value>) -> Result<Self, MalletError> {
        if !parameters.arity_matches(arguments.len()) {
            return Err(MalletError::eval(format!(
                "wrong number of arguments: expected {}, got {}",
                parameters,
                arguments.len()
            )));
        }

        let environment = Self::new(parent);
        let rest = arguments.split_off(parameters.positional.len());
        for (name, value) in parameters.positional.iter().zip(arguments) {
            environment.insert(name.clone(), value);
        }
        if let Some(name) = &parameters.rest {
            environment.insert(name.clone(), Value::list(rest));
        }

        Ok(environment)
    }
}
