mod builtin;
mod context;
mod env;
mod error;
mod interpreter;
mod parser;
mod printer;
mod value;

#[cfg(test)]
mod test_utils;

pub use error::MalletError;
pub use context::{EvaluationContext, RuntimeContext};
pub use env::Env;
pub use value::{Function, HashKey, Value};
pub use parser::parse;
pub use printer::print;
