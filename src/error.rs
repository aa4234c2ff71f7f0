use thiserror::Error;


/// Everything that can go wrong while reading or evaluating a line.
///
/// None of these are fatal: a REPL reports them and carries on with the
/// same global environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalletError {
    #[error("syntax error: {0}")]
    SyntaxError(String),

    /// Blank or comment-only input. Callers treat this as "nothing to do".
    #[error("no tokens")]
    NoTokens,

    #[error("{0}")]
    EvalError(String),

    #[error("{0}")]
    RuntimeError(String),
}

impl MalletError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::SyntaxError(message.into())
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::EvalError(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::RuntimeError(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyntaxError(_) => "SyntaxError",
            Self::NoTokens => "NoTokens",
            Self::EvalError(_) => "EvalError",
            Self::RuntimeError(_) => "RuntimeError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(MalletError::syntax("unbalanced").kind(), "SyntaxError");
        assert_eq!(MalletError::NoTokens.kind(), "NoTokens");
        assert_eq!(MalletError::eval("x").kind(), "EvalError");
        assert_eq!(MalletError::runtime("x").kind(), "RuntimeError");
    }

    #[test]
    fn messages_render() {
        assert_eq!(MalletError::syntax("expected ')'").to_string(), "syntax error: expected ')'");
        assert_eq!(MalletError::eval("symbol 'x' not found").to_string(), "symbol 'x' not found");
    }
}
