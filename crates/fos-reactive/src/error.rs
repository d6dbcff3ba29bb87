//! Reactive errors

use crate::Path;

/// Expression parse / evaluation failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error at {offset}: {message}")]
    Syntax { message: String, offset: u32 },

    #[error("{0} is not defined")]
    NotDefined(String),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("invalid assignment target")]
    InvalidTarget,

    #[error("maximum call depth exceeded")]
    StackOverflow,
}

/// Store and scheduler failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReactiveError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("'{0}' is a reserved name and cannot be used as a state key")]
    ReservedKey(String),

    #[error("effect {id} re-ran {runs} times inside one guard window; reactive cycle?")]
    RunawayEffect { id: u32, runs: u32 },

    #[error("writes still pending after {passes} flush passes; reactive cycle?")]
    Unsettled { passes: u32 },

    #[error("cannot write below non-container value at {0}")]
    NotAContainer(Path),
}

pub type ReactiveResult<T> = Result<T, ReactiveError>;
