//! Errors the lowering pipeline can report.
//!
//! Every lowering failure is fatal: the core abandons emission rather than
//! handing a downstream consumer a partially constructed [`crate::middle::ir::Program`].

use crate::common::Id;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown name: {0}")]
    UnknownName(Id),

    #[error("unknown function: {0}")]
    UnknownFunction(Id),

    #[error("function '{0}' redefined at a different line")]
    DuplicateFunction(Id),

    #[error("no free register available")]
    NoFreeRegister,

    #[error("unsupported operator in codegen position: {0}")]
    UnsupportedOperator(String),

    #[error("for-loop range bounds must be integer literals")]
    UnsupportedForRange,

    #[error("malformed AST reached a lowering rule: {0}")]
    InvalidAst(String),
}

pub type Result<T> = std::result::Result<T, Error>;
