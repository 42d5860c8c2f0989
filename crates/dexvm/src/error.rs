use thiserror::Error;

use crate::method::Addr;

/// Errors raised for structurally invalid input methods.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("malformed type descriptor `{0}`")]
    InvalidDescriptor(String),

    #[error("malformed method reference `{0}`")]
    InvalidMethodRef(String),

    #[error("malformed field reference `{0}`")]
    InvalidFieldRef(String),

    #[error("register v{reg} is out of range for a method with {count} registers")]
    InvalidRegister { reg: u16, count: u16 },

    #[error("no instruction at address {0}")]
    InvalidAddress(Addr),

    #[error("{method}: {message} (line {line})")]
    Asm {
        method: String,
        line: usize,
        message: String,
    },

    #[error("unknown method {0}")]
    UnknownMethod(String),
}
