//! An abstract interpreter for register-based Dalvik-style bytecode.
//!
//! A [`Method`] is executed by the [`Vm`] into an [`ExecutionGraph`]: one node per
//! (address, incoming state), forking whenever a branch condition is not statically
//! known. The graph is what optimization passes consult and rewrite.

pub mod asm;
pub mod class;
pub mod emulate;
pub mod error;
pub mod exec;
pub mod graph;
pub mod insn;
pub mod method;
pub mod state;
pub mod ty;
pub mod util;
pub mod value;
pub mod vm;

pub use self::class::{ClassDef, ClassManager};
pub use self::error::VmError;
pub use self::graph::{Ceiling, ExecutionGraph, ExecutionNode, GraphStatus, NodeId};
pub use self::insn::Insn;
pub use self::method::{Addr, Method};
pub use self::state::MethodState;
pub use self::ty::{AccessFlags, MethodRef, Ty};
pub use self::value::{Literal, Value};
pub use self::vm::{Budget, Vm, VmOptions};
