//! Graph-driven optimization of Dalvik-style methods.
//!
//! An [`Optimizer`] holds a method's execution graph and runs the strategies in
//! [`strategy`] over it. Strategies edit the method only through a [`Manipulator`],
//! which keeps the graph in step with the instruction stream.

pub mod manipulator;
pub mod optimizer;
pub mod strategy;

pub use self::manipulator::{Manipulator, ManipulatorError};
pub use self::optimizer::{Optimizer, OptimizerOptions};
pub use self::strategy::{Category, Counts, Outcome, Strategy};
