//! Execution of compiled bytecode.

pub mod builtins;
pub mod runtime_error;
pub mod scope;
pub mod vm_bc;

pub use vm_bc::{Vm, VmConfig};
