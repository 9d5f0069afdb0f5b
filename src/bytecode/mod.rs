pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod optimize;
pub mod stack_check;

pub use ir::ProgramBc;
pub use op::Op;
