use thiserror::Error;
use tracing::trace;

use crate::bytecode::{Op, ProgramBc, op::Constant};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackCheckError {
    #[error("stack-check error: stack underflow at ip={ip}, op={op}, needed {needed} items, had {height}")]
    Underflow {
        ip: usize,
        op: &'static str,
        needed: usize,
        height: usize,
    },

    #[error("stack-check error: ip={ip} reached with heights {first} and {second}")]
    HeightMismatch {
        ip: usize,
        first: usize,
        second: usize,
    },

    #[error("stack-check error: jump at ip={ip} targets {target}, outside 0..={len}")]
    JumpOutOfBounds { ip: usize, target: i64, len: usize },

    #[error("stack-check error: function entry {entry} outside 0..{len}")]
    EntryOutOfBounds { entry: usize, len: usize },

    #[error("stack-check error: return at ip={ip} with {height} values on the frame's stack")]
    UnbalancedReturn { ip: usize, height: usize },
}

/// Check stack effects along every control-flow path.
///
/// Heights are tracked per frame: the top-level code and every function
/// body (entry addresses are found in `Push(Address)` constants) start at
/// height 0. Each reachable instruction must be reached with a single
/// height, no instruction may underflow, and `Return` must see exactly the
/// value it returns.
pub fn check_program(program: &ProgramBc) -> Result<(), StackCheckError> {
    let ops = &program.ops;
    let len = ops.len();
    let mut heights: Vec<Option<usize>> = vec![None; len + 1];
    let mut worklist: Vec<(usize, usize)> = vec![(0, 0)];

    for op in ops {
        if let Op::Push(Constant::Address(entry)) = op {
            if *entry >= len {
                return Err(StackCheckError::EntryOutOfBounds { entry: *entry, len });
            }
            worklist.push((*entry, 0));
        }
    }

    while let Some((ip, height)) = worklist.pop() {
        match heights[ip] {
            Some(seen) if seen == height => continue,
            Some(seen) => {
                return Err(StackCheckError::HeightMismatch {
                    ip,
                    first: seen,
                    second: height,
                });
            }
            None => heights[ip] = Some(height),
        }

        // Falling off the end halts the frame.
        let Some(op) = ops.get(ip) else { continue };

        let (pops, pushes) = op.stack_effect();
        if height < pops {
            return Err(StackCheckError::Underflow {
                ip,
                op: op.name(),
                needed: pops,
                height,
            });
        }
        let after = height - pops + pushes;

        match op {
            Op::Return => {
                if height != 1 {
                    return Err(StackCheckError::UnbalancedReturn { ip, height });
                }
            }
            Op::Jump(_) => worklist.push((jump_target(op, ip, len)?, after)),
            Op::JumpIfFalse(_) | Op::JumpIfTrue(_) => {
                worklist.push((jump_target(op, ip, len)?, after));
                worklist.push((ip + 1, after));
            }
            _ => worklist.push((ip + 1, after)),
        }
    }

    trace!(
        reachable = heights.iter().filter(|h| h.is_some()).count(),
        len,
        "stack check passed"
    );
    Ok(())
}

fn jump_target(op: &Op, ip: usize, len: usize) -> Result<usize, StackCheckError> {
    let target = op.jump_target(ip).unwrap_or(ip as i64);
    if target < 0 || target as usize > len {
        return Err(StackCheckError::JumpOutOfBounds { ip, target, len });
    }
    Ok(target as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::node::BinaryOp;

    fn num(n: f64) -> Op {
        Op::Push(Constant::Number(n))
    }

    fn check(ops: Vec<Op>) -> Result<(), StackCheckError> {
        check_program(&ProgramBc::new(ops))
    }

    #[test]
    fn test_simple_ops() {
        assert!(check(vec![num(1.0), num(2.0), Op::Binary(BinaryOp::Add), Op::PopTop]).is_ok());
    }

    #[test]
    fn test_underflow() {
        let result = check(vec![Op::Binary(BinaryOp::Add)]);
        assert!(matches!(
            result,
            Err(StackCheckError::Underflow { ip: 0, needed: 2, height: 0, .. })
        ));
        assert!(result.unwrap_err().to_string().contains("underflow"));
    }

    #[test]
    fn test_call_pops_args_and_callee() {
        assert!(
            check(vec![
                num(1.0),
                Op::Load("print".to_string()),
                Op::CallBuiltin(1),
                Op::PopTop,
            ])
            .is_ok()
        );
        assert!(matches!(
            check(vec![Op::Load("print".to_string()), Op::CallBuiltin(1)]),
            Err(StackCheckError::Underflow { ip: 1, .. })
        ));
    }

    #[test]
    fn test_branches_must_agree() {
        // the true path leaves an extra value behind
        let result = check(vec![
            num(1.0),
            Op::JumpIfFalse(2),
            num(5.0),
            num(0.0),
            Op::PopTop,
        ]);
        assert!(matches!(result, Err(StackCheckError::HeightMismatch { .. })));
    }

    #[test]
    fn test_loop_back_edge_balanced() {
        // body leaves a value behind on every iteration
        assert!(matches!(
            check(vec![
                Op::Load("i".to_string()),
                Op::JumpIfFalse(3),
                Op::Load("i".to_string()),
                Op::Jump(-3),
            ]),
            Err(StackCheckError::HeightMismatch { ip: 0, .. })
        ));
        assert!(
            check(vec![
                Op::Load("i".to_string()),
                Op::JumpIfFalse(4),
                Op::Load("i".to_string()),
                Op::PopTop,
                Op::Jump(-4),
            ])
            .is_ok()
        );
    }

    #[test]
    fn test_function_body_checked_from_entry() {
        assert!(
            check(vec![
                Op::Jump(3),
                Op::Load("a".to_string()),
                Op::Return,
                Op::Push(Constant::Name("a".to_string())),
                Op::Push(Constant::Address(1)),
                Op::Push(Constant::Name("id".to_string())),
                Op::DeclareFunction(1),
            ])
            .is_ok()
        );

        let bad_body = check(vec![
            Op::Jump(3),
            Op::PopTop,
            Op::Return,
            Op::Push(Constant::Address(1)),
            Op::Push(Constant::Name("f".to_string())),
            Op::DeclareFunction(0),
        ]);
        assert!(matches!(bad_body, Err(StackCheckError::Underflow { ip: 1, .. })));
    }

    #[test]
    fn test_return_must_carry_exactly_one_value() {
        let result = check(vec![num(1.0), num(2.0), Op::Return]);
        assert!(matches!(
            result,
            Err(StackCheckError::UnbalancedReturn { ip: 2, height: 2 })
        ));
    }

    #[test]
    fn test_jump_out_of_bounds() {
        assert!(matches!(
            check(vec![Op::Jump(5)]),
            Err(StackCheckError::JumpOutOfBounds { target: 5, .. })
        ));
        assert!(matches!(
            check(vec![Op::Jump(-1)]),
            Err(StackCheckError::JumpOutOfBounds { target: -1, .. })
        ));
        // one past the end is the halt position
        assert!(check(vec![Op::Jump(1)]).is_ok());
    }

    #[test]
    fn test_bad_entry_address() {
        assert!(matches!(
            check(vec![Op::Push(Constant::Address(9)), Op::PopTop]),
            Err(StackCheckError::EntryOutOfBounds { entry: 9, .. })
        ));
    }
}
