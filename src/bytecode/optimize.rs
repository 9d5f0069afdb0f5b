//! Constant-folding peephole pass.
//!
//! `Push a, Push b, Binary(op)` with two numeric constants collapses into a
//! single `Push`. Folding shrinks the instruction stream, so every relative
//! jump and every absolute function entry address is relocated afterwards
//! through an old-index → new-index map. A fold is refused if any jump or
//! entry address points at the second push or at the operator, since that
//! instruction would no longer exist.

use std::collections::HashSet;

use tracing::debug;

use crate::bytecode::{Op, ProgramBc, op::Constant};

/// Outcome of one optimization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldStats {
    pub folded: usize,
    /// Folds refused because a branch target fell inside the triple.
    pub blocked: usize,
}

pub fn optimize(program: &ProgramBc) -> ProgramBc {
    optimize_with_stats(program).0
}

pub fn optimize_with_stats(program: &ProgramBc) -> (ProgramBc, FoldStats) {
    let ops = &program.ops;
    let targets = branch_targets(ops);

    let mut stats = FoldStats::default();
    let mut out: Vec<Op> = Vec::with_capacity(ops.len());
    // origin[j] = first old index covered by out[j]
    let mut origin: Vec<usize> = Vec::with_capacity(ops.len());

    for (ip, op) in ops.iter().enumerate() {
        if let Op::Binary(bin) = op {
            let n = out.len();
            if n >= 2 {
                let left = match &out[n - 1] {
                    Op::Push(c) => c.as_number(),
                    _ => None,
                };
                let right = match &out[n - 2] {
                    Op::Push(c) => c.as_number(),
                    _ => None,
                };

                if let (Some(left), Some(right)) = (left, right) {
                    let start = origin[n - 2];
                    if targets.iter().any(|&t| t > start && t <= ip) {
                        stats.blocked += 1;
                    } else {
                        out.truncate(n - 2);
                        origin.truncate(n - 2);
                        out.push(Op::Push(Constant::Number(bin.apply(left, right))));
                        origin.push(start);
                        stats.folded += 1;
                        continue;
                    }
                }
            }
        }

        out.push(op.clone());
        origin.push(ip);
    }

    if stats.folded > 0 {
        relocate(&mut out, &origin, ops.len());
    }

    debug!(
        before = ops.len(),
        after = out.len(),
        folded = stats.folded,
        blocked = stats.blocked,
        "constant folding"
    );

    (ProgramBc::new(out), stats)
}

/// Old indices control can arrive at other than by fall-through.
fn branch_targets(ops: &[Op]) -> HashSet<usize> {
    let mut targets = HashSet::new();
    for (ip, op) in ops.iter().enumerate() {
        if let Some(target) = op.jump_target(ip) {
            if target >= 0 {
                targets.insert(target as usize);
            }
        }
        if let Op::Push(Constant::Address(entry)) = op {
            targets.insert(*entry);
        }
    }
    targets
}

/// Rewrites jump offsets and entry addresses of the folded stream.
///
/// Jumps are never folded, so `origin[j]` is a jump's old index. Targets
/// outside the old program are left untouched for the verifier to report.
fn relocate(out: &mut [Op], origin: &[usize], old_len: usize) {
    let mut new_index = vec![0usize; old_len + 1];
    for j in 0..origin.len() {
        let end = origin.get(j + 1).copied().unwrap_or(old_len);
        for slot in &mut new_index[origin[j]..end] {
            *slot = j;
        }
    }
    new_index[old_len] = origin.len();

    for (j, op) in out.iter_mut().enumerate() {
        if let Some(old_target) = op.jump_target(origin[j]) {
            if old_target >= 0 && old_target as usize <= old_len {
                let offset = new_index[old_target as usize] as i64 - j as i64;
                op.set_jump_offset(offset as i32);
            }
        } else if let Op::Push(Constant::Address(entry)) = op {
            if *entry <= old_len {
                *entry = new_index[*entry];
            }
        }
    }
}
