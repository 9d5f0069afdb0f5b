use crate::bytecode::{Op, ProgramBc, op::Constant};
use crate::lang::value::format_number;
use std::collections::{BTreeSet, HashMap};

/// Print disassembly of a bytecode program
pub fn print_bc(bc: &ProgramBc) {
    println!("════════════════════════════════════════");
    println!(" main");
    println!(" {} instructions", bc.ops.len());
    println!("════════════════════════════════════════");
    print!("{}", disassemble_to_string(&bc.ops));
    println!();
}

/// Return disassembly as a String
pub fn disassemble_to_string(ops: &[Op]) -> String {
    let mut output = String::new();
    let jump_targets = collect_jump_targets(ops);
    let entries = collect_entries(ops);

    for (ip, op) in ops.iter().enumerate() {
        if entries.contains(&ip) {
            output.push_str("      ╞══ function entry ════════════════\n");
        } else if jump_targets.contains(&ip) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", ip));

        if jump_targets.contains(&ip) || entries.contains(&ip) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        output.push_str(&format_op_string(op, ip));
        output.push('\n');
    }

    output
}

fn collect_jump_targets(ops: &[Op]) -> BTreeSet<usize> {
    ops.iter()
        .enumerate()
        .filter_map(|(ip, op)| op.jump_target(ip))
        .filter(|target| *target >= 0)
        .map(|target| target as usize)
        .collect()
}

fn collect_entries(ops: &[Op]) -> BTreeSet<usize> {
    ops.iter()
        .filter_map(|op| match op {
            Op::Push(Constant::Address(entry)) => Some(*entry),
            _ => None,
        })
        .collect()
}

fn format_op_string(op: &Op, ip: usize) -> String {
    let name = op.name();
    match op {
        Op::Push(c) => format!("{:<12}{}", name, format_constant(c)),
        Op::Store(n) | Op::Load(n) => format!("{:<12}{}", name, n),
        Op::Jump(offset) | Op::JumpIfFalse(offset) | Op::JumpIfTrue(offset) => {
            let target = ip as i64 + *offset as i64;
            let arrow = if *offset < 0 { "↑" } else { "↓" };
            format!("{:<12}{:+} ({} {:04})", name, offset, arrow, target)
        }
        Op::CallBuiltin(n) | Op::CallUser(n) => format!("{:<12}argc={}", name, n),
        Op::DeclareFunction(n) => format!("{:<12}params={}", name, n),
        Op::Binary(bin) => format!("{:<12}; {}", name, bin),
        Op::Return | Op::PopTop => name.to_string(),
    }
}

fn format_constant(constant: &Constant) -> String {
    match constant {
        Constant::Number(n) => format_number(*n),
        Constant::Name(s) => format!("\"{}\"", s),
        Constant::Address(a) => format!("@{:04}", a),
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Print bytecode statistics
pub fn print_bc_stats(bc: &ProgramBc) {
    println!("=== BYTECODE STATISTICS ===\n");

    let total_ops = bc.ops.len();
    let functions = collect_entries(&bc.ops).len();

    println!("Instructions:     {}", total_ops);
    println!("Functions:        {}", functions);
    println!();

    let op_counts = count_ops(&bc.ops);

    println!("Op frequency:");
    let mut counts: Vec<_> = op_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    for (op, count) in counts.iter().take(10) {
        let pct = (**count as f64 / total_ops.max(1) as f64) * 100.0;
        println!("  {:<14} {:>4} ({:>5.1}%)", op, count, pct);
    }
}

pub fn count_ops(ops: &[Op]) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for op in ops {
        *counts.entry(op.name()).or_insert(0) += 1;
    }
    counts
}
