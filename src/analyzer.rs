//! Static program analysis for tooling.
//!
//! Builds the control-flow graph, runs a breadth-first reachability pass from
//! instruction 0, and reports unreachable instructions, jump targets and
//! trivially redundant jumps. Diagnostic only: nothing here runs during
//! execution.

use crate::isa::BpfOpcode;
use crate::program::Program;
use crate::verifier::successors;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Analysis results for one program.
#[derive(Debug)]
pub struct AnalysisReport {
    /// Program length in instructions.
    pub program_len: usize,
    /// Every instruction index some jump can land on.
    pub jump_targets: BTreeSet<usize>,
    /// Instructions unreachable from instruction 0.
    pub unreachable: BTreeSet<usize>,
    /// Human-readable optimization findings.
    pub findings: Vec<String>,
}

/// Analyzes a program's control flow.
pub fn analyze(program: &Program) -> AnalysisReport {
    let len = program.len();

    let jump_targets = find_jump_targets(program);
    let unreachable = find_unreachable(program);
    let mut findings = Vec::new();

    // `ja +0` falls through to the next instruction anyway.
    for (index, insn) in program.instructions().iter().enumerate() {
        if insn.decode() == Ok(BpfOpcode::Ja) && insn.signed_immediate() == 0 {
            findings.push(format!("redundant jump at instruction {index}"));
        }
        if let Ok(op) = insn.decode()
            && op.is_jump()
            && op != BpfOpcode::Ja
            && insn.dst() == insn.src()
        {
            findings.push(format!(
                "conditional jump at instruction {index} branches to the same target either way"
            ));
        }
    }

    if !unreachable.is_empty() {
        findings.push(format!("{} unreachable instructions", unreachable.len()));
    }

    AnalysisReport {
        program_len: len,
        jump_targets,
        unreachable,
        findings,
    }
}

fn find_jump_targets(program: &Program) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();
    for (index, insn) in program.instructions().iter().enumerate() {
        if let Ok(op) = insn.decode()
            && op.is_jump()
        {
            targets.extend(successors(program, index));
        }
    }
    targets
}

fn find_unreachable(program: &Program) -> BTreeSet<usize> {
    let len = program.len();
    let mut reachable = vec![false; len];
    let mut queue = VecDeque::new();

    if len > 0 {
        reachable[0] = true;
        queue.push_back(0_usize);
    }

    while let Some(index) = queue.pop_front() {
        for target in successors(program, index) {
            if target < len && !reachable[target] {
                reachable[target] = true;
                queue.push_back(target);
            }
        }
    }

    (0..len).filter(|&i| !reachable[i]).collect()
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "program analysis")?;
        writeln!(f, "----------------")?;
        writeln!(f, "length: {} instructions", self.program_len)?;
        writeln!(f, "jump targets: {:?}", self.jump_targets)?;
        writeln!(f, "unreachable: {:?}", self.unreachable)?;
        if self.findings.is_empty() {
            writeln!(f, "no findings")?;
        } else {
            writeln!(f, "findings:")?;
            for finding in &self.findings {
                writeln!(f, "- {finding}")?;
            }
        }
        Ok(())
    }
}
