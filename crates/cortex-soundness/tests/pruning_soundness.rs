//! Properties of the two-phase protocol on generated programs.
//!
//! - Pruning soundness: a path marked infeasible ends right after the
//!   instruction that discovered it.
//! - No mutation before commit: with top-half purity checking enabled no
//!   suspending instruction changes state before its choice is made.

use cortex_soundness::{check_program, comparison_chain, counter_threads, explorer, node_inputs, test_config};
use cortex_vm::{InstructionEvent, Instruction, PathEnd, PathRecord, VmListener};
use cortex_symbolic::IntOp;
use proptest::prelude::*;

/// The last instruction executed on each ended path.
#[derive(Default)]
struct LastInstruction {
    last: Option<Instruction>,
    ends: Vec<(PathEnd, Option<Instruction>)>,
}

impl VmListener for LastInstruction {
    fn instruction_executed(&mut self, event: &InstructionEvent<'_>) {
        self.last = Some(event.insn.clone());
    }

    fn path_ended(&mut self, path: &PathRecord) {
        self.ends.push((path.end.clone(), self.last.take()));
    }
}

fn is_decision(insn: &Instruction) -> bool {
    matches!(
        insn,
        Instruction::If { .. }
            | Instruction::IfCmp { .. }
            | Instruction::Switch { .. }
            | Instruction::IntArith(IntOp::Div | IntOp::Rem)
            | Instruction::IntCmp
            | Instruction::RealCmp { .. }
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn pruned_paths_stop_at_the_deciding_instruction(
        params in 1usize..=2,
        tests in prop::collection::vec((0usize..2, 0usize..2, -2i64..=2), 2..=5),
    ) {
        let src = comparison_chain(params, &tests);
        let mut explorer = explorer(&src, test_config()).unwrap();
        let mut listener = LastInstruction::default();
        let report = explorer.check_with(&mut [&mut listener]).unwrap();
        prop_assert_eq!(listener.ends.len(), report.paths.len());
        for (end, last) in &listener.ends {
            if *end == PathEnd::Pruned {
                let last = last.as_ref().expect("a pruned path executed something");
                prop_assert!(is_decision(last), "pruned after {}", last);
            }
        }
    }

    #[test]
    fn top_halves_never_mutate_state(
        params in 1usize..=3,
        tests in prop::collection::vec((0usize..3, 0usize..3, -4i64..=4), 1..=4),
    ) {
        let report = check_program(&comparison_chain(params, &tests), test_config());
        prop_assert!(report.is_ok(), "{:?}", report.err());
    }
}

#[test]
fn top_halves_never_mutate_state_with_threads_and_heap() {
    for src in [counter_threads(2, false), counter_threads(3, true), node_inputs(3)] {
        let report = check_program(&src, test_config());
        assert!(report.is_ok(), "{:?}", report.err());
    }
}
