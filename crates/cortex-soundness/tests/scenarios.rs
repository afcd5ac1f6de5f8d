//! Whole-program scenarios over the demo programs.

use cortex_soundness::{check_program, counter_threads, explorer, roundtrip_pretty, test_config};
use cortex_vm::{CheckOutcome, ClassId, InstructionEvent, Instruction, PathEnd, VmListener};
use std::fs;
use std::path::PathBuf;

fn demos_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("demos")
}

fn demo(name: &str) -> String {
    fs::read_to_string(demos_dir().join(name)).unwrap()
}

/// Counter values seen when the last thread returns.
struct FinalCounter {
    class: ClassId,
    values: Vec<i64>,
}

impl VmListener for FinalCounter {
    fn instruction_executed(&mut self, event: &InstructionEvent<'_>) {
        if *event.insn != Instruction::Return || event.kernel.has_live_threads() {
            return;
        }
        for (_, ei) in event.kernel.heap.iter() {
            if ei.class() == Some(self.class) {
                self.values.push(ei.slot(0).unwrap().value.as_int().unwrap());
            }
        }
    }
}

fn final_counters(src: &str) -> Vec<i64> {
    let mut explorer = explorer(src, test_config()).unwrap();
    let class = explorer.program().class_by_name("Counter").unwrap().id;
    let mut listener = FinalCounter {
        class,
        values: Vec::new(),
    };
    let report = explorer.check_with(&mut [&mut listener]).unwrap();
    assert_eq!(report.outcome, CheckOutcome::Exhausted);
    listener.values.sort();
    listener.values.dedup();
    listener.values
}

#[test]
fn unsynchronized_counter_loses_updates() {
    assert_eq!(final_counters(&counter_threads(2, false)), vec![1, 2]);
}

#[test]
fn synchronized_counter_never_loses_updates() {
    assert_eq!(final_counters(&counter_threads(2, true)), vec![2]);
    assert_eq!(final_counters(&counter_threads(3, true)), vec![3]);
}

#[test]
fn demo_deadlock_is_found() {
    let report = check_program(&demo("deadlock.cas"), test_config()).unwrap();
    assert!(report.paths.iter().any(|p| matches!(p.end, PathEnd::Deadlock { .. })));
}

#[test]
fn demo_divide_throws_only_for_zero_divisor() {
    let report = check_program(&demo("divide.cas"), test_config()).unwrap();
    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0].end, PathEnd::UncaughtException(e) if &*e.class == "ArithmeticException"));
    assert_eq!(errors[0].path_condition.len(), 2);
}

#[test]
fn demo_list_sum_is_bounded() {
    let report = check_program(&demo("list_sum.cas"), test_config()).unwrap();
    assert_eq!(report.outcome, CheckOutcome::Exhausted);
    assert!(report.paths.iter().all(|p| p.end == PathEnd::Completed));
    assert!(report.stats.paths > 4);
}

#[test]
fn demos_pretty_print_stably() {
    for entry in fs::read_dir(demos_dir()).unwrap() {
        let path = entry.unwrap().path();
        let source = fs::read_to_string(&path).unwrap();
        let (first, second) = roundtrip_pretty(&source).unwrap();
        assert_eq!(first, second, "{}", path.display());
    }
}

#[test]
fn state_matching_preserves_errors() {
    let plain = check_program(&demo("deadlock.cas"), test_config()).unwrap();
    let config = cortex_vm::Config {
        state_matching: true,
        ..test_config()
    };
    let matched = check_program(&demo("deadlock.cas"), config).unwrap();
    assert!(matched.stats.states <= plain.stats.states);
    assert!(matched.paths.iter().any(|p| matches!(p.end, PathEnd::Deadlock { .. })));
}
