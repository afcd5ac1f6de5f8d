//! End-to-end exploration of small programs.

use cortex_symbolic::Comparator;
use cortex_vm::{
    load, CheckOutcome, ClassId, Config, Explorer, InstructionEvent, Instruction, PathConditionReporter, PathEnd,
    PathRecord, VmListener,
};

fn explorer(src: &str, config: Config) -> Explorer {
    let parsed = cortex_syntax::parse(src).expect("parse");
    let program = load(&parsed).expect("load");
    Explorer::new(program, config).expect("entry point")
}

fn ends(explorer: &mut Explorer) -> Vec<PathEnd> {
    let report = explorer.check().expect("check");
    assert_eq!(report.outcome, CheckOutcome::Exhausted);
    report.paths.into_iter().map(|p| p.end).collect()
}

const SIGN: &str = r#"
class Main {
    static method sign(x: int @symbolic) -> int {
        load x
        iflt negative
        push 1
        return
    negative:
        push -1
        return
    }
}
entry Main.sign
"#;

#[test]
fn symbolic_branch_explores_both_outcomes() {
    let mut explorer = explorer(SIGN, Config::default());
    let mut reporter = PathConditionReporter::new();
    let report = explorer.check_with(&mut [&mut reporter]).unwrap();
    assert_eq!(report.outcome, CheckOutcome::Exhausted);
    assert_eq!(report.stats.paths, 2);
    assert_eq!(report.stats.pruned, 0);
    assert!(report.paths.iter().all(|p| p.end == PathEnd::Completed));
    assert_eq!(report.paths[0].trace, vec![0, 0]);
    assert_eq!(report.paths[1].trace, vec![0, 1]);
    assert_eq!(reporter.summaries().len(), 2);
    assert!(reporter.summaries().iter().all(|s| s.path_condition.len() == 1));
    assert_ne!(
        reporter.summaries()[0].path_condition,
        reporter.summaries()[1].path_condition
    );
}

#[test]
fn infeasible_branch_is_pruned() {
    let src = r#"
class Main {
    static method f(x: int @symbolic) -> int {
        load x
        iflt negative
        load x
        iflt never
        push 0
        return
    never:
        push 1
        return
    negative:
        push -1
        return
    }
}
entry Main.f
"#;
    let mut explorer = explorer(src, Config::default());
    let report = explorer.check().unwrap();
    assert_eq!(report.stats.paths, 3);
    assert_eq!(report.stats.pruned, 1);
    let pruned: Vec<_> = report.paths.iter().filter(|p| p.end == PathEnd::Pruned).collect();
    assert_eq!(pruned[0].trace, vec![0, 0, 1]);
}

const DIVIDE: &str = r#"
class Main {
    static method divide(x: int @symbolic) -> int {
        push 10
        load x
        div
        return
    }
}
entry Main.divide
"#;

#[test]
fn symbolic_divisor_splits_on_zero() {
    let mut explorer = explorer(DIVIDE, Config::default());
    let report = explorer.check().unwrap();
    assert_eq!(report.stats.paths, 2);
    assert_eq!(report.paths[0].end, PathEnd::Completed);
    match &report.paths[1].end {
        PathEnd::UncaughtException(e) => {
            assert_eq!(&*e.class, "ArithmeticException");
            assert_eq!(e.message.as_deref(), Some("/ by zero"));
        }
        other => panic!("expected an uncaught exception, got {}", other),
    }
    assert_eq!(report.errors().count(), 1);
}

#[test]
fn handled_division_by_zero_completes() {
    let src = r#"
class Main {
    static method divide(x: int @symbolic) -> int {
    start:
        push 10
        load x
        div
        return
    end:
    handler:
        pop
        push 0
        return
        catch ArithmeticException from start to end using handler
    }
}
entry Main.divide
"#;
    let ends = ends(&mut explorer(src, Config::default()));
    assert_eq!(ends, vec![PathEnd::Completed, PathEnd::Completed]);
}

#[test]
fn stop_on_error_ends_search_at_first_error() {
    let config = Config {
        stop_on_error: true,
        ..Config::default()
    };
    let report = explorer(DIVIDE, config).check().unwrap();
    assert_eq!(report.outcome, CheckOutcome::StoppedOnError);
    assert!(report.paths.last().unwrap().end.is_error());
}

const TWO_NODES: &str = r#"
class Node {
    field next: Node
    field value: int
}
class Main {
    static method walk(a: Node @symbolic, b: Node @symbolic) {
        load a
        pop
        load b
        pop
        load a
        pop
        return
    }
}
entry Main.walk
"#;

#[test]
fn lazy_initialization_aliases_materialized_objects() {
    let report = explorer(TWO_NODES, Config::default()).check().unwrap();
    // a: null or fresh; b additionally aliases a when a is fresh.
    assert_eq!(report.stats.paths, 5);
    assert!(report.paths.iter().all(|p| p.end == PathEnd::Completed));
    let traces: Vec<_> = report.paths.iter().map(|p| p.trace.clone()).collect();
    assert_eq!(
        traces,
        vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0], vec![0, 1, 1], vec![0, 1, 2]]
    );
    let heap_sizes: Vec<_> = report.paths.iter().map(|p| p.input_heap.len()).collect();
    assert_eq!(heap_sizes, vec![0, 1, 1, 1, 2]);
    assert!(report.paths.iter().all(|p| p.heap_condition.len() == 2));
}

#[test]
fn lazy_initialization_can_be_disabled() {
    let config = Config {
        lazy_init: false,
        ..Config::default()
    };
    let report = explorer(TWO_NODES, config).check().unwrap();
    assert_eq!(report.stats.paths, 1);
}

#[test]
fn dereferencing_null_input_throws() {
    let src = r#"
class Node {
    field value: int
}
class Main {
    static method read(n: Node @symbolic) -> int {
        load n
        getfield Node.value
        return
    }
}
entry Main.read
"#;
    let ends = ends(&mut explorer(src, Config::default()));
    assert_eq!(ends.len(), 2);
    assert!(matches!(&ends[0], PathEnd::UncaughtException(e) if &*e.class == "NullPointerException"));
    assert_eq!(ends[1], PathEnd::Completed);
}

const DEADLOCK: &str = r#"
class Lock {
}
class Main {
    static field a: Lock
    static field b: Lock
    static method main() {
        new Lock
        putstatic Main.a
        new Lock
        putstatic Main.b
        getstatic Main.a
        getstatic Main.b
        spawn Main.worker
        getstatic Main.b
        getstatic Main.a
        invokestatic Main.worker
        return
    }
    static method worker(first: Lock, second: Lock) {
        load first
        monitorenter
        load second
        monitorenter
        load second
        monitorexit
        load first
        monitorexit
        return
    }
}
entry Main.main
"#;

#[test]
fn lock_order_inversion_deadlocks() {
    let report = explorer(DEADLOCK, Config::default()).check().unwrap();
    let deadlock = report
        .paths
        .iter()
        .find(|p| matches!(p.end, PathEnd::Deadlock { .. }))
        .expect("a deadlocking interleaving");
    match &deadlock.end {
        PathEnd::Deadlock { blocked } => assert_eq!(blocked.len(), 2),
        _ => unreachable!(),
    }
    assert!(report.paths.iter().any(|p| p.end == PathEnd::Completed));
}

const RACY_COUNTER: &str = r#"
class Counter {
    field value: int
}
class Main {
    static method main() {
        new Counter
        store c
        load c
        spawn Main.increment
        load c
        invokestatic Main.increment
        return
    }
    static method increment(c: Counter) {
        load c
        getfield Counter.value
        push 1
        add
        store v
        load c
        load v
        putfield Counter.value
        return
    }
}
entry Main.main
"#;

/// Counter values seen when the last thread returns.
struct FinalValues {
    class: ClassId,
    values: Vec<i64>,
}

impl VmListener for FinalValues {
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

#[test]
fn racy_counter_loses_an_update() {
    let mut explorer = explorer(RACY_COUNTER, Config::default());
    let class = explorer.program().class_by_name("Counter").unwrap().id;
    let mut finals = FinalValues {
        class,
        values: Vec::new(),
    };
    let report = explorer.check_with(&mut [&mut finals]).unwrap();
    assert_eq!(report.outcome, CheckOutcome::Exhausted);
    assert!(finals.values.contains(&2));
    assert!(finals.values.contains(&1));
    assert!(finals.values.iter().all(|v| *v == 1 || *v == 2));
}

#[test]
fn disabling_field_boundaries_hides_the_race() {
    let config = Config {
        por_field_boundaries: false,
        ..Config::default()
    };
    let mut explorer = explorer(RACY_COUNTER, config);
    let class = explorer.program().class_by_name("Counter").unwrap().id;
    let mut finals = FinalValues {
        class,
        values: Vec::new(),
    };
    explorer.check_with(&mut [&mut finals]).unwrap();
    assert!(!finals.values.is_empty());
    assert!(finals.values.iter().all(|v| *v == 2));
}

fn final_values(src: &str, class: &str) -> Vec<i64> {
    let mut explorer = explorer(src, Config::default());
    let class = explorer.program().class_by_name(class).unwrap().id;
    let mut finals = FinalValues {
        class,
        values: Vec::new(),
    };
    let report = explorer.check_with(&mut [&mut finals]).unwrap();
    assert_eq!(report.outcome, CheckOutcome::Exhausted);
    let mut values = finals.values;
    values.sort();
    values.dedup();
    values
}

#[test]
fn racy_static_counter_loses_an_update() {
    let src = r#"
class Main {
    static field count: int
    static method main() {
        spawn Main.worker
        spawn Main.worker
        return
    }
    static method worker() {
        getstatic Main.count
        push 1
        add
        putstatic Main.count
        return
    }
}
entry Main.main
"#;
    assert_eq!(final_values(src, "Main"), vec![1, 2]);
}

#[test]
fn counter_reached_through_shared_holder_loses_an_update() {
    let src = r#"
class Counter {
    field value: int
}
class Holder {
    field counter: Counter
}
class Main {
    static method main() {
        new Holder
        store h
        load h
        new Counter
        putfield Holder.counter
        load h
        spawn Main.worker
        load h
        spawn Main.worker
        return
    }
    static method worker(h: Holder) {
        load h
        getfield Holder.counter
        store c
        load c
        getfield Counter.value
        push 1
        add
        store v
        load c
        load v
        putfield Counter.value
        return
    }
}
entry Main.main
"#;
    assert_eq!(final_values(src, "Counter"), vec![1, 2]);
}

#[test]
fn oversized_array_raises_out_of_memory() {
    let src = r#"
class Main {
    static method main() {
        push 9223372036854775807
        newarray int
        pop
        return
    }
}
entry Main.main
"#;
    let unbounded = Config {
        max_array_length: 0,
        ..Config::default()
    };
    for config in [Config::default(), unbounded] {
        let ends = ends(&mut explorer(src, config));
        assert_eq!(ends.len(), 1);
        assert!(
            matches!(&ends[0], PathEnd::UncaughtException(e) if &*e.class == "OutOfMemoryError"),
            "{}",
            ends[0]
        );
    }
}

fn comparators(path: &PathRecord) -> Vec<Comparator> {
    path.path_condition.iter().map(|c| c.comparator).collect()
}

#[test]
fn symbolic_switch_branches_per_case_and_default() {
    let src = r#"
class Main {
    static method pick(x: int @symbolic) -> int {
        load x
        switch 1 -> one, 2 -> two, default -> other
    one:
        push 10
        return
    two:
        push 20
        return
    other:
        push 0
        return
    }
}
entry Main.pick
"#;
    let report = explorer(src, Config::default()).check().unwrap();
    assert_eq!(report.stats.paths, 3);
    assert!(report.paths.iter().all(|p| p.end == PathEnd::Completed));
    let conditions: Vec<_> = report.paths.iter().map(comparators).collect();
    assert_eq!(
        conditions,
        vec![
            vec![Comparator::Eq],
            vec![Comparator::Eq],
            vec![Comparator::Ne, Comparator::Ne],
        ]
    );
    assert_ne!(report.paths[0].path_condition, report.paths[1].path_condition);
}

#[test]
fn symbolic_compares_have_three_outcomes() {
    for (params, operands, insn) in [
        ("x: int @symbolic, y: int @symbolic", "load x\n        load y", "cmp"),
        ("a: real @symbolic", "load a\n        push 1.5", "fcmpl"),
        ("a: real @symbolic", "push 1.5\n        load a", "fcmpg"),
    ] {
        let src = format!(
            "class Main {{\n    static method f({}) -> int {{\n        {}\n        {}\n        return\n    }}\n}}\nentry Main.f\n",
            params, operands, insn
        );
        let report = explorer(&src, Config::default()).check().unwrap();
        assert_eq!(report.stats.paths, 3, "{}", insn);
        assert!(report.paths.iter().all(|p| p.end == PathEnd::Completed));
        let conditions: Vec<_> = report.paths.iter().map(comparators).collect();
        assert_eq!(
            conditions,
            vec![vec![Comparator::Lt], vec![Comparator::Eq], vec![Comparator::Gt]],
            "{}",
            insn
        );
    }
}

#[test]
fn unsupported_operation_ends_only_its_subtree() {
    for body in [
        "load x\n        i2f\n        pop",
        "load r\n        push 2.0\n        frem\n        pop",
        "push 3\n        newarray int\n        load x\n        arrayload\n        pop",
    ] {
        let src = format!(
            "class Main {{\n    static method f(x: int @symbolic, r: real @symbolic) -> int {{\n        load x\n        iflt negative\n        {}\n        push 0\n        return\n    negative:\n        push 1\n        return\n    }}\n}}\nentry Main.f\n",
            body
        );
        let ends = ends(&mut explorer(&src, Config::default()));
        assert_eq!(ends.len(), 2, "{}", body);
        assert!(matches!(ends[0], PathEnd::Unsupported { .. }), "{}: {}", body, ends[0]);
        assert_eq!(ends[1], PathEnd::Completed, "{}", body);
    }
}

#[test]
fn abstract_references_only_alias_or_null() {
    let src = r#"
abstract class Shape {
    field size: int
}
class Square extends Shape {
}
class Main {
    static method f(s: Square @symbolic, a: Shape @symbolic) {
        load s
        pop
        load a
        pop
        return
    }
}
entry Main.f
"#;
    let report = explorer(src, Config::default()).check().unwrap();
    // s: null or fresh; a: null, or the square when one exists
    assert_eq!(report.stats.paths, 3);
    assert!(report.paths.iter().all(|p| p.end == PathEnd::Completed));
    for path in &report.paths {
        assert_eq!(path.input_heap.nodes_of_type(|t| t == "Shape").count(), 0);
        assert!(path.input_heap.len() <= 1);
    }
}

#[test]
fn state_matching_never_adds_states() {
    let plain = explorer(RACY_COUNTER, Config::default()).check().unwrap();
    let config = Config {
        state_matching: true,
        ..Config::default()
    };
    let matched = explorer(RACY_COUNTER, config).check().unwrap();
    assert!(matched.stats.states <= plain.stats.states);
}

#[test]
fn replay_reproduces_every_path() {
    for src in [SIGN, DIVIDE, TWO_NODES, RACY_COUNTER] {
        let mut explorer = explorer(src, Config::default());
        let report = explorer.check().unwrap();
        for path in &report.paths {
            let first = explorer.replay(&path.trace).unwrap();
            let second = explorer.replay(&path.trace).unwrap();
            assert_eq!(first.fingerprint, second.fingerprint);
            assert_eq!(first.path_condition, path.path_condition);
            if matches!(path.end, PathEnd::Completed | PathEnd::UncaughtException(_) | PathEnd::Pruned) {
                assert_eq!(first.end.as_ref(), Some(&path.end));
            }
        }
    }
}

#[test]
fn replay_rejects_out_of_range_choice() {
    let explorer = explorer(SIGN, Config::default());
    assert!(explorer.replay(&[0, 2]).is_err());
    assert!(explorer.replay(&[0, 1, 0]).is_err());
    let partial = explorer.replay(&[0]).unwrap();
    assert!(partial.end.is_none());
}

#[test]
fn limits_stop_the_search() {
    let config = Config {
        max_states: 2,
        ..Config::default()
    };
    let report = explorer(RACY_COUNTER, config).check().unwrap();
    assert_eq!(report.outcome, CheckOutcome::StateLimitReached);

    let config = Config {
        max_depth: 1,
        ..Config::default()
    };
    let report = explorer(SIGN, config).check().unwrap();
    assert_eq!(report.outcome, CheckOutcome::Exhausted);
    assert!(report.paths.iter().all(|p| p.end == PathEnd::DepthLimit));
}

#[test]
fn shuffled_choice_order_finds_the_same_paths() {
    let config = Config {
        choice_shuffle_seed: Some(7),
        ..Config::default()
    };
    let shuffled = explorer(TWO_NODES, config).check().unwrap();
    let mut traces: Vec<_> = shuffled.paths.iter().map(|p| p.trace.clone()).collect();
    traces.sort();
    let plain = explorer(TWO_NODES, Config::default()).check().unwrap();
    let expected: Vec<_> = plain.paths.iter().map(|p| p.trace.clone()).collect();
    assert_eq!(traces, expected);
}
