//! Property: exploration and replay are deterministic.
//!
//! Running the explorer twice on the same program visits the same paths
//! in the same order, and replaying a path's trace reproduces the same
//! kernel state and path condition every time.

use cortex_soundness::{check_program, comparison_chain, counter_threads, explorer, test_config};
use cortex_vm::PathEnd;
use proptest::prelude::*;

fn assert_deterministic(src: &str) {
    let first = check_program(src, test_config()).expect("first run");
    let second = check_program(src, test_config()).expect("second run");
    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.stats, second.stats);
    let ends = |r: &cortex_vm::SearchReport| r.paths.iter().map(|p| (p.trace.clone(), p.end.clone())).collect::<Vec<_>>();
    assert_eq!(ends(&first), ends(&second));

    let explorer = explorer(src, test_config()).unwrap();
    for path in &first.paths {
        let a = explorer.replay(&path.trace).expect("replay");
        let b = explorer.replay(&path.trace).expect("replay");
        assert_eq!(a.fingerprint, b.fingerprint, "trace {:?}", path.trace);
        assert_eq!(a.path_condition, path.path_condition, "trace {:?}", path.trace);
        if matches!(path.end, PathEnd::Completed | PathEnd::Pruned | PathEnd::UncaughtException(_)) {
            assert_eq!(a.end.as_ref(), Some(&path.end));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn comparison_chains_are_deterministic(
        params in 1usize..=3,
        tests in prop::collection::vec((0usize..3, 0usize..3, -5i64..=5), 1..=4),
    ) {
        assert_deterministic(&comparison_chain(params, &tests));
    }
}

#[test]
fn thread_interleavings_are_deterministic() {
    assert_deterministic(&counter_threads(2, false));
    assert_deterministic(&counter_threads(2, true));
}

#[test]
fn shuffled_runs_with_the_same_seed_agree() {
    let src = comparison_chain(2, &[(0, 1, 0), (1, 0, 2), (0, 0, 1)]);
    let config = || cortex_vm::Config {
        choice_shuffle_seed: Some(42),
        ..test_config()
    };
    let first = check_program(&src, config()).unwrap();
    let second = check_program(&src, config()).unwrap();
    let traces = |r: &cortex_vm::SearchReport| r.paths.iter().map(|p| p.trace.clone()).collect::<Vec<_>>();
    assert_eq!(traces(&first), traces(&second));
}
