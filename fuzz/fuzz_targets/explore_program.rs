#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(ast) = cortex_syntax::parse(s) {
            if let Ok(program) = cortex_vm::load(&ast) {
                let config = cortex_vm::Config {
                    max_states: 1_000,
                    max_depth: 50,
                    max_time_secs: 2,
                    max_heap_objects: 64,
                    max_transition_length: 500,
                    state_matching: true,
                    check_top_half_purity: true,
                    ..cortex_vm::Config::default()
                };
                if let Ok(mut explorer) = cortex_vm::Explorer::new(program, config) {
                    if let Ok(report) = explorer.check() {
                        for path in report.paths.iter().take(8) {
                            let replayed = explorer.replay(&path.trace).expect("recorded traces replay");
                            assert_eq!(replayed.path_condition, path.path_condition);
                        }
                    }
                }
            }
        }
    }
});
