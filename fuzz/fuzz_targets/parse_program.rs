#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(program) = cortex_syntax::parse(s) {
            let printed = cortex_syntax::pretty_print(&program);
            let reparsed = cortex_syntax::parse(&printed).expect("pretty output must parse");
            assert_eq!(printed, cortex_syntax::pretty_print(&reparsed));
            let _ = cortex_vm::load(&program);
        }
    }
});
