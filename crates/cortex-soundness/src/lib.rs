//! Helpers for whole-program soundness tests: loading source text,
//! running the explorer, and generating small parameterized programs.

use cortex_syntax::{parse, pretty_print};
use cortex_vm::{load, CheckError, Config, Explorer, Program, SearchReport};

pub fn load_program(source: &str) -> Result<Program, String> {
    let ast = parse(source).map_err(|e| e.to_string())?;
    load(&ast).map_err(|e| e.to_string())
}

pub fn explorer(source: &str, config: Config) -> Result<Explorer, String> {
    let program = load_program(source)?;
    Explorer::new(program, config).map_err(|e| e.to_string())
}

pub fn check_program(source: &str, config: Config) -> Result<SearchReport, String> {
    explorer(source, config)?.check().map_err(|e: CheckError| e.to_string())
}

pub fn roundtrip_pretty(source: &str) -> Result<(String, String), String> {
    let p1 = pretty_print(&parse(source).map_err(|e| e.to_string())?);
    let p2 = pretty_print(&parse(&p1).map_err(|e| e.to_string())?);
    Ok((p1, p2))
}

/// Settings for generated programs: purity checking on, small input ranges.
pub fn test_config() -> Config {
    Config {
        max_states: 50_000,
        max_time_secs: 10,
        min_int: -100,
        max_int: 100,
        check_top_half_purity: true,
        ..Config::default()
    }
}

/// Entry `Main.test` over `params` symbolic ints. Each `(a, b, c)` in
/// `tests` branches on `p[a] < p[b] + c`; taken branches add 1 to the
/// result.
pub fn comparison_chain(params: usize, tests: &[(usize, usize, i64)]) -> String {
    let mut src = String::from("class Main {\n    static method test(");
    let names: Vec<_> = (0..params).map(|i| format!("p{}", i)).collect();
    let decls: Vec<_> = names.iter().map(|n| format!("{}: int @symbolic", n)).collect();
    src.push_str(&decls.join(", "));
    src.push_str(") -> int {\n        push 0\n        store acc\n");
    for (i, &(a, b, c)) in tests.iter().enumerate() {
        src.push_str(&format!("        load {}\n", names[a % params]));
        src.push_str(&format!("        load {}\n", names[b % params]));
        src.push_str(&format!("        push {}\n        add\n", c));
        src.push_str(&format!("        if_cmpge skip{}\n", i));
        src.push_str("        inc acc 1\n");
        src.push_str(&format!("    skip{}:\n", i));
    }
    src.push_str("        load acc\n        return\n    }\n}\n\nentry Main.test\n");
    src
}

/// Entry `Main.test` that dereferences `inputs` symbolic `Node` references
/// in order.
pub fn node_inputs(inputs: usize) -> String {
    let mut src = String::from("class Node {\n    field next: Node\n    field value: int\n}\n\nclass Main {\n    static method test(");
    let decls: Vec<_> = (0..inputs).map(|i| format!("n{}: Node @symbolic", i)).collect();
    src.push_str(&decls.join(", "));
    src.push_str(") {\n");
    for i in 0..inputs {
        src.push_str(&format!("        load n{}\n        pop\n", i));
    }
    src.push_str("        return\n    }\n}\n\nentry Main.test\n");
    src
}

/// Paths of [`node_inputs`]: with `m` objects materialized so far, each
/// input aliases one of them, is null, or is fresh.
pub fn lazy_path_count(inputs: usize) -> usize {
    fn count(remaining: usize, materialized: usize) -> usize {
        if remaining == 0 {
            return 1;
        }
        materialized * count(remaining - 1, materialized)
            + count(remaining - 1, materialized)
            + count(remaining - 1, materialized + 1)
    }
    count(inputs, 0)
}

/// Entry `Main.main` where `threads` threads each add one to a shared
/// counter, optionally inside a synchronized method.
pub fn counter_threads(threads: usize, synchronized: bool) -> String {
    let modifier = if synchronized { "synchronized " } else { "" };
    let mut src = format!(
        "class Counter {{\n    field value: int\n\n    {}method increment() {{\n        load this\n        getfield Counter.value\n        push 1\n        add\n        store v\n        load this\n        load v\n        putfield Counter.value\n        return\n    }}\n}}\n\n",
        modifier
    );
    src.push_str("class Main {\n    static method main() {\n        new Counter\n        store c\n");
    for _ in 1..threads {
        src.push_str("        load c\n        spawn Main.worker\n");
    }
    src.push_str("        load c\n        invokestatic Main.worker\n        return\n    }\n\n");
    src.push_str("    static method worker(c: Counter) {\n        load c\n        invokevirtual Counter.increment\n        return\n    }\n}\n\nentry Main.main\n");
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_programs_load() {
        load_program(&comparison_chain(2, &[(0, 1, 3), (1, 1, 0)])).unwrap();
        load_program(&node_inputs(3)).unwrap();
        load_program(&counter_threads(3, true)).unwrap();
    }

    #[test]
    fn test_lazy_path_count() {
        assert_eq!(lazy_path_count(1), 2);
        assert_eq!(lazy_path_count(2), 5);
        assert_eq!(lazy_path_count(3), 15);
    }
}
