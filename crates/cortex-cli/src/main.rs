//! Command-line interface for the Cortex model checker.

use clap::{ArgAction, Args, Parser, Subcommand};
use cortex_syntax::{parse, pretty_print, Program as Ast, Span};
use cortex_vm::{
    load, CheckOutcome, Config, ExecTracker, Explorer, PathConditionReporter, PathRecord, Program, SearchReport,
    VmListener,
};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read file: {message}")]
    IoError { message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(cortex::parse_error))]
    ParseError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("load error: {message}")]
    #[diagnostic(code(cortex::load_error))]
    LoadError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("check error: {message}")]
    CheckError { message: String },

    #[error("{message}")]
    Other { message: String },
}

fn source_span(span: Span) -> SourceSpan {
    (span.start, span.len()).into()
}

impl CliError {
    fn from_parse_error(e: cortex_syntax::ParseError, source: Arc<String>, filename: &str) -> Self {
        CliError::ParseError {
            message: e.to_string(),
            src: NamedSource::new(filename, source),
            span: source_span(e.span()),
        }
    }

    fn from_load_error(e: cortex_vm::LoadError, source: Arc<String>, filename: &str) -> Self {
        CliError::LoadError {
            message: e.to_string(),
            src: NamedSource::new(filename, source),
            span: source_span(e.span()),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "cortex", version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CORTEX_GIT_HASH"), ")"))]
#[command(about = "Model checker with symbolic execution for Cortex assembly", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and load a program and list its classes
    Parse {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the syntax tree
        #[arg(long)]
        ast: bool,
    },

    /// Explore every path of a program
    Check {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        options: CheckOptions,

        /// Print the path condition of every path
        #[arg(long)]
        paths: bool,
    },

    /// Re-execute a choice trace
    Replay {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Comma-separated choice indices from the root
        #[arg(value_name = "TRACE")]
        trace: String,

        #[command(flatten)]
        options: CheckOptions,
    },

    /// Format a program
    Format {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write output to file instead of stdout
        #[arg(short, long)]
        write: bool,
    },
}

#[derive(Args)]
struct CheckOptions {
    /// Maximum number of states to explore (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_states: usize,

    /// Maximum depth to explore (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_depth: usize,

    /// Maximum time in seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_time: u64,

    /// Maximum memory usage in MB (0 = unlimited)
    #[arg(long, default_value = "0")]
    memory_limit: usize,

    /// Instructions after which a backward jump preempts the thread (0 = never)
    #[arg(long, default_value = "5000")]
    max_transition_length: usize,

    /// Maximum number of heap objects (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_heap_objects: usize,

    /// Longest array `newarray` may allocate (0 = host limit)
    #[arg(long, default_value_t = 1 << 20)]
    max_array_length: usize,

    /// Stop at the first error path
    #[arg(long)]
    stop_on_error: bool,

    /// Skip states already explored
    #[arg(long)]
    state_matching: bool,

    /// Shuffle the order of choices with this seed
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Never break transitions at field accesses
    #[arg(long)]
    no_field_boundaries: bool,

    /// Break at every shared field access, ignoring locksets and finals
    #[arg(long)]
    no_sync_detection: bool,

    /// Break at shared array element accesses
    #[arg(long)]
    break_arrays: bool,

    /// Break after spawning a thread
    #[arg(long)]
    break_start: bool,

    /// Break at yield
    #[arg(long)]
    break_yield: bool,

    /// Register thread choices even with a single runnable thread
    #[arg(long)]
    break_single_choice: bool,

    /// Keep symbolic references uninitialized
    #[arg(long)]
    no_lazy_init: bool,

    /// Fingerprint state around every suspending instruction
    #[arg(long)]
    check_purity: bool,
}

impl CheckOptions {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            max_states: self.max_states,
            max_depth: self.max_depth,
            max_time_secs: self.max_time,
            memory_limit_mb: self.memory_limit,
            max_transition_length: self.max_transition_length,
            max_heap_objects: self.max_heap_objects,
            max_array_length: self.max_array_length,
            stop_on_error: self.stop_on_error,
            state_matching: self.state_matching,
            choice_shuffle_seed: self.seed,
            por_field_boundaries: !self.no_field_boundaries,
            por_sync_detection: !self.no_sync_detection,
            break_arrays: self.break_arrays,
            break_start: self.break_start,
            break_yield: self.break_yield,
            break_single_choice: self.break_single_choice,
            lazy_init: !self.no_lazy_init,
            check_top_half_purity: self.check_purity || defaults.check_top_half_purity,
            ..defaults
        }
    }
}

fn main() {
    // Install miette's fancy error handler
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Parse { file, ast } => cmd_parse(&file, ast),
        Commands::Check {
            file,
            options,
            paths,
        } => cmd_check(&file, &options, paths, cli.verbose),
        Commands::Replay {
            file,
            trace,
            options,
        } => cmd_replay(&file, &trace, &options),
        Commands::Format { file, write } => cmd_format(&file, write),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(1);
        }
    }
}

/// Exit codes: 0 no errors, 1 error paths found, 2 search stopped at a limit.
type ExitCode = i32;

fn read_source(file: &Path) -> CliResult<Arc<String>> {
    fs::read_to_string(file)
        .map(Arc::new)
        .map_err(|e| CliError::IoError {
            message: e.to_string(),
        })
}

fn parse_source(file: &Path) -> CliResult<(Arc<String>, Ast)> {
    let filename = file.display().to_string();
    let source = read_source(file)?;
    let ast = parse(&source).map_err(|e| CliError::from_parse_error(e, source.clone(), &filename))?;
    Ok((source, ast))
}

fn load_program(file: &Path) -> CliResult<Program> {
    let filename = file.display().to_string();
    let (source, ast) = parse_source(file)?;
    load(&ast).map_err(|e| CliError::from_load_error(e, source, &filename))
}

fn cmd_parse(file: &Path, show_ast: bool) -> CliResult<ExitCode> {
    let (source, ast) = parse_source(file)?;
    if show_ast {
        println!("{:#?}", ast);
    }
    let filename = file.display().to_string();
    let program = load(&ast).map_err(|e| CliError::from_load_error(e, source, &filename))?;

    for decl in &ast.classes {
        let Some(class) = program.class_by_name(&decl.name.name) else {
            continue;
        };
        println!(
            "class {} ({} fields, {} static fields)",
            class.name,
            class.fields.len(),
            class.static_fields.len()
        );
        for &id in &class.methods {
            let method = program.method(id);
            println!(
                "    method {} ({} instructions, {} locals)",
                method.name,
                method.code.len(),
                method.max_locals
            );
        }
    }
    match program.entry() {
        Some(entry) => println!("entry {}", program.method(entry).full_name),
        None => println!("no entry"),
    }

    println!("parse: ok");
    Ok(0)
}

fn format_trace(trace: &[usize]) -> String {
    trace.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",")
}

fn print_path(path: &PathRecord) {
    println!("  {}", path.end);
    println!("    Trace: {}", format_trace(&path.trace));
    if !path.path_condition.is_empty() {
        println!("    Path condition: {}", path.path_condition);
    }
    if !path.heap_condition.is_empty() {
        println!("    Heap condition: {}", path.heap_condition);
    }
}

fn print_stats(report: &SearchReport) {
    let stats = &report.stats;
    println!("  States explored: {}", stats.states);
    println!("  Transitions: {}", stats.transitions);
    println!("  Instructions: {}", stats.instructions);
    println!("  Paths: {} ({} pruned, {} revisited)", stats.paths, stats.pruned, stats.revisited);
    println!("  Max depth: {}", stats.max_depth);
    println!("  Time: {:.2}s", report.elapsed.as_secs_f64());
}

fn cmd_check(file: &Path, options: &CheckOptions, show_paths: bool, verbose: u8) -> CliResult<ExitCode> {
    info!("loading...");
    let program = load_program(file)?;
    let config = options.config();

    let mut explorer = Explorer::new(program, config).map_err(|e| CliError::CheckError {
        message: e.to_string(),
    })?;

    let mut reporter = PathConditionReporter::new();
    let mut tracker = ExecTracker::new();
    let mut listeners: Vec<&mut dyn VmListener> = Vec::new();
    if show_paths {
        listeners.push(&mut reporter);
    }
    if verbose >= 2 {
        listeners.push(&mut tracker);
    }

    info!("exploring...");
    let report = explorer
        .check_with(&mut listeners)
        .map_err(|e| CliError::CheckError {
            message: e.to_string(),
        })?;
    drop(listeners);

    if show_paths {
        println!();
        print!("{}", reporter);
    }

    let errors: Vec<_> = report.errors().collect();
    println!();
    let mut code = 0;
    match &report.outcome {
        CheckOutcome::Exhausted if errors.is_empty() => println!("Result: OK"),
        CheckOutcome::Exhausted | CheckOutcome::StoppedOnError => println!("Result: ERRORS FOUND"),
        CheckOutcome::StateLimitReached => {
            println!("Result: STATE LIMIT REACHED");
            code = 2;
        }
        CheckOutcome::TimeLimitReached => {
            println!("Result: TIME LIMIT REACHED");
            code = 2;
        }
        CheckOutcome::MemoryLimitReached { memory_mb } => {
            println!("Result: MEMORY LIMIT REACHED");
            println!("  Memory usage: {} MB", memory_mb);
            code = 2;
        }
    }
    if !errors.is_empty() {
        println!("  Errors ({}):", errors.len());
        for path in &errors {
            print_path(path);
        }
        code = 1;
    }
    print_stats(&report);
    Ok(code)
}

fn parse_trace(trace: &str) -> CliResult<Vec<usize>> {
    trace
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>().map_err(|_| CliError::Other {
                message: format!("invalid choice '{}' in trace, expected a non-negative integer", s),
            })
        })
        .collect()
}

fn cmd_replay(file: &Path, trace: &str, options: &CheckOptions) -> CliResult<ExitCode> {
    let trace = parse_trace(trace)?;
    let program = load_program(file)?;
    let explorer = Explorer::new(program, options.config()).map_err(|e| CliError::CheckError {
        message: e.to_string(),
    })?;
    let result = explorer.replay(&trace).map_err(|e| CliError::CheckError {
        message: e.to_string(),
    })?;

    println!("Replayed {} choices", trace.len());
    match &result.end {
        Some(end) => println!("  End: {}", end),
        None => println!("  End: choice pending"),
    }
    println!("  Fingerprint: {}", result.fingerprint);
    if !result.path_condition.is_empty() {
        println!("  Path condition: {}", result.path_condition);
    }
    for thread in &result.kernel.threads {
        println!("  {}: {:?}", thread.id, thread.status);
    }
    Ok(match result.end {
        Some(end) if end.is_error() => 1,
        _ => 0,
    })
}

fn cmd_format(file: &Path, write: bool) -> CliResult<ExitCode> {
    let (_, ast) = parse_source(file)?;
    let formatted = pretty_print(&ast);

    if write {
        fs::write(file, &formatted).map_err(|e| CliError::IoError {
            message: e.to_string(),
        })?;
        println!("formatted: {}", file.display());
    } else {
        print!("{}", formatted);
    }

    Ok(0)
}
