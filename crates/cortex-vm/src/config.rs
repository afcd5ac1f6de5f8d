//! Virtual machine and search configuration.

/// Immutable settings threaded into the scheduler, the instruction
/// context and the explorer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of states to explore (0 = unlimited).
    pub max_states: usize,
    /// Maximum number of choice points on one path (0 = unlimited).
    pub max_depth: usize,
    /// Maximum time in seconds (0 = unlimited).
    pub max_time_secs: u64,
    /// Maximum memory usage in MB (0 = unlimited).
    pub memory_limit_mb: usize,
    /// Instructions one thread may run before a backward jump forces a
    /// scheduling point (0 = never).
    pub max_transition_length: usize,
    /// Stop at the first path ending in an uncaught exception, deadlock or
    /// unsupported operation.
    pub stop_on_error: bool,
    /// Skip choice points whose kernel state was already explored.
    pub state_matching: bool,
    /// If set, shuffle the exploration order of every choice generator.
    pub choice_shuffle_seed: Option<u64>,

    /// Break transitions at scheduling-relevant field accesses.
    pub por_field_boundaries: bool,
    /// Use sharedness, lock protection and annotations to filter accesses.
    pub por_sync_detection: bool,
    /// Final instance fields are never interleaving points.
    pub skip_finals: bool,
    /// Final static fields are never interleaving points.
    pub skip_static_finals: bool,
    /// Break transitions at shared array element accesses.
    pub break_arrays: bool,
    /// Break after a thread is spawned.
    pub break_start: bool,
    /// Break at `yield`.
    pub break_yield: bool,
    /// Register optional thread choices even with a single runnable thread.
    pub break_single_choice: bool,

    /// Lazily materialize symbolic references on first dereference.
    pub lazy_init: bool,
    /// Bounds of fresh symbolic integers.
    pub min_int: i64,
    pub max_int: i64,
    /// Bounds of fresh symbolic reals.
    pub min_real: f64,
    pub max_real: f64,

    /// Maximum number of allocated objects (0 = unlimited).
    pub max_heap_objects: usize,
    /// Longest array `newarray` may allocate. Longer requests raise
    /// `OutOfMemoryError` (0 = bounded only by what the host can reserve).
    pub max_array_length: usize,

    /// Fingerprint the kernel around every suspending top half.
    pub check_top_half_purity: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_states: 0,
            max_depth: 0,
            max_time_secs: 0,
            memory_limit_mb: 0,
            max_transition_length: 5000,
            stop_on_error: false,
            state_matching: false,
            choice_shuffle_seed: None,
            por_field_boundaries: true,
            por_sync_detection: true,
            skip_finals: true,
            skip_static_finals: false,
            break_arrays: false,
            break_start: false,
            break_yield: false,
            break_single_choice: false,
            lazy_init: true,
            min_int: i32::MIN as i64,
            max_int: i32::MAX as i64,
            min_real: -1.0e9,
            max_real: 1.0e9,
            max_heap_objects: 0,
            max_array_length: 1 << 20,
            check_top_half_purity: cfg!(debug_assertions),
        }
    }
}
