//! Optimizer configuration.
//!
//! A single immutable [`OptConfig`] value is built by the caller and passed
//! by shared reference into every pass entry point. Passes never mutate it.

/// Default number of optimizer iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default largest unroll factor applied to a range loop.
pub const DEFAULT_MAX_UNROLL_FACTOR: u32 = 8;

/// Loops with at most this many literal iterations are fully expanded.
pub const DEFAULT_EXPAND_THRESHOLD_ITERS: u64 = 16;

/// Full expansion is refused if it would exceed this many instructions.
pub const DEFAULT_EXPAND_THRESHOLD_INSTS: u64 = 256;

/// Settings consumed by the range-loop unroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnrollConfig {
    /// Upper bound on any unroll factor, requested or inferred.
    pub max_unroll_factor: u32,
    /// Literal trip counts up to this bound are expanded completely.
    pub expand_threshold_iters: u64,
    /// Instruction budget (trip count times body size) for full expansion.
    pub expand_threshold_insts: u64,
}

impl Default for UnrollConfig {
    fn default() -> Self {
        Self {
            max_unroll_factor: DEFAULT_MAX_UNROLL_FACTOR,
            expand_threshold_iters: DEFAULT_EXPAND_THRESHOLD_ITERS,
            expand_threshold_insts: DEFAULT_EXPAND_THRESHOLD_INSTS,
        }
    }
}

/// Configuration for the optimizer pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "one independent enable flag per pass"
)]
pub struct OptConfig {
    /// Number of times the iterative pass sequence runs.
    pub max_iterations: u32,
    /// Loop unrolling thresholds.
    pub unroll: UnrollConfig,
    /// Constant folding and branch prediction.
    pub constant_fold: bool,
    /// Value numbering with closedness tracking and make-immediate.
    pub value_number: bool,
    /// Merging of sibling waits and push-down into wait bodies.
    pub wait_coalesce: bool,
    /// Fusion of sibling continuations.
    pub fusion: bool,
    /// Range-loop unrolling.
    pub unroll_loops: bool,
    /// Refcount cancellation and piggybacking.
    pub refcount_elim: bool,
    /// Dead-code elimination.
    pub dead_code: bool,
    /// Validate the tree after every pass.
    pub validate: bool,
}

impl Default for OptConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            unroll: UnrollConfig::default(),
            constant_fold: true,
            value_number: true,
            wait_coalesce: true,
            fusion: true,
            unroll_loops: true,
            refcount_elim: true,
            dead_code: true,
            validate: cfg!(debug_assertions),
        }
    }
}

impl OptConfig {
    /// Configuration with every pass switched off.
    pub fn disabled() -> Self {
        Self {
            constant_fold: false,
            value_number: false,
            wait_coalesce: false,
            fusion: false,
            unroll_loops: false,
            refcount_elim: false,
            dead_code: false,
            ..Default::default()
        }
    }

    /// Create a new config with the specified iteration count.
    pub fn with_max_iterations(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            ..Default::default()
        }
    }

    /// Create a new config with the specified unroll settings.
    pub fn with_unroll(unroll: UnrollConfig) -> Self {
        Self {
            unroll,
            ..Default::default()
        }
    }

    /// Whether unrolling runs in the given (zero-based) iteration.
    ///
    /// Unrolling is attempted every third iteration, starting with the
    /// third, so earlier iterations can shrink loop bodies first.
    #[inline]
    pub fn unroll_in_iteration(&self, iteration: u32) -> bool {
        self.unroll_loops && iteration % 3 == 2
    }
}

#[cfg(test)]
mod tests;
