//! Tunable limits for the specializer.

/// How often a label may re-enter itself from its own frame during
/// compile-time evaluation before unrolling is rejected.
pub const SCOPES_MAX_RECURSIONS: usize = 32;

/// Maximum nesting of function normalization before reporting a stack overflow.
pub const SCOPES_MAX_STACK_DEPTH: usize = 256;

/// Maximum chain length followed when skipping immediate jumps.
pub const SCOPES_MAX_SKIP_JUMPS: usize = 10;

/// Limits applied during one compile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecializerConfig {
    pub max_recursions: usize,
    pub max_stack_depth: usize,
    pub max_skip_jumps: usize,
}

impl Default for SpecializerConfig {
    fn default() -> Self {
        SpecializerConfig {
            max_recursions: SCOPES_MAX_RECURSIONS,
            max_stack_depth: SCOPES_MAX_STACK_DEPTH,
            max_skip_jumps: SCOPES_MAX_SKIP_JUMPS,
        }
    }
}

impl SpecializerConfig {
    pub fn with_max_recursions(mut self, max_recursions: usize) -> Self {
        self.max_recursions = max_recursions;
        self
    }

    pub fn with_max_stack_depth(mut self, max_stack_depth: usize) -> Self {
        self.max_stack_depth = max_stack_depth;
        self
    }

    pub fn with_max_skip_jumps(mut self, max_skip_jumps: usize) -> Self {
        self.max_skip_jumps = max_skip_jumps;
        self
    }
}
