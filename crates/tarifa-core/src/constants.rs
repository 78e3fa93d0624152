//! Defaults shared by the engine configuration and its consumers

/// Result cache defaults
pub mod cache {
    /// Fixed time-to-live of a cached result (5 minutes)
    pub const DEFAULT_TTL_SECONDS: u64 = 300;

    /// Maximum number of cached results
    pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;
}

/// Audit trail defaults
pub mod audit {
    /// Records kept before the oldest is evicted
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Calculations slower than this are flagged
    pub const DEFAULT_SLOW_CALCULATION_MS: u64 = 1000;
}

/// Method resolution defaults
pub mod methods {
    /// Method used when neither the request nor the route names one
    pub const DEFAULT_METHOD_CODE: &str = "PALET";
}

/// Formula evaluator limits
pub mod formulas {
    /// Maximum formula length in characters
    pub const MAX_EXPRESSION_LENGTH: usize = 4096;

    /// Maximum expression nesting depth
    pub const MAX_NESTING_DEPTH: usize = 64;
}
