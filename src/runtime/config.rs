//! Script engine configuration.
//!
//! - [`EngineConfig`] - Top-level configuration of a [`crate::ScriptEngine`]
//! - [`ScriptLimits`] - Resource limits applied to every script run
//!
//! # Presets
//!
//! - [`EngineConfig::sandboxed()`] - Tight limits for untrusted scripts
//! - [`EngineConfig::unrestricted()`] - No limits at all
//!
//! # Example
//!
//! ```rust,no_run
//! use hostbridge::{EngineConfig, ScriptLimits};
//!
//! let config = EngineConfig {
//!     limits: ScriptLimits::new()
//!         .with_max_operations(1_000_000)
//!         .with_timeout_ms(5_000),
//!     ..EngineConfig::default()
//! }
//! .with_name("plugin-host");
//! assert!(config.validate().is_ok());
//! ```

use crate::{Error, Result};

/// Configuration of a script engine.
///
/// # Default Configuration
///
/// - generated engine name
/// - [`ScriptLimits::default()`]
/// - continuation callback polled every 1000 operations
/// - script `print`/`debug` output forwarded to `tracing`
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Engine name; a unique name is generated when `None`
    pub name: Option<String>,

    /// Resource limits applied to every run
    pub limits: ScriptLimits,

    /// Number of script operations between two polls of the continuation callback.
    ///
    /// Interrupt requests are observed at every operation regardless of this interval.
    pub continuation_interval: u64,

    /// Forward script `print` and `debug` output to `tracing` events
    pub forward_output: bool,
}

/// Resource limits of a script run; `0` means unlimited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptLimits {
    /// Maximum number of script operations per run
    pub max_operations: u64,

    /// Maximum depth of nested script function calls
    pub max_call_levels: usize,

    /// Maximum nesting depth of expressions, at global level and inside functions
    pub max_expr_depth: usize,

    /// Maximum length of a script string, in bytes
    pub max_string_size: usize,

    /// Maximum number of elements of a script array
    pub max_array_size: usize,

    /// Maximum number of properties of a script object map
    pub max_map_size: usize,

    /// Wall-clock limit of a run, in milliseconds
    pub timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            name: None,
            limits: ScriptLimits::default(),
            continuation_interval: 1000,
            forward_output: true,
        }
    }
}

impl Default for ScriptLimits {
    fn default() -> Self {
        ScriptLimits {
            max_operations: 0,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 0,
            max_array_size: 0,
            max_map_size: 0,
            timeout_ms: 0,
        }
    }
}

impl EngineConfig {
    /// Configuration for untrusted scripts.
    ///
    /// - 10 million operations, 5 second timeout
    /// - 32 call levels, expression depth 32
    /// - 1 MB strings, 100k array elements, 10k map properties
    /// - output is not forwarded
    #[must_use]
    pub fn sandboxed() -> Self {
        EngineConfig {
            name: None,
            limits: ScriptLimits {
                max_operations: 10_000_000,
                max_call_levels: 32,
                max_expr_depth: 32,
                max_string_size: 1024 * 1024,
                max_array_size: 100_000,
                max_map_size: 10_000,
                timeout_ms: 5_000,
            },
            continuation_interval: 256,
            forward_output: false,
        }
    }

    /// Configuration without any limit
    #[must_use]
    pub fn unrestricted() -> Self {
        EngineConfig {
            limits: ScriptLimits::unlimited(),
            ..EngineConfig::default()
        }
    }

    /// Set the engine name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the limits
    #[must_use]
    pub fn with_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the continuation polling interval, in operations
    #[must_use]
    pub fn with_continuation_interval(mut self, operations: u64) -> Self {
        self.continuation_interval = operations;
        self
    }

    /// Enable or disable forwarding of script output
    #[must_use]
    pub fn with_forward_output(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    /// Check the configuration for nonsensical combinations.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] for an empty engine name or a zero
    /// continuation interval.
    pub fn validate(&self) -> Result<()> {
        if self.continuation_interval == 0 {
            return Err(Error::InvalidConfiguration(
                "continuation interval must be at least one operation".to_string(),
            ));
        }

        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(Error::InvalidConfiguration(
                "engine name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl ScriptLimits {
    /// Limits with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No limit at all
    #[must_use]
    pub fn unlimited() -> Self {
        ScriptLimits {
            max_operations: 0,
            max_call_levels: 0,
            max_expr_depth: 0,
            max_string_size: 0,
            max_array_size: 0,
            max_map_size: 0,
            timeout_ms: 0,
        }
    }

    /// Sets the maximum operation count (0 for unlimited)
    #[must_use]
    pub fn with_max_operations(mut self, max: u64) -> Self {
        self.max_operations = max;
        self
    }

    /// Sets the maximum call depth (0 for unlimited)
    #[must_use]
    pub fn with_max_call_levels(mut self, max: usize) -> Self {
        self.max_call_levels = max;
        self
    }

    /// Sets the maximum expression depth (0 for unlimited)
    #[must_use]
    pub fn with_max_expr_depth(mut self, max: usize) -> Self {
        self.max_expr_depth = max;
        self
    }

    /// Sets the maximum string length (0 for unlimited)
    #[must_use]
    pub fn with_max_string_size(mut self, max: usize) -> Self {
        self.max_string_size = max;
        self
    }

    /// Sets the maximum array length (0 for unlimited)
    #[must_use]
    pub fn with_max_array_size(mut self, max: usize) -> Self {
        self.max_array_size = max;
        self
    }

    /// Sets the maximum object map size (0 for unlimited)
    #[must_use]
    pub fn with_max_map_size(mut self, max: usize) -> Self {
        self.max_map_size = max;
        self
    }

    /// Sets the run timeout in milliseconds (0 for no timeout)
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}
