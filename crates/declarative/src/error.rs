//! Error types for convergence runs.
//!
//! Errors are categorized by the phase that detects them. Configuration,
//! ordering and template errors are raised before the first resource is
//! applied, so a run that fails with one of them has not touched the host.
//! Apply errors stop the run at the failing resource; everything applied
//! before it stays in place.

use crate::types::ResourceKey;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid or contradictory input
    Configuration,
    /// Unsatisfiable ordering between resources
    Ordering,
    /// Template and bindings do not match
    Template,
    /// A resource could not reach its desired state
    Apply,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Invalid configuration",
            Self::Ordering => "Unsatisfiable resource ordering",
            Self::Template => "Template rendering failed",
            Self::Apply => "Resource could not be converged",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Fix the reported option and run again",
            Self::Ordering => "Remove one of the dependencies forming the cycle",
            Self::Template => "Add the missing variable to the bindings or fix the template",
            Self::Apply => {
                "Resources before the failing one were applied; fix the cause and re-run"
            }
        }
    }
}

/// Errors that can occur while planning or converging resources.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or contradictory input
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong with the input
        message: String,
    },

    /// Two or more resources require each other
    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle {
        /// Keys forming the cycle, in declaration order
        path: Vec<ResourceKey>,
    },

    /// A template references a name missing from its bindings
    #[error("template '{template}' references unbound variable '{name}'")]
    UnboundVariable {
        /// Template identifier
        template: String,
        /// The missing variable
        name: String,
    },

    /// A template could not be parsed or rendered
    #[error("template '{template}' failed to render: {message}")]
    Template {
        /// Template identifier
        template: String,
        /// Renderer message
        message: String,
    },

    /// A resource failed to converge
    #[error("failed to apply {key}: {source:#}")]
    Apply {
        /// The failing resource
        key: ResourceKey,
        /// Underlying filesystem, identity or installer failure
        #[source]
        source: anyhow::Error,
    },

    /// The run deadline passed before the next resource started
    #[error("run deadline exceeded after {elapsed:?}; {next} was not started")]
    Timeout {
        /// The resource that would have run next
        next: ResourceKey,
        /// Time spent so far
        elapsed: Duration,
    },
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Cycle { .. } => ErrorCategory::Ordering,
            Self::UnboundVariable { .. } | Self::Template { .. } => ErrorCategory::Template,
            Self::Apply { .. } | Self::Timeout { .. } => ErrorCategory::Apply,
        }
    }

    /// Whether the error was raised before any host mutation.
    pub fn aborts_before_mutation(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Apply)
    }

    /// The resource the run stopped at, if any.
    pub fn failing_key(&self) -> Option<&ResourceKey> {
        match self {
            Self::Apply { key, .. } => Some(key),
            Self::Timeout { next, .. } => Some(next),
            _ => None,
        }
    }
}

fn format_cycle(path: &[ResourceKey]) -> String {
    let mut parts: Vec<String> = path.iter().map(ToString::to_string).collect();
    if let Some(first) = path.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let err = Error::Cycle {
            path: vec![ResourceKey::user("a"), ResourceKey::group("b")],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle: user:a -> group:b -> user:a"
        );
        assert!(err.aborts_before_mutation());
    }

    #[test]
    fn test_apply_error_carries_key_and_cause() {
        let err = Error::Apply {
            key: ResourceKey::directory("/fedora"),
            source: anyhow::anyhow!("permission denied"),
        };
        assert!(err.to_string().contains("directory:/fedora"));
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(err.failing_key(), Some(&ResourceKey::directory("/fedora")));
        assert!(!err.aborts_before_mutation());
    }
}
