//! Common error types for the job/task execution engine
//!
//! Used at true fallibility boundaries (world adapter calls, registry
//! lookups). Ordinary task/job progression never returns `Result` — partial
//! failure (stuck, no path) is modeled as per-agent task state, not `Err`.

use std::fmt;

/// Core error type for the engine
#[derive(Debug, Clone)]
pub enum CoreError {
    /// World Adapter call failed or returned something the core can't use
    World(String),

    /// Pathfinding request/registry errors
    Pathfinding(String),

    /// Task tree bookkeeping errors
    Task(String),

    /// Job lifecycle errors
    Job(String),

    /// Area-scan pipeline errors
    Scan(String),

    /// Chunk deconstruction errors
    Deconstruct(String),

    /// Configuration errors
    Config(String),

    /// Generic error with custom message
    Generic(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::World(msg) => write!(f, "World Adapter Error: {}", msg),
            CoreError::Pathfinding(msg) => write!(f, "Pathfinding Error: {}", msg),
            CoreError::Task(msg) => write!(f, "Task Error: {}", msg),
            CoreError::Job(msg) => write!(f, "Job Error: {}", msg),
            CoreError::Scan(msg) => write!(f, "Scan Error: {}", msg),
            CoreError::Deconstruct(msg) => write!(f, "Deconstruct Error: {}", msg),
            CoreError::Config(msg) => write!(f, "Configuration Error: {}", msg),
            CoreError::Generic(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn world<S: Into<String>>(msg: S) -> Self {
        Self::World(msg.into())
    }

    pub fn pathfinding<S: Into<String>>(msg: S) -> Self {
        Self::Pathfinding(msg.into())
    }

    pub fn task<S: Into<String>>(msg: S) -> Self {
        Self::Task(msg.into())
    }

    pub fn job<S: Into<String>>(msg: S) -> Self {
        Self::Job(msg.into())
    }

    pub fn scan<S: Into<String>>(msg: S) -> Self {
        Self::Scan(msg.into())
    }

    pub fn deconstruct<S: Into<String>>(msg: S) -> Self {
        Self::Deconstruct(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Self::Generic(msg.into())
    }
}

/// Helper macros for common error patterns
#[macro_export]
macro_rules! ensure {
    ($condition:expr, $error:expr) => {
        if !$condition {
            return Err($error);
        }
    };
}

#[macro_export]
macro_rules! ok_or_error {
    ($option:expr, $error:expr) => {
        $option.ok_or_else(|| $error)
    };
}
