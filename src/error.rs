use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactorError>;

/// Every failure the reactor core can surface to a caller.
///
/// Each dispatcher owns and isolates its own failures: nothing in this enum is
/// allowed to take down the [`Environment`](crate::environment::Environment) or
/// a sibling dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactorError {
    /// Invalid configuration (unknown dispatcher type, unreadable config file, bad value)
    Configuration {
        /// Human readable description of the problem
        message: String,
    },
    /// No dispatcher (or only an empty pool) is registered under the name
    DispatcherNotFound {
        /// The name that was looked up
        name: String,
    },
    /// A write would exceed the capacity of a fixed-length buffer
    Overflow {
        /// Bytes the operation needed
        requested: usize,
        /// Bytes that were available
        available: usize,
    },
    /// A read would pass the buffer's limit
    Underflow {
        /// Bytes the operation needed
        requested: usize,
        /// Bytes that remained before the limit
        remaining: usize,
    },
    /// A registered consumer failed (returned an error or panicked) during routing
    ConsumerInvocation {
        /// Routing key of the event being delivered
        key: String,
        /// Id of the registration whose consumer failed
        registration: u64,
        /// Failure description
        message: String,
    },
    /// A bounded backlog is full and the dispatcher rejects instead of blocking
    Saturated {
        /// Dispatcher name
        dispatcher: String,
        /// Configured backlog
        backlog: usize,
    },
    /// The dispatcher has been shut down or halted
    Shutdown {
        /// Dispatcher name
        dispatcher: String,
    },
    /// A codec could not decode or encode a unit
    Codec {
        /// Failure description
        message: String,
    },
}

impl ReactorError {
    /// Shorthand for [`ReactorError::Configuration`]
    pub fn configuration(message: impl Into<String>) -> Self {
        ReactorError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for [`ReactorError::Codec`]
    pub fn codec(message: impl Into<String>) -> Self {
        ReactorError::Codec {
            message: message.into(),
        }
    }

    /// Short stable name of the error kind, used as the escalation key
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReactorError::Configuration { .. } => "configuration",
            ReactorError::DispatcherNotFound { .. } => "dispatcher_not_found",
            ReactorError::Overflow { .. } => "overflow",
            ReactorError::Underflow { .. } => "underflow",
            ReactorError::ConsumerInvocation { .. } => "consumer",
            ReactorError::Saturated { .. } => "saturated",
            ReactorError::Shutdown { .. } => "shutdown",
            ReactorError::Codec { .. } => "codec",
        }
    }
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::Configuration { message } => {
                write!(f, "configuration error: {}", message)
            }
            ReactorError::DispatcherNotFound { name } => {
                write!(f, "no dispatcher found for name '{}'", name)
            }
            ReactorError::Overflow {
                requested,
                available,
            } => write!(
                f,
                "buffer overflow: {} bytes requested but only {} available in a fixed-length buffer",
                requested, available
            ),
            ReactorError::Underflow {
                requested,
                remaining,
            } => write!(
                f,
                "buffer underflow: {} bytes requested but only {} remaining before the limit",
                requested, remaining
            ),
            ReactorError::ConsumerInvocation {
                key,
                registration,
                message,
            } => write!(
                f,
                "consumer of registration {} failed for key '{}': {}",
                registration, key, message
            ),
            ReactorError::Saturated {
                dispatcher,
                backlog,
            } => write!(
                f,
                "dispatcher '{}' is saturated (backlog {} full)",
                dispatcher, backlog
            ),
            ReactorError::Shutdown { dispatcher } => {
                write!(f, "dispatcher '{}' is not accepting work", dispatcher)
            }
            ReactorError::Codec { message } => write!(f, "codec error: {}", message),
        }
    }
}

impl std::error::Error for ReactorError {}
