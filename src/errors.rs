//! Error handling for the threading library.
//!
//! Every public operation returns [`ThreadResult`]. Recoverable failures
//! (bad arguments, unknown ids, forbidden operations, exhausted resources)
//! leave the scheduler untouched. [`SystemError`]s mean an OS primitive the
//! scheduler depends on failed; those are fatal and go through [`fatal`].

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for threading operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Error type for all threading operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    /// A caller-supplied parameter was rejected
    InvalidArgument(ArgumentError),
    /// The thread id is out of range or names an empty slot
    InvalidId(IdError),
    /// The operation is not allowed in the current state
    InvalidOperation(InvalidOperationError),
    /// A bounded resource ran out
    Resource(ResourceError),
    /// An OS primitive failed
    System(SystemError),
}

/// Coarse classification of a [`ThreadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidId,
    InvalidOperation,
    ResourceExhausted,
    SystemFailure,
}

/// Rejected arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentError {
    /// The quantum length must be a positive number of microseconds
    ZeroQuantum,
}

/// Rejected thread ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdError {
    /// The id is not below `MAX_THREAD_NUM`
    OutOfRange(usize),
    /// The slot for this id is empty
    NoSuchThread(usize),
}

/// Operations that are never allowed, or not allowed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOperationError {
    /// The main thread can never be blocked
    BlockMainThread,
    /// The library has not been initialized
    NotInitialized,
    /// The library was already initialized in this process
    AlreadyInitialized,
    /// Called from an OS thread other than the one that initialized the library
    WrongThread,
}

/// Exhausted resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// Every slot of the thread table is taken
    TooManyThreads,
    /// The stack for a new thread could not be allocated
    OutOfMemory,
}

/// Failures of the OS primitives the scheduler is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    /// Installing the preemption signal handler failed
    SignalHandler,
    /// Changing the signal mask failed
    SignalMask,
    /// Arming or disarming the virtual interval timer failed
    Timer,
    /// Dispatch found neither a ready thread nor a running one to keep
    NoRunnableThread,
}

impl ThreadError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThreadError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ThreadError::InvalidId(_) => ErrorKind::InvalidId,
            ThreadError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            ThreadError::Resource(_) => ErrorKind::ResourceExhausted,
            ThreadError::System(_) => ErrorKind::SystemFailure,
        }
    }

    /// Whether the process can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::SystemFailure
    }
}

// Display implementations for user-friendly error messages

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::InvalidArgument(e) => write!(f, "thread library error: {}", e),
            ThreadError::InvalidId(e) => write!(f, "thread library error: {}", e),
            ThreadError::InvalidOperation(e) => write!(f, "thread library error: {}", e),
            ThreadError::Resource(e) => write!(f, "thread library error: {}", e),
            ThreadError::System(e) => write!(f, "system error: {}", e),
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentError::ZeroQuantum => write!(f, "quantum length must be positive"),
        }
    }
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdError::OutOfRange(id) => write!(f, "thread id {} is out of range", id),
            IdError::NoSuchThread(id) => write!(f, "no thread with id {}", id),
        }
    }
}

impl fmt::Display for InvalidOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidOperationError::BlockMainThread => write!(f, "the main thread cannot be blocked"),
            InvalidOperationError::NotInitialized => write!(f, "library is not initialized"),
            InvalidOperationError::AlreadyInitialized => write!(f, "library is already initialized"),
            InvalidOperationError::WrongThread => {
                write!(f, "called from an OS thread that does not own the scheduler")
            }
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::TooManyThreads => write!(f, "maximum number of threads reached"),
            ResourceError::OutOfMemory => write!(f, "out of memory for thread stack"),
        }
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::SignalHandler => write!(f, "failed to install the preemption signal handler"),
            SystemError::SignalMask => write!(f, "failed to change the signal mask"),
            SystemError::Timer => write!(f, "failed to set the virtual interval timer"),
            SystemError::NoRunnableThread => write!(f, "no runnable thread to dispatch"),
        }
    }
}

impl std::error::Error for ThreadError {}

// Conversion implementations for ergonomic error handling

impl From<ArgumentError> for ThreadError {
    fn from(error: ArgumentError) -> Self {
        ThreadError::InvalidArgument(error)
    }
}

impl From<IdError> for ThreadError {
    fn from(error: IdError) -> Self {
        ThreadError::InvalidId(error)
    }
}

impl From<InvalidOperationError> for ThreadError {
    fn from(error: InvalidOperationError) -> Self {
        ThreadError::InvalidOperation(error)
    }
}

impl From<ResourceError> for ThreadError {
    fn from(error: ResourceError) -> Self {
        ThreadError::Resource(error)
    }
}

impl From<SystemError> for ThreadError {
    fn from(error: SystemError) -> Self {
        ThreadError::System(error)
    }
}

/// Report an unrecoverable OS failure and end the process.
///
/// The scheduler cannot guarantee its invariants once signal masking, the
/// handler or the timer stop working, so there is nothing to unwind to.
pub fn fatal(error: SystemError) -> ! {
    let error = ThreadError::System(error);
    if log::log_enabled!(log::Level::Error) {
        log::error!("{}", error);
    } else {
        eprintln!("{}", error);
    }
    std::process::exit(1)
}
