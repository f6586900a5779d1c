use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Unknown service, booking, or staff id.
    NotFound(Ulid),
    /// Missing or malformed required field, or capacity/mode mismatch.
    Validation(&'static str),
    /// Candidate interval overlaps an existing active booking.
    Conflict(Ulid),
    /// Session block is at capacity.
    CapacityExceeded(u32),
    /// Caller lacks the named permission.
    Permission(&'static str),
    /// Forbidden lifecycle transition.
    InvalidState(&'static str),
    /// Resource-key lock not acquired before the caller's deadline.
    Busy,
    LimitExceeded(&'static str),
    Journal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::CapacityExceeded(cap) => {
                write!(f, "session full: capacity {cap} reached")
            }
            EngineError::Permission(perm) => write!(f, "permission denied: {perm}"),
            EngineError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            EngineError::Busy => write!(f, "resource busy: lock not acquired before deadline"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Journal(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
