//! Terminal statuses carried in the last op batch of every call.

use std::fmt;

macro_rules! status_codes {
    ($($variant:ident = $value:expr => $name:literal),* $(,)?) => {
        /// Canonical RPC status codes.
        ///
        /// The table follows the standard numbering so statuses survive a
        /// hop through any conformant transport unchanged.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Code {
            $($variant = $value),*
        }

        impl Code {
            /// Wire name of the code.
            pub fn name(self) -> &'static str {
                match self {
                    $(Code::$variant => $name),*
                }
            }
        }
    };
}

status_codes! {
    Ok = 0 => "OK",
    Cancelled = 1 => "CANCELLED",
    Unknown = 2 => "UNKNOWN",
    InvalidArgument = 3 => "INVALID_ARGUMENT",
    DeadlineExceeded = 4 => "DEADLINE_EXCEEDED",
    NotFound = 5 => "NOT_FOUND",
    AlreadyExists = 6 => "ALREADY_EXISTS",
    PermissionDenied = 7 => "PERMISSION_DENIED",
    ResourceExhausted = 8 => "RESOURCE_EXHAUSTED",
    FailedPrecondition = 9 => "FAILED_PRECONDITION",
    Aborted = 10 => "ABORTED",
    OutOfRange = 11 => "OUT_OF_RANGE",
    Unimplemented = 12 => "UNIMPLEMENTED",
    Internal = 13 => "INTERNAL",
    Unavailable = 14 => "UNAVAILABLE",
    DataLoss = 15 => "DATA_LOSS",
    Unauthenticated = 16 => "UNAUTHENTICATED",
}

impl Code {
    /// Whether this code denotes success.
    pub fn is_ok(self) -> bool {
        matches!(self, Code::Ok)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal status of one RPC: a code plus optional human-readable
/// detail.
///
/// Service handlers may build any status with [`Status::new`]; the core
/// forwards those verbatim. The named constructors below cover the
/// failures the core itself produces: transport cancellation, codec and
/// invariant breakage, the unknown-method rejection, and shutdown.
#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Successful completion.
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
        }
    }

    /// An arbitrary status, as service logic produces them.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The transport or the peer abandoned the call.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, reason)
    }

    /// A broken invariant inside the core or the codec.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(Code::Internal, reason)
    }

    /// Nobody serves the requested method. Deliberately message-free;
    /// the diagnostic body travels as a payload, not as status detail.
    pub fn unimplemented() -> Self {
        Self::new(Code::Unimplemented, "")
    }

    /// The server is going away.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, reason)
    }

    /// The status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Human-readable detail; empty when the status carries none.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is a successful status.
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.code.name())
        } else {
            write!(f, "{}: {}", self.code.name(), self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table_is_standard() {
        assert_eq!(Code::Ok as u8, 0);
        assert_eq!(Code::Cancelled as u8, 1);
        assert_eq!(Code::Unimplemented as u8, 12);
        assert_eq!(Code::Unauthenticated as u8, 16);
        assert_eq!(Code::Unavailable.name(), "UNAVAILABLE");
        assert!(Code::Ok.is_ok());
        assert!(!Code::Internal.is_ok());
    }

    #[test]
    fn test_core_constructors_match_the_failure_taxonomy() {
        assert_eq!(Status::cancelled("peer gone").code(), Code::Cancelled);
        assert_eq!(Status::internal("bad frame").code(), Code::Internal);
        assert_eq!(Status::unavailable("draining").code(), Code::Unavailable);

        let unknown_method = Status::unimplemented();
        assert_eq!(unknown_method.code(), Code::Unimplemented);
        assert!(unknown_method.message().is_empty());
    }

    #[test]
    fn test_arbitrary_service_status_is_carried() {
        let status = Status::new(Code::OutOfRange, "index past end");
        assert!(!status.is_ok());
        assert_eq!(status.code(), Code::OutOfRange);
        assert_eq!(status.message(), "index past end");
    }

    #[test]
    fn test_display_omits_empty_detail() {
        assert_eq!(Status::ok().to_string(), "OK");
        assert_eq!(Status::unimplemented().to_string(), "UNIMPLEMENTED");
        assert_eq!(
            Status::cancelled("peer went away").to_string(),
            "CANCELLED: peer went away"
        );
    }
}
