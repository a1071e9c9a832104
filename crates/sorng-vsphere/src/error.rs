//! Error types for the vSphere client crate.

use std::collections::BTreeMap;
use std::fmt;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VsphereErrorKind {
    /// Network, DNS, TLS or HTTP-level failure; the caller may retry
    TransportFailure,
    /// The server answered with a structured SOAP fault
    RemoteFault,
    /// Operation name not defined by the service
    UnknownOperation,
    /// Managed-object type name not registered in the type catalog
    UnknownType,
    /// Property not declared for the entity's type
    UnknownProperty,
    /// A search found no matching entity
    NotFound,
    /// A server-side task finished in the `error` state
    RemoteOperationFailed,
    /// A task poll exceeded its caller-supplied bound
    Timeout,
    /// The caller cancelled the call or wait
    Cancelled,
    /// No session, expired session or rejected credentials
    AuthenticationError,
    /// Caller passed an argument the client refuses to act on
    InvalidArgument,
    /// Malformed XML or an unexpected response shape
    ParseError,
    /// Configuration could not be loaded or is incomplete
    ConfigError,
}

/// A SOAP fault as returned by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoapFault {
    /// `faultcode` (e.g. `ServerFaultCode`)
    pub code: String,
    /// `faultstring`
    pub message: String,
    /// Type of the first `detail` child (e.g. `InvalidLogin`), if any
    pub fault_type: Option<String>,
    /// Leaf fields of the detail object
    pub fields: BTreeMap<String, String>,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone)]
pub struct VsphereError {
    pub kind: VsphereErrorKind,
    pub message: String,
    pub fault: Option<SoapFault>,
}

impl VsphereError {
    pub fn new(kind: VsphereErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into(), fault: None }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::TransportFailure, msg)
    }

    /// Build a remote-fault error from a decoded SOAP fault.
    pub fn remote_fault(fault: SoapFault) -> Self {
        let message = match fault.fault_type {
            Some(ref t) => format!("{t}: {}", fault.message),
            None => fault.message.clone(),
        };
        Self {
            kind: VsphereErrorKind::RemoteFault,
            message,
            fault: Some(fault),
        }
    }

    pub fn unknown_type(type_name: &str) -> Self {
        Self::new(
            VsphereErrorKind::UnknownType,
            format!("Managed object type '{type_name}' is not registered"),
        )
    }

    pub fn unknown_property(type_name: &str, property: &str) -> Self {
        Self::new(
            VsphereErrorKind::UnknownProperty,
            format!("'{type_name}' has no declared property '{property}'"),
        )
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::NotFound, msg)
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::RemoteOperationFailed, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Timeout, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Cancelled, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::AuthenticationError, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::InvalidArgument, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::ParseError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::ConfigError, msg)
    }

    /// Attach the server fault that caused this error.
    pub fn with_fault(mut self, fault: SoapFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Only transport failures are worth retrying; everything else is either
    /// a definitive server answer or a programming error.
    pub fn is_retryable(&self) -> bool {
        self.kind == VsphereErrorKind::TransportFailure
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == VsphereErrorKind::NotFound
    }
}

impl fmt::Display for VsphereError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for VsphereError {}

impl From<VsphereError> for String {
    fn from(e: VsphereError) -> String {
        e.to_string()
    }
}

impl From<reqwest::Error> for VsphereError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::transport(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::transport(format!("Connection failed: {e}"))
        } else {
            Self::transport(format!("HTTP error: {e}"))
        }
    }
}

impl From<quick_xml::Error> for VsphereError {
    fn from(e: quick_xml::Error) -> Self {
        Self::parse(format!("XML error: {e}"))
    }
}

impl From<quick_xml::events::attributes::AttrError> for VsphereError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::parse(format!("XML attribute error: {e}"))
    }
}

impl From<serde_yaml::Error> for VsphereError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::config(format!("YAML error: {e}"))
    }
}

impl From<std::io::Error> for VsphereError {
    fn from(e: std::io::Error) -> Self {
        Self::config(format!("I/O error: {e}"))
    }
}

/// Convenience alias.
pub type VsphereResult<T> = Result<T, VsphereError>;
