//! Canonical record for one parsed command.

use std::fmt;

use rosc::OscType;

/// Typed command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Base-10 integer.
    Int(i32),
    /// Decimal number that is not an integer.
    Float(f32),
    /// Anything else, verbatim.
    Text(String),
}

impl Argument {
    /// Converts a bus-protocol value, skipping types with no textual meaning
    /// such as blobs or time tags.
    #[must_use]
    pub fn from_osc(value: &OscType) -> Option<Self> {
        match value {
            OscType::Int(value) => Some(Self::Int(*value)),
            OscType::Float(value) => Some(Self::Float(*value)),
            OscType::String(value) => Some(Self::Text(value.clone())),
            OscType::Long(value) => Some(Self::Text(value.to_string())),
            OscType::Double(value) => Some(Self::Text(value.to_string())),
            OscType::Bool(value) => Some(Self::Text(value.to_string())),
            OscType::Char(value) => Some(Self::Text(value.to_string())),
            _ => None,
        }
    }

    /// Bus-protocol representation of the argument.
    #[must_use]
    pub fn to_osc(&self) -> OscType {
        match self {
            Self::Int(value) => OscType::Int(*value),
            Self::Float(value) => OscType::Float(*value),
            Self::Text(value) => OscType::String(value.clone()),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// One parsed command, independent of the wire protocol it arrived on.
///
/// Values are built by an adapter's recogniser and may pass once through
/// [`configure`](crate::ProtocolAdapter::configure). They are not mutated
/// afterwards; refinement produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolData {
    protocol_id: String,
    target: String,
    operation: String,
    arguments: Vec<Argument>,
    configured: bool,
}

impl ProtocolData {
    /// Builds an unrefined command. The protocol tag is lower-cased.
    pub fn new(
        protocol_id: impl AsRef<str>,
        target: impl Into<String>,
        operation: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Self {
        Self {
            protocol_id: protocol_id.as_ref().to_ascii_lowercase(),
            target: target.into(),
            operation: operation.into(),
            arguments,
            configured: false,
        }
    }

    /// Lower-cased tag of the adapter that owns this command.
    #[must_use]
    pub fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    /// Adapter-specific destination, such as `host:port` or a device name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Command name or address path.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Ordered typed arguments.
    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Whether the owning adapter has already refined this value.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Space-joined rendering of the arguments.
    #[must_use]
    pub fn rendered_arguments(&self) -> String {
        self.arguments
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Operation followed by its rendered arguments, as sent to line-oriented
    /// peers.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.arguments.is_empty() {
            self.operation.clone()
        } else {
            format!("{} {}", self.operation, self.rendered_arguments())
        }
    }

    /// Returns the refined form of this command.
    #[must_use]
    pub fn into_configured(
        self,
        target: String,
        operation: String,
        arguments: Vec<Argument>,
    ) -> Self {
        Self {
            protocol_id: self.protocol_id,
            target,
            operation,
            arguments,
            configured: true,
        }
    }
}

impl fmt::Display for ProtocolData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.protocol_id, self.target, self.command_line())
    }
}
