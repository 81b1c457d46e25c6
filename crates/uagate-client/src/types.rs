// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core value types shared by every manager component.
//!
//! - **ServerAddress**: normalized endpoint URL, the unit of session identity
//! - **NodeId / ExpandedNodeId**: node identifiers, plain or namespace-URI qualified
//! - **NamespaceTable**: per-session namespace URI table used for resolution
//! - **EndpointDescriptor**: cached discovery result
//! - **StatusCode, Variant, DataValue**: values flowing out of the stack
//!
//! # Examples
//!
//! ```
//! use uagate_client::types::{ExpandedNodeId, NamespaceTable, NodeId};
//!
//! let table = NamespaceTable::new(vec![
//!     "http://opcfoundation.org/UA/".to_string(),
//!     "urn:plant1:machines".to_string(),
//! ]);
//!
//! let expanded: ExpandedNodeId = "nsu=urn:plant1:machines;s=Temperature".parse().unwrap();
//! assert_eq!(table.resolve(&expanded).unwrap(), NodeId::string(1, "Temperature"));
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

// =============================================================================
// ServerAddress
// =============================================================================

/// Normalized server endpoint URL.
///
/// Whitespace and trailing slashes are stripped and the scheme is
/// lower-cased, so `opc.tcp://plant1:4840/` and `OPC.TCP://plant1:4840`
/// address the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerAddress(String);

impl ServerAddress {
    /// Creates a normalized address.
    pub fn new(url: impl AsRef<str>) -> Self {
        let trimmed = url.as_ref().trim().trim_end_matches('/');
        let normalized = match trimmed.find("://") {
            Some(idx) => format!("{}{}", trimmed[..idx].to_lowercase(), &trimmed[idx..]),
            None => trimmed.to_string(),
        };
        Self(normalized)
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the address is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServerAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// NodeId
// =============================================================================

/// Node identifier within one server namespace table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Formats the node ID as `ns=2;s=Name`, omitting `ns=` for namespace 0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = ClientError;

    /// Parses `ns=2;i=1001`, `ns=2;s=Name`, `ns=2;g=<uuid>`, `ns=2;b=<base64>`
    /// and the namespace-0 short forms `i=85`, `s=Name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, ident) = rest.split_once(';').ok_or_else(|| {
                    ClientError::invalid_node_id(s, "missing identifier after namespace")
                })?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| ClientError::invalid_node_id(s, "invalid namespace index"))?;
                (ns, ident)
            }
            None => (0, s),
        };

        let identifier = NodeIdentifier::parse(identifier_part)
            .map_err(|reason| ClientError::invalid_node_id(s, reason))?;

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The four node identifier flavours.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque byte-string identifier.
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    fn parse(part: &str) -> Result<Self, String> {
        if let Some(id) = part.strip_prefix("i=") {
            id.parse()
                .map(Self::Numeric)
                .map_err(|_| "invalid numeric identifier".to_string())
        } else if let Some(id) = part.strip_prefix("s=") {
            Ok(Self::String(id.to_string()))
        } else if let Some(id) = part.strip_prefix("g=") {
            Uuid::parse_str(id)
                .map(Self::Guid)
                .map_err(|e| format!("invalid GUID: {}", e))
        } else if let Some(id) = part.strip_prefix("b=") {
            BASE64
                .decode(id)
                .map(Self::Opaque)
                .map_err(|e| format!("invalid base64: {}", e))
        } else {
            Err("unknown identifier type, expected i=, s=, g= or b=".to_string())
        }
    }

    fn has_known_prefix(part: &str) -> bool {
        ["i=", "s=", "g=", "b="].iter().any(|p| part.starts_with(p))
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// ExpandedNodeId
// =============================================================================

/// A node reference as supplied by callers.
///
/// Either namespace-URI qualified (`nsu=<uri>;s=Name`), which must be
/// resolved against a session's namespace table, or a plain [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedNodeId {
    /// Namespace URI, when qualified with `nsu=`.
    pub namespace_uri: Option<String>,
    /// Node ID; its namespace index is only meaningful when no URI is set.
    pub node_id: NodeId,
}

/// Marker prefix for namespace-URI qualified identifiers.
pub const NAMESPACE_URI_MARKER: &str = "nsu=";

impl ExpandedNodeId {
    /// Wraps a plain node ID.
    pub fn from_node_id(node_id: NodeId) -> Self {
        Self {
            namespace_uri: None,
            node_id,
        }
    }

    /// Creates a URI-qualified reference.
    pub fn with_uri(namespace_uri: impl Into<String>, identifier: NodeIdentifier) -> Self {
        Self {
            namespace_uri: Some(namespace_uri.into()),
            node_id: NodeId {
                namespace_index: 0,
                identifier,
            },
        }
    }

    /// Returns `true` if this reference carries a namespace URI.
    pub fn is_namespace_qualified(&self) -> bool {
        self.namespace_uri.is_some()
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace_uri {
            Some(uri) => write!(f, "{}{};{}", NAMESPACE_URI_MARKER, uri, self.node_id.identifier),
            None => write!(f, "{}", self.node_id),
        }
    }
}

impl FromStr for ExpandedNodeId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(rest) = s.strip_prefix(NAMESPACE_URI_MARKER) else {
            return s.parse().map(Self::from_node_id);
        };

        // URIs may themselves contain ';', so split at the first separator
        // that is followed by an identifier prefix.
        let split = rest
            .match_indices(';')
            .map(|(idx, _)| idx)
            .find(|idx| NodeIdentifier::has_known_prefix(&rest[idx + 1..]))
            .ok_or_else(|| ClientError::invalid_node_id(s, "missing identifier after namespace URI"))?;

        let uri = &rest[..split];
        if uri.is_empty() {
            return Err(ClientError::invalid_node_id(s, "empty namespace URI"));
        }

        let identifier = NodeIdentifier::parse(&rest[split + 1..])
            .map_err(|reason| ClientError::invalid_node_id(s, reason))?;

        Ok(Self::with_uri(uri, identifier))
    }
}

// =============================================================================
// NamespaceTable
// =============================================================================

/// A server's namespace URI table, indexed by namespace index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl NamespaceTable {
    /// Creates a table from URIs in index order.
    pub fn new(uris: Vec<String>) -> Self {
        Self { uris }
    }

    /// Returns the index of a URI.
    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uris
            .iter()
            .position(|u| u == uri)
            .and_then(|idx| u16::try_from(idx).ok())
    }

    /// Returns the URI at an index.
    pub fn uri(&self, index: u16) -> Option<&str> {
        self.uris.get(index as usize).map(String::as_str)
    }

    /// Number of namespaces.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Resolves a reference to a node ID valid for this server.
    pub fn resolve(&self, expanded: &ExpandedNodeId) -> ClientResult<NodeId> {
        match &expanded.namespace_uri {
            Some(uri) => {
                let namespace_index = self.index_of(uri).ok_or_else(|| {
                    ClientError::invalid_node_id(expanded, format!("namespace '{}' not in server table", uri))
                })?;
                Ok(NodeId {
                    namespace_index,
                    identifier: expanded.node_id.identifier.clone(),
                })
            }
            None => Ok(expanded.node_id.clone()),
        }
    }

    /// Expands a node ID into its URI-qualified form, if the index is known.
    pub fn expand(&self, node_id: &NodeId) -> Option<ExpandedNodeId> {
        self.uri(node_id.namespace_index)
            .map(|uri| ExpandedNodeId::with_uri(uri, node_id.identifier.clone()))
    }
}

// =============================================================================
// QualifiedName
// =============================================================================

/// A browse name qualified by namespace index, parsed from `2:Name` or `Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// Name text.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl FromStr for QualifiedName {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ClientError::configuration("browse path", "empty qualified name"));
        }
        match s.split_once(':') {
            Some((ns, name)) if !ns.is_empty() && ns.chars().all(|c| c.is_ascii_digit()) => {
                let namespace_index = ns.parse().map_err(|_| {
                    ClientError::configuration("browse path", format!("invalid namespace in '{}'", s))
                })?;
                Ok(Self::new(namespace_index, name))
            }
            _ => Ok(Self::new(0, s)),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

// =============================================================================
// AttributeId
// =============================================================================

/// Node attribute identifiers used by monitored items and select clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// NodeId attribute.
    NodeId,
    /// BrowseName attribute.
    BrowseName,
    /// DisplayName attribute.
    DisplayName,
    /// EventNotifier attribute, target of event items.
    EventNotifier,
    /// Value attribute, target of data-change items.
    #[default]
    Value,
}

impl AttributeId {
    /// Returns the numeric attribute ID.
    pub const fn as_u32(&self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::EventNotifier => 12,
            Self::Value => 13,
        }
    }

    /// Looks up an attribute by numeric ID.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::NodeId),
            3 => Some(Self::BrowseName),
            4 => Some(Self::DisplayName),
            12 => Some(Self::EventNotifier),
            13 => Some(Self::Value),
            _ => None,
        }
    }
}

impl FromStr for AttributeId {
    type Err = ClientError;

    /// Accepts attribute names (`Value`, `EventNotifier`, ...) or numeric IDs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Self::from_u32(n)
                .ok_or_else(|| ClientError::configuration("attribute id", format!("unsupported attribute {}", n)));
        }
        match s.to_ascii_lowercase().as_str() {
            "nodeid" | "node_id" => Ok(Self::NodeId),
            "browsename" | "browse_name" => Ok(Self::BrowseName),
            "displayname" | "display_name" => Ok(Self::DisplayName),
            "eventnotifier" | "event_notifier" => Ok(Self::EventNotifier),
            "value" => Ok(Self::Value),
            _ => Err(ClientError::configuration(
                "attribute id",
                format!("unknown attribute '{}'", s),
            )),
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// Protocol status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: Self = Self(0);
    /// BadUnexpectedError.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// BadSessionIdInvalid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// BadSubscriptionIdInvalid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: Self = Self(0x8028_0000);
    /// BadNodeIdInvalid.
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// BadNotConnected.
    pub const BAD_NOT_CONNECTED: Self = Self(0x808A_0000);
    /// BadConnectionClosed.
    pub const BAD_CONNECTION_CLOSED: Self = Self(0x80AE_0000);
    /// BadFilterOperatorUnsupported.
    pub const BAD_FILTER_OPERATOR_UNSUPPORTED: Self = Self(0x80C2_0000);

    /// Returns `true` for good status codes.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` for bad status codes.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name of well-known codes.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::GOOD => "Good",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_SUBSCRIPTION_ID_INVALID => "BadSubscriptionIdInvalid",
            Self::BAD_NODE_ID_INVALID => "BadNodeIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_CONNECTION_CLOSED => "BadConnectionClosed",
            Self::BAD_FILTER_OPERATOR_UNSUPPORTED => "BadFilterOperatorUnsupported",
            s if s.is_good() => "Good",
            s if s.is_bad() => "Bad",
            _ => "Uncertain",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

// =============================================================================
// Security
// =============================================================================

/// Message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No security.
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    #[default]
    SignAndEncrypt,
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Sign => f.write_str("Sign"),
            Self::SignAndEncrypt => f.write_str("SignAndEncrypt"),
        }
    }
}

/// Result of endpoint discovery for one server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Address the descriptor was resolved for.
    pub address: ServerAddress,
    /// Endpoint URL reported by the server.
    pub endpoint_url: String,
    /// Chosen security policy URI.
    pub security_policy_uri: String,
    /// Chosen message security mode.
    pub security_mode: SecurityMode,
    /// Server-assigned security level of the endpoint.
    pub security_level: u8,
    /// Server certificate (DER), if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_certificate: Option<Vec<u8>>,
}

// =============================================================================
// MonitoredItemKind
// =============================================================================

/// The notification flavour of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredItemKind {
    /// Value changes on the Value attribute.
    #[default]
    DataChange,
    /// Events on the EventNotifier attribute.
    Event,
}

impl MonitoredItemKind {
    /// Returns the attribute monitored for this kind.
    pub fn attribute(&self) -> AttributeId {
        match self {
            Self::DataChange => AttributeId::Value,
            Self::Event => AttributeId::EventNotifier,
        }
    }

    /// Returns `true` for event items.
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Event)
    }
}

impl fmt::Display for MonitoredItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataChange => f.write_str("DataChange"),
            Self::Event => f.write_str("Event"),
        }
    }
}

// =============================================================================
// Variant / DataValue
// =============================================================================

/// A value read from or reported by a server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Boolean(bool),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String.
    String(String),
    /// Timestamp.
    DateTime(DateTime<Utc>),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Array of values.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns `true` for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as f64 if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::ByteString(v) => write!(f, "{}", BASE64.encode(v)),
            Self::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A value with status and timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataValue {
    /// The value.
    pub value: Variant,
    /// Status of the value.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
    /// `true` for heartbeat notifications that did not come from the server.
    #[serde(default)]
    pub synthetic: bool,
}

impl DataValue {
    /// Creates a good value stamped now.
    pub fn new(value: Variant) -> Self {
        let now = Utc::now();
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
            synthetic: false,
        }
    }

    /// Marks the value as synthetic.
    pub fn into_synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
