use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShardCtlError>;

/// Message fragments that identify a node we cannot reach at all, as opposed
/// to a node that answered with something we could not use.
const UNREACHABLE_SIGNATURES: &[&str] = &[
    "no such host",
    "no route to host",
    "connection refused",
    "invalid instance key",
];

#[derive(Error, Debug)]
pub enum ShardCtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("connection refused by {address}")]
    ConnectionRefused { address: String },

    #[error("no such host: {host}")]
    UnknownHost { host: String },

    #[error("no route to host: {host}")]
    NoRouteToHost { host: String },

    #[error("invalid instance key for {alias}: {key}")]
    InvalidInstanceKey { alias: String, key: String },

    #[error("timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("unable to fetch global view from consensus leader {host}:{port}")]
    UnreachableLeader { host: String, port: u16 },

    #[error("no instance of {shard} returned a consensus local view")]
    NoInstanceResponded { shard: String },

    #[error("consensus group has no online leader")]
    MissingConsensusLeader,

    #[error("no tablet is serving the consensus leader {address}")]
    UnreachablePrimaryTablet { address: String },

    #[error("primary tablet does not match the consensus leader {address}")]
    WrongPrimaryTablet { address: String },

    #[error("{shard} does not have a primary tablet")]
    MissingPrimaryTablet { shard: String },

    #[error("Topology error: {message}")]
    Topology { message: String },

    #[error("Repair failed: {message}")]
    Repair { message: String },

    #[error("unable to parse statement: {message}")]
    SqlParse { message: String },

    #[error("Unknown ReadWriteSeparationStrategy: '{0}'")]
    UnknownStrategy(String),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ShardCtlError>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ShardCtlError {
    /// Wrap this error with a short description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        ShardCtlError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the failure means the node could not be contacted at all.
    ///
    /// Nodes failing with any other error still count as members that
    /// answered badly; only these are excluded from membership reasoning.
    pub fn is_unreachable(&self) -> bool {
        match self {
            ShardCtlError::ConnectionRefused { .. }
            | ShardCtlError::UnknownHost { .. }
            | ShardCtlError::NoRouteToHost { .. }
            | ShardCtlError::InvalidInstanceKey { .. } => true,
            ShardCtlError::Io(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::AddrNotAvailable
                ) =>
            {
                true
            }
            ShardCtlError::Context { source, .. } => source.is_unreachable(),
            other => {
                let message = other.to_string().to_lowercase();
                UNREACHABLE_SIGNATURES.iter().any(|sig| message.contains(sig))
            }
        }
    }
}

impl From<serde_json::Error> for ShardCtlError {
    fn from(e: serde_json::Error) -> Self {
        ShardCtlError::Serialization(e.to_string())
    }
}
