use thiserror::Error;

/// Failures raised by the object serializer, on top of the lower-level
/// value-codec failures it delegates to.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// A field read over the wire.
    #[error(transparent)]
    Wire(#[from] tempest_wire::WireError),
    /// A polymorphic header named a type id the receiving [`crate::TypeMap`]
    /// has no registered factory for.
    #[error("unregistered polymorphic type id {0}")]
    UnknownTypeId(u16),
    /// The same object instance was visited twice while serializing a
    /// single graph (cyclic object graphs are not supported).
    #[error("cyclic object graph detected")]
    UnsupportedGraph,
}

/// Result alias used throughout the object serializer.
pub type SerializeResult<T> = Result<T, SerializeError>;
