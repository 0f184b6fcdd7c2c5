use thiserror::Error;

/// Errors raised while declaring records in a [`TypeTable`](crate::types::TypeTable).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefineError {
    #[error("{ty} is not a record type")]
    NotARecord { ty: String },
    #[error("fields of {ty} are already set")]
    FieldsAlreadySet { ty: String },
    #[error("duplicate member {name} in {ty}")]
    DuplicateMember { ty: String, name: String },
    #[error("embedded field {field} in {ty} must be a record, a reference to a record or an interface")]
    InvalidEmbedding { ty: String, field: String },
    #[error("invalid recursive type {ty}: it contains itself by value")]
    RecursiveValue { ty: String },
}

/// Errors raised by typed field access on a [`RecordValue`](crate::value::RecordValue).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("{record} has no field {field}")]
    UnknownField { record: String, field: String },
    #[error("cannot assign {found} to field {field} of type {expected}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    #[error("{ty} is not a record type")]
    NotARecord { ty: String },
}

/// Construction errors. No partial tree is ever returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("expected a reference to a record, found {found}")]
    NonRecordRoot { found: String },
    #[error("expected a non-nil reference to a record, found a nil {ty}")]
    NilRoot { ty: String },
}

/// Failure reported by a [`Resolver`](crate::call::Resolver).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ResolveError {
    pub message: String,
}

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Call-time errors. Each one is terminal for that call and leaves the
/// instance untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// A composed reference on the way to the receiver is nil.
    #[error("{ty} is nil")]
    MissingComponent { ty: String },
    #[error("can't call {method}. Argument \"{ty}\": {source}")]
    UnresolvableArgument {
        method: String,
        ty: String,
        #[source]
        source: ResolveError,
    },
    #[error("can't call {method}. Argument \"{ty}\": resolver produced {found}")]
    ArgumentMismatch {
        method: String,
        ty: String,
        found: String,
    },
    #[error("method #{index} is not cataloged by a tree of {root}")]
    UnknownMethod { index: usize, root: String },
    #[error("instance of {found} is not compatible with {expected}")]
    IncompatibleInstance { expected: String, found: String },
    #[error("{method} returned {found} results, its signature declares {expected}")]
    ResultArity {
        method: String,
        expected: usize,
        found: usize,
    },
}
