/// Errors from the `.proto` text parser.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
}

impl ParseError {
    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Structural failures: the descriptor under construction cannot be used past this point.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("invalid value for option '{option}': {message}")]
    OptionValue { option: String, message: String },

    #[error("error parsing aggregate value for option '{option}': {message}")]
    Aggregate { option: String, message: String },

    #[error("'{operation}' is not valid inside a {scope} scope")]
    InvalidScope {
        operation: &'static str,
        scope: &'static str,
    },

    #[error("cannot close the root scope")]
    PopRoot,

    #[error("options type '{0}' is not defined by the meta-schema")]
    UnknownOptionsType(String),

    #[error("option storage could not be reserialized: {0}")]
    Reserialize(String),
}

/// Errors from the wire-format decoder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated data: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("invalid varint at offset {0}")]
    InvalidVarint(usize),

    #[error("invalid wire type {wire_type} for field {field}")]
    InvalidWireType { field: u32, wire_type: u8 },

    #[error("invalid utf-8 string in field {field}")]
    InvalidUtf8 { field: u32 },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Errors from the wire-format encoder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("value for field {field} does not match its declared type {expected}")]
    TypeMismatch { field: u32, expected: &'static str },
}

/// Top-level error type returned by the multi-file compiler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("duplicate file name '{0}'")]
    DuplicateFile(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("{file}: {source}")]
    Build {
        file: String,
        #[source]
        source: BuildError,
    },

    #[error("descriptor text could not be parsed: {0}")]
    Text(String),
}

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, CompileError>;
