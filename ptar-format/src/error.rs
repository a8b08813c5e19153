use std::fmt;

use crate::entry::Field;

/// A fatal problem found while decoding an archive stream.
#[derive(Debug)]
pub struct DecodeError {
    line: usize,
    kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(line: usize, kind: DecodeErrorKind) -> DecodeError {
        DecodeError { line, kind }
    }

    /// The 1-based input line at which the problem was detected. Problems
    /// found at the end of input report the line after the last one.
    #[inline(always)]
    pub fn line(&self) -> usize {
        self.line
    }

    #[inline(always)]
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> DecodeErrorKind {
        self.kind
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeErrorKind {
    // Grammar
    #[error("metadata line is not valid UTF-8")]
    InvalidEncoding,

    #[error("invalid metadata key-value pair (missing key)")]
    MissingKey,

    #[error("illegal archive metadata key-value pair (missing key)")]
    MissingHeaderKey,

    #[error("empty metadata values are not allowed")]
    EmptyValue,

    #[error("{0} already specified")]
    Duplicate(&'static str),

    #[error("unrecognized metadata key name: {0}")]
    UnknownKey(String),

    #[error("unrecognized archive metadata key: {0}")]
    UnknownHeaderKey(String),

    #[error("unrecognized metadata encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("unrecognized extensions: {0}")]
    UnsupportedExtensions(String),

    #[error("unrecognized file type: {0}")]
    UnknownType(String),

    #[error("invalid {}: {}", .field.name(), .value)]
    InvalidValue { field: Field, value: String },

    // Completeness
    #[error("file contents marker found for non-regular file")]
    MarkerForNonRegularFile,

    #[error("file contents marker found but no file size specified")]
    MarkerWithoutSize,

    #[error("end of regular file metadata reached but no file contents")]
    MissingContents,

    #[error("end-of-file reached before reading file contents")]
    EofBeforeContents,

    #[error("found an entry without a path")]
    MissingPath,

    #[error("incomplete file metadata (missing {})", .0.name())]
    Incomplete(Field),

    // Boundary
    #[error("unexpected metadata (expected end-of-file-contents marker \"---\")")]
    UnexpectedMetadata,

    #[error("unexpected additional file data found (expected end-of-file contents marker \"---\" after {expected} bytes)")]
    TrailingData { expected: u64 },

    #[error("end-of-file reached while reading file contents")]
    EofInContents,

    #[error("end-of-file reached while reading file contents (bad file size?): {remaining} of {expected} bytes missing")]
    TruncatedContents { expected: u64, remaining: u64 },

    #[error("error while reading")]
    Io(#[source] std::io::Error),
}
