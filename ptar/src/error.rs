use std::path::PathBuf;

use miette::Diagnostic;
use ptar_format::{DecodeError, DecodeErrorKind, EncodeError, ExtractError, ListError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    /// Reported against standard input, like a compiler diagnostic.
    #[error("stdin:{line}")]
    Decode {
        line: usize,
        #[source]
        source: DecodeErrorKind,
    },

    #[error(transparent)]
    Extract(ExtractError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Cannot walk directory `{}`", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: jwalk::Error,
    },

    #[error("Cannot read metadata of `{}`", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't open standard input")]
    OpenStdin(#[source] std::io::Error),

    #[error("couldn't read paths from standard input")]
    ReadStdin(#[source] std::io::Error),

    #[error("couldn't open standard output")]
    OpenStdout(#[source] std::io::Error),

    #[error("couldn't write to standard output")]
    WriteStdout(#[source] std::io::Error),

    #[error("{0} path(s) could not be archived")]
    Skipped(usize),
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode {
            line: e.line(),
            source: e.into_kind(),
        }
    }
}

impl From<ListError> for Error {
    fn from(e: ListError) -> Self {
        match e {
            ListError::Decode(e) => e.into(),
            ListError::Output(e) => Error::WriteStdout(e),
        }
    }
}

impl From<ExtractError> for Error {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::Decode(e) => e.into(),
            e => Error::Extract(e),
        }
    }
}

impl Error {
    /// The message followed by every underlying cause, on one line.
    pub fn report(self) -> String {
        let prefix = match self {
            Error::Decode { .. } => "",
            _ => "error: ",
        };
        let report = miette::Report::new(self);
        let chain: Vec<String> = report.chain().map(|e| e.to_string()).collect();
        format!("{}{}", prefix, chain.join(": "))
    }
}
