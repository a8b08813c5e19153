use std::io::{self, Write};

use crate::decoder::{Consumer, Decoder};
use crate::entry::EntryMeta;
use crate::error::{DecodeError, DecodeErrorKind};
use crate::payload::{Input, Payload};

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("couldn't write listing")]
    Output(#[source] io::Error),
}

/// Prints the path of every record, one per line.
///
/// Records are not checked for completeness beyond having a path, and payloads
/// are skipped without being looked at.
pub struct Lister<W> {
    out: W,
    count: usize,
}

impl<W: Write> Lister<W> {
    pub fn new(out: W) -> Lister<W> {
        Lister { out, count: 0 }
    }

    /// Number of paths printed so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Consumer for Lister<W> {
    type Error = ListError;

    fn consume(
        &mut self,
        meta: EntryMeta,
        payload: Option<Payload<'_>>,
        line: usize,
    ) -> Result<(), ListError> {
        let path = meta
            .path()
            .ok_or_else(|| DecodeError::new(line, DecodeErrorKind::MissingPath))?;
        writeln!(self.out, "{}", path).map_err(ListError::Output)?;
        self.count += 1;

        if let Some(payload) = payload {
            payload.skip()?;
        }
        Ok(())
    }
}

/// Lists `input` into `out`, returning the number of paths printed.
pub fn list<R: Input, W: Write>(input: R, out: W) -> Result<usize, ListError> {
    let mut lister = Lister::new(out);
    Decoder::new(input).decode(&mut lister)?;
    let count = lister.count();
    lister.into_inner().flush().map_err(ListError::Output)?;
    Ok(count)
}
