use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{DecodeError, DecodeErrorKind};

/// Read size used for owned input and output handles.
pub const BLOCK_SIZE: usize = 32768;

/// A buffered archive input, optionally able to skip forward by seeking.
///
/// Only [`BufReader`]s over seekable readers and in-memory cursors position
/// themselves; everything else skips payloads by reading them.
pub trait Input: BufRead {
    /// Returns true if this input looks like it supports positioning.
    fn probe_seek(&mut self) -> bool {
        false
    }

    /// Moves up to `len` bytes forward, taking buffered data into account,
    /// and returns how far it got. Never moves past the end of the input.
    fn seek_forward(&mut self, len: u64) -> io::Result<u64> {
        let _ = len;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "input does not support seeking",
        ))
    }
}

impl<R: Read + Seek> Input for BufReader<R> {
    fn probe_seek(&mut self) -> bool {
        self.stream_position().is_ok()
    }

    fn seek_forward(&mut self, len: u64) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        let skipped = len.min(end.saturating_sub(pos));
        self.seek(SeekFrom::Start(pos + skipped))?;
        Ok(skipped)
    }
}

impl<T: AsRef<[u8]>> Input for Cursor<T> {
    fn probe_seek(&mut self) -> bool {
        true
    }

    fn seek_forward(&mut self, len: u64) -> io::Result<u64> {
        let pos = self.position();
        let end = self.get_ref().as_ref().len() as u64;
        let skipped = len.min(end.saturating_sub(pos));
        self.set_position(pos + skipped);
        Ok(skipped)
    }
}

impl Input for &[u8] {}

impl<I: Input + ?Sized> Input for &mut I {
    fn probe_seek(&mut self) -> bool {
        (**self).probe_seek()
    }

    fn seek_forward(&mut self, len: u64) -> io::Result<u64> {
        (**self).seek_forward(len)
    }
}

/// Where payload bytes go.
pub enum PayloadSink<'s> {
    /// Read and drop the bytes.
    Discard,
    /// Seek past the bytes, reading them if seeking turns out not to work.
    DiscardSeekable,
    /// Copy the bytes into a file being created.
    File(&'s mut dyn Write),
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Input(#[from] DecodeError),

    #[error("couldn't write file contents")]
    Output(#[source] io::Error),
}

/// Errors meaning the input cannot be positioned at all, as opposed to a
/// failing device.
fn is_unseekable(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::Unsupported
        || matches!(e.raw_os_error(), Some(libc::ESPIPE) | Some(libc::EBADF))
}

/// Handle to the payload of the regular file entry being dispatched.
///
/// Exactly [`Payload::len`] bytes follow the contents marker. A consumer moves
/// them with [`Payload::transfer`]; whatever it leaves behind is skipped by
/// the decoder before parsing resumes.
pub struct Payload<'a> {
    pub(crate) input: &'a mut dyn Input,
    pub(crate) remaining: &'a mut u64,
    pub(crate) seekable: &'a mut bool,
    pub(crate) len: u64,
    pub(crate) line: usize,
}

impl<'a> Payload<'a> {
    /// The declared `File Size`.
    #[inline(always)]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Line of the contents marker, for diagnostics.
    #[inline(always)]
    pub fn line(&self) -> usize {
        self.line
    }

    /// The cheapest sink that drops the payload on this input.
    pub fn discard_sink(&self) -> PayloadSink<'static> {
        if *self.seekable {
            PayloadSink::DiscardSeekable
        } else {
            PayloadSink::Discard
        }
    }

    /// Skips the payload.
    pub fn skip(self) -> Result<(), DecodeError> {
        let line = self.line;
        let sink = self.discard_sink();
        self.transfer(sink).map_err(|e| match e {
            TransferError::Input(e) => e,
            TransferError::Output(e) => DecodeError::new(line, DecodeErrorKind::Io(e)),
        })
    }

    /// Moves the remaining payload bytes into `sink`.
    pub fn transfer(self, sink: PayloadSink<'_>) -> Result<(), TransferError> {
        match sink {
            PayloadSink::DiscardSeekable if *self.seekable => {
                match self.input.seek_forward(*self.remaining) {
                    Ok(skipped) => {
                        tracing::trace!(bytes = skipped, "skipped payload by seeking");
                        *self.remaining -= skipped;
                        if *self.remaining > 0 {
                            return Err(truncated(self.len, *self.remaining, self.line).into());
                        }
                        Ok(())
                    }
                    Err(e) if is_unseekable(&e) => {
                        tracing::debug!(error = %e, "input is not seekable, reading payloads instead");
                        *self.seekable = false;
                        read_copy(self.input, self.remaining, self.len, self.line, None)
                    }
                    Err(e) => Err(DecodeError::new(self.line, DecodeErrorKind::Io(e)).into()),
                }
            }
            PayloadSink::DiscardSeekable | PayloadSink::Discard => {
                read_copy(self.input, self.remaining, self.len, self.line, None)
            }
            PayloadSink::File(out) => {
                read_copy(self.input, self.remaining, self.len, self.line, Some(out))
            }
        }
    }
}

fn truncated(expected: u64, remaining: u64, line: usize) -> DecodeError {
    DecodeError::new(line, DecodeErrorKind::TruncatedContents { expected, remaining })
}

fn read_copy(
    input: &mut dyn Input,
    remaining: &mut u64,
    len: u64,
    line: usize,
    mut out: Option<&mut dyn Write>,
) -> Result<(), TransferError> {
    while *remaining > 0 {
        let buf = match input.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecodeError::new(line, DecodeErrorKind::Io(e)).into()),
        };

        if buf.is_empty() {
            return Err(truncated(len, *remaining, line).into());
        }

        let n = buf.len().min(usize::try_from(*remaining).unwrap_or(usize::MAX));
        if let Some(out) = out.as_mut() {
            out.write_all(&buf[..n]).map_err(TransferError::Output)?;
        }
        input.consume(n);
        *remaining -= n as u64;
        tracing::trace!(bytes = n, remaining = *remaining, "payload chunk");
    }
    Ok(())
}
