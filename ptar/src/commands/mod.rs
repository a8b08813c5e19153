pub mod create;
pub mod extract;
pub mod list;

pub use create::run as create;
pub use extract::run as extract;
pub use list::run as list;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::os::fd::AsFd;

use ptar_format::BLOCK_SIZE;

use crate::error::{Error, Result};

/// Standard input as a file, so that a redirected archive can be skipped
/// through by seeking.
fn stdin_file() -> Result<BufReader<File>> {
    let fd = io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .map_err(Error::OpenStdin)?;
    Ok(BufReader::with_capacity(BLOCK_SIZE, File::from(fd)))
}

fn stdout_file() -> Result<File> {
    let fd = io::stdout()
        .as_fd()
        .try_clone_to_owned()
        .map_err(Error::OpenStdout)?;
    Ok(File::from(fd))
}

fn output(stdout: File, unbuffered: bool) -> Box<dyn Write> {
    if unbuffered {
        Box::new(stdout)
    } else {
        Box::new(BufWriter::with_capacity(BLOCK_SIZE, stdout))
    }
}
