use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use jwalk::{Parallelism, WalkDir};
use ptar_format::{Added, ArchiveHeader, Encoder};

use crate::error::{Error, Result};

struct Archiver<W> {
    encoder: Encoder<W>,
    verbose: bool,
    skipped: usize,
}

impl<W: Write> Archiver<W> {
    /// Reports a problem with one path and carries on. Anything that may have
    /// damaged the archive is returned instead.
    fn recover(&mut self, e: Error) -> Result<()> {
        if let Error::Encode(inner) = &e {
            if inner.is_fatal() {
                return Err(e);
            }
        }
        eprintln!("{}", e.report());
        self.skipped += 1;
        Ok(())
    }

    fn add(&mut self, path: &Path) -> Result<()> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(source) => {
                return self.recover(Error::Metadata {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        match self.encoder.add(path, &meta) {
            Ok(Added::Written) => {
                if self.verbose {
                    eprintln!("{}", path.display());
                }
                Ok(())
            }
            Ok(Added::Skipped) => Ok(()),
            Err(e) => self.recover(e.into()),
        }
    }

    /// Adds `root` and, if it is a directory, everything below it in sorted
    /// pre-order. Symlinks are archived as links, never followed.
    fn add_tree(&mut self, root: &Path) -> Result<()> {
        let is_dir = std::fs::symlink_metadata(root)
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return self.add(root);
        }

        let walk = WalkDir::new(root)
            .skip_hidden(false)
            .sort(true)
            .parallelism(Parallelism::Serial);

        for entry in walk {
            match entry {
                Ok(entry) => self.add(&entry.path())?,
                Err(source) => {
                    let path = source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    self.recover(Error::Walk { path, source })?;
                }
            }
        }
        Ok(())
    }
}

pub fn run(paths: Vec<PathBuf>, paths_from_stdin: bool, unbuffered: bool, verbose: bool) -> Result<()> {
    let stdout = super::stdout_file()?;
    let meta = stdout.metadata().map_err(Error::OpenStdout)?;

    let encoder = Encoder::new(super::output(stdout, unbuffered)).exclude(meta.dev(), meta.ino());
    let mut archiver = Archiver {
        encoder,
        verbose,
        skipped: 0,
    };

    archiver
        .encoder
        .write_header(&ArchiveHeader::new(Utc::now()))?;

    for path in &paths {
        archiver.add_tree(path)?;
    }

    if paths_from_stdin {
        let stdin = io::stdin();
        for line in stdin.lock().split(b'\n') {
            let line = line.map_err(Error::ReadStdin)?;
            if line.is_empty() {
                continue;
            }
            archiver.add_tree(&PathBuf::from(OsString::from_vec(line)))?;
        }
    }

    archiver.encoder.flush()?;

    match archiver.skipped {
        0 => Ok(()),
        n => Err(Error::Skipped(n)),
    }
}
