use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::decoder::{Consumer, Decoder};
use crate::entry::{Entry, EntryKind, EntryMeta};
use crate::error::DecodeError;
use crate::fs::{self, DeviceKind};
use crate::payload::{Input, Payload, PayloadSink, TransferError, BLOCK_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Removing existing file failed. Path: '{}'", .1.display())]
    RemoveFailed(#[source] std::io::Error, PathBuf),

    #[error("Creating directory failed. Path: '{}'", .1.display())]
    CreateDirFailed(#[source] std::io::Error, PathBuf),

    #[error("Creating file failed. Path: '{}'", .1.display())]
    CreateFileFailed(#[source] std::io::Error, PathBuf),

    #[error("Writing file failed. Path: '{}'", .1.display())]
    WriteFailed(#[source] std::io::Error, PathBuf),

    #[error("Creating link failed. Path: '{}' -> '{}'", .1.display(), .2)]
    CreateLinkFailed(#[source] std::io::Error, PathBuf, String),

    #[error("Creating special file failed. Path: '{}'", .1.display())]
    CreateNodeFailed(#[source] std::io::Error, PathBuf),

    #[error("Setting permissions failed. Path: '{}'", .1.display())]
    SetPermissionsFailed(#[source] std::io::Error, PathBuf),

    #[error("Setting modification time failed. Path: '{}'", .1.display())]
    SetTimeFailed(#[source] std::io::Error, PathBuf),

    #[error("Setting owner and group failed. Path: '{}'", .1.display())]
    SetOwnerFailed(#[source] std::io::Error, PathBuf),
}

/// Statistics from extracting an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Number of regular files written.
    pub files_extracted: u64,
    /// Number of directories created or reused.
    pub dirs_created: u64,
    /// Number of symlinks created.
    pub links_created: u64,
    /// Number of devices, FIFOs and sockets created.
    pub nodes_created: u64,
    /// Total payload bytes written to disk.
    pub bytes_written: u64,
}

/// Recreates every entry of an archive below a root directory.
///
/// Each entry must be complete. For every entry the extractor removes what
/// is in the way (directories excepted), creates the object, then sets its
/// permissions (symlinks excepted), modification time and numeric owner.
/// The first failure stops extraction; whatever was already created stays.
pub struct Extractor<'a> {
    root: PathBuf,
    stats: ExtractStats,
    directories: Vec<(PathBuf, i64)>,
    on_entry: Option<Box<dyn FnMut(&Entry) + 'a>>,
}

impl<'a> Extractor<'a> {
    /// Relative archive paths are resolved against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Extractor<'a> {
        Extractor {
            root: root.into(),
            stats: ExtractStats::default(),
            directories: vec![],
            on_entry: None,
        }
    }

    /// Calls `f` with each complete entry before it is created.
    pub fn on_entry(mut self, f: impl FnMut(&Entry) + 'a) -> Extractor<'a> {
        self.on_entry = Some(Box::new(f));
        self
    }

    pub fn stats(&self) -> &ExtractStats {
        &self.stats
    }

    /// Restores the modification times of extracted directories, which the
    /// creation of their children has changed, and returns the statistics.
    pub fn finish(self) -> Result<ExtractStats, ExtractError> {
        for (path, mtime) in self.directories.iter().rev() {
            fs::set_mod_time(path, *mtime)
                .map_err(|e| ExtractError::SetTimeFailed(e, path.clone()))?;
        }
        Ok(self.stats)
    }

    fn create(&mut self, entry: &Entry, path: &Path, payload: Option<Payload<'_>>) -> Result<(), ExtractError> {
        match &entry.kind {
            EntryKind::RegularFile { .. } => {
                let file = fs::create_file(path, entry.mode)
                    .map_err(|e| ExtractError::CreateFileFailed(e, path.to_path_buf()))?;
                let mut out = BufWriter::with_capacity(BLOCK_SIZE, file);
                if let Some(payload) = payload {
                    let len = payload.len();
                    payload
                        .transfer(PayloadSink::File(&mut out))
                        .map_err(|e| match e {
                            TransferError::Input(e) => ExtractError::Decode(e),
                            TransferError::Output(e) => ExtractError::WriteFailed(e, path.to_path_buf()),
                        })?;
                    self.stats.bytes_written += len;
                }
                out.flush()
                    .map_err(|e| ExtractError::WriteFailed(e, path.to_path_buf()))?;
                self.stats.files_extracted += 1;
            }
            EntryKind::Directory => {
                fs::create_directory(path, entry.mode)
                    .map_err(|e| ExtractError::CreateDirFailed(e, path.to_path_buf()))?;
                self.directories.push((path.to_path_buf(), entry.mtime));
                self.stats.dirs_created += 1;
            }
            EntryKind::SymbolicLink { target } => {
                fs::create_symlink(target, path).map_err(|e| {
                    ExtractError::CreateLinkFailed(e, path.to_path_buf(), target.clone())
                })?;
                self.stats.links_created += 1;
            }
            EntryKind::CharacterDevice { major, minor } => {
                fs::create_device(path, DeviceKind::Character, entry.mode, *major, *minor)
                    .map_err(|e| ExtractError::CreateNodeFailed(e, path.to_path_buf()))?;
                self.stats.nodes_created += 1;
            }
            EntryKind::BlockDevice { major, minor } => {
                fs::create_device(path, DeviceKind::Block, entry.mode, *major, *minor)
                    .map_err(|e| ExtractError::CreateNodeFailed(e, path.to_path_buf()))?;
                self.stats.nodes_created += 1;
            }
            EntryKind::Fifo => {
                fs::create_fifo(path, entry.mode)
                    .map_err(|e| ExtractError::CreateNodeFailed(e, path.to_path_buf()))?;
                self.stats.nodes_created += 1;
            }
            EntryKind::Socket => {
                fs::create_socket_node(path, entry.mode)
                    .map_err(|e| ExtractError::CreateNodeFailed(e, path.to_path_buf()))?;
                self.stats.nodes_created += 1;
            }
        }
        Ok(())
    }
}

impl Consumer for Extractor<'_> {
    type Error = ExtractError;

    fn consume(
        &mut self,
        meta: EntryMeta,
        payload: Option<Payload<'_>>,
        line: usize,
    ) -> Result<(), ExtractError> {
        let entry = meta
            .complete()
            .map_err(|kind| DecodeError::new(line, kind))?;

        if let Some(f) = self.on_entry.as_mut() {
            f(&entry);
        }

        let path = self.root.join(entry.path());
        tracing::debug!(path = %path.display(), ty = %entry.entry_type(), "extracting");

        if !matches!(entry.kind, EntryKind::Directory) {
            fs::remove(&path).map_err(|e| ExtractError::RemoveFailed(e, path.clone()))?;
        }

        self.create(&entry, &path, payload)?;

        if !matches!(entry.kind, EntryKind::SymbolicLink { .. }) {
            // Creation modes are subject to the umask.
            fs::set_permissions(&path, entry.mode)
                .map_err(|e| ExtractError::SetPermissionsFailed(e, path.clone()))?;
        }
        fs::set_mod_time(&path, entry.mtime)
            .map_err(|e| ExtractError::SetTimeFailed(e, path.clone()))?;
        fs::set_owner_group(&path, entry.user.id, entry.group.id)
            .map_err(|e| ExtractError::SetOwnerFailed(e, path.clone()))?;

        Ok(())
    }
}

/// Extracts `input` below `root`.
pub fn extract<R: Input>(input: R, root: &Path) -> Result<ExtractStats, ExtractError> {
    let mut extractor = Extractor::new(root);
    Decoder::new(input).decode(&mut extractor)?;
    extractor.finish()
}
