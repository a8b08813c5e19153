use std::fmt::Write as _;
use std::fs::{File, Metadata};
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::decoder::CONTENTS_MARKER;
use crate::entry::{Entry, EntryKind, EntryType, Field, Owner, MODE_TYPE_MASK};
use crate::field::trim;
use crate::fs::{self, Identities, SystemIdentities};
use crate::header::ArchiveHeader;
use crate::payload::BLOCK_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Unsupported file type. Path: '{}'", .0.display())]
    UnsupportedType(PathBuf),

    #[error("Path cannot be archived ({1}). Path: '{}'", .0.display())]
    UnrepresentablePath(PathBuf, &'static str),

    #[error("Link target cannot be archived ({1}). Path: '{}'", .0.display())]
    UnrepresentableTarget(PathBuf, &'static str),

    #[error("Looking up owner failed. Path: '{}'", .1.display())]
    LookupFailed(#[source] io::Error, PathBuf),

    #[error("Reading link failed. Path: '{}'", .1.display())]
    ReadLinkFailed(#[source] io::Error, PathBuf),

    #[error("Opening file failed. Path: '{}'", .1.display())]
    OpenFailed(#[source] io::Error, PathBuf),

    #[error("Reading file failed. Path: '{}'", .1.display())]
    ReadFailed(#[source] io::Error, PathBuf),

    #[error("File shrank while being archived ({actual} of {expected} bytes read). Path: '{}'", .path.display())]
    Shrunk {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Writing archive failed")]
    WriteFailed(#[source] io::Error),
}

impl EncodeError {
    /// Fatal errors leave the archive unusable. The others are detected before
    /// anything is written for the entry, so the entry can be left out and
    /// archiving can go on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EncodeError::ReadFailed(..) | EncodeError::Shrunk { .. } | EncodeError::WriteFailed(_)
        )
    }
}

/// What [`Encoder::add`] did with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Added {
    Written,
    Skipped,
}

/// Checks that a path or link target survives being written as a metadata
/// value and read back.
fn representable(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        Err("empty")
    } else if value.contains('\n') {
        Err("contains a newline")
    } else if trim(value) != value {
        Err("leading or trailing whitespace")
    } else {
        Ok(())
    }
}

/// Writes archives.
///
/// The header is written with [`Encoder::write_header`]; each
/// [`Encoder::add`] appends one record.
pub struct Encoder<W, I = SystemIdentities> {
    out: W,
    identities: I,
    excluded: Option<(u64, u64)>,
}

impl<W: Write> Encoder<W, SystemIdentities> {
    pub fn new(out: W) -> Encoder<W, SystemIdentities> {
        Encoder::with_identities(out, SystemIdentities::new())
    }
}

impl<W: Write, I: Identities> Encoder<W, I> {
    pub fn with_identities(out: W, identities: I) -> Encoder<W, I> {
        Encoder {
            out,
            identities,
            excluded: None,
        }
    }

    /// Skips the file with this device and inode number, normally the archive
    /// being written.
    pub fn exclude(mut self, dev: u64, ino: u64) -> Encoder<W, I> {
        self.excluded = Some((dev, ino));
        self
    }

    pub fn write_header(&mut self, header: &ArchiveHeader) -> Result<(), EncodeError> {
        let mut text = String::new();
        for (key, value) in header.lines() {
            let _ = writeln!(text, "{}:\t{}", key, value);
        }
        self.out
            .write_all(text.as_bytes())
            .map_err(EncodeError::WriteFailed)
    }

    /// Describes the filesystem object at `path` (with `meta` from
    /// `symlink_metadata`) and appends its record.
    pub fn add(&mut self, path: &Path, meta: &Metadata) -> Result<Added, EncodeError> {
        if path == Path::new(".") {
            return Ok(Added::Skipped);
        }
        if self.excluded == Some((meta.dev(), meta.ino())) {
            tracing::debug!(path = %path.display(), "skipping the archive itself");
            return Ok(Added::Skipped);
        }

        let entry = self.describe(path, meta)?;
        let mut contents = match entry.kind {
            EntryKind::RegularFile { .. } => Some(
                File::open(path).map_err(|e| EncodeError::OpenFailed(e, path.to_path_buf()))?,
            ),
            _ => None,
        };

        self.write_entry(&entry, contents.as_mut().map(|f| f as &mut dyn Read))?;
        Ok(Added::Written)
    }

    fn describe(&mut self, path: &Path, meta: &Metadata) -> Result<Entry, EncodeError> {
        let ty = fs::entry_type(meta.file_type())
            .ok_or_else(|| EncodeError::UnsupportedType(path.to_path_buf()))?;
        let name = path
            .to_str()
            .ok_or_else(|| EncodeError::UnrepresentablePath(path.to_path_buf(), "not valid UTF-8"))?;
        representable(name).map_err(|why| EncodeError::UnrepresentablePath(path.to_path_buf(), why))?;

        let kind = match ty {
            EntryType::RegularFile => EntryKind::RegularFile { size: meta.len() },
            EntryType::Directory => EntryKind::Directory,
            EntryType::SymbolicLink => {
                let target = std::fs::read_link(path)
                    .map_err(|e| EncodeError::ReadLinkFailed(e, path.to_path_buf()))?;
                let target = target.into_os_string().into_string().map_err(|_| {
                    EncodeError::UnrepresentableTarget(path.to_path_buf(), "not valid UTF-8")
                })?;
                representable(&target)
                    .map_err(|why| EncodeError::UnrepresentableTarget(path.to_path_buf(), why))?;
                EntryKind::SymbolicLink { target }
            }
            EntryType::CharacterDevice => {
                let (major, minor) = fs::device_numbers(meta.rdev());
                EntryKind::CharacterDevice { major, minor }
            }
            EntryType::BlockDevice => {
                let (major, minor) = fs::device_numbers(meta.rdev());
                EntryKind::BlockDevice { major, minor }
            }
            EntryType::Fifo => EntryKind::Fifo,
            EntryType::Socket => EntryKind::Socket,
        };

        let user = Owner {
            name: self
                .identities
                .user_name(meta.uid())
                .map_err(|e| EncodeError::LookupFailed(e, path.to_path_buf()))?,
            id: meta.uid(),
        };
        let group = Owner {
            name: self
                .identities
                .group_name(meta.gid())
                .map_err(|e| EncodeError::LookupFailed(e, path.to_path_buf()))?,
            id: meta.gid(),
        };

        Ok(Entry {
            path: name.to_string(),
            kind,
            user,
            group,
            mode: meta.mode() & !MODE_TYPE_MASK,
            mtime: meta.mtime(),
        })
    }

    /// Appends the record for `entry`. Regular files take their payload from
    /// `contents`: exactly the declared size is copied, so a file that grew is
    /// cut short and one that shrank is an error.
    pub fn write_entry(&mut self, entry: &Entry, contents: Option<&mut dyn Read>) -> Result<(), EncodeError> {
        let mut text = String::from("\n");
        let mut line = |field: Field, value: &dyn std::fmt::Display| {
            let _ = writeln!(text, "{}:\t{}", field.key(), value);
        };

        line(Field::Path, &entry.path);
        line(Field::Type, &entry.entry_type());
        match &entry.kind {
            EntryKind::RegularFile { size } => line(Field::FileSize, size),
            EntryKind::SymbolicLink { target } => line(Field::LinkTarget, target),
            EntryKind::CharacterDevice { major, minor } | EntryKind::BlockDevice { major, minor } => {
                line(Field::Major, major);
                line(Field::Minor, minor);
            }
            EntryKind::Directory | EntryKind::Fifo | EntryKind::Socket => {}
        }
        line(Field::UserName, &entry.user.name);
        line(Field::UserId, &entry.user.id);
        line(Field::GroupName, &entry.group.name);
        line(Field::GroupId, &entry.group.id);
        line(Field::Permissions, &format_args!("{:07o}", entry.mode & !MODE_TYPE_MASK));
        line(Field::ModificationTime, &entry.mtime);

        tracing::debug!(path = %entry.path, ty = %entry.entry_type(), "writing entry");

        let size = match entry.kind {
            EntryKind::RegularFile { size } => size,
            _ => {
                return self
                    .out
                    .write_all(text.as_bytes())
                    .map_err(EncodeError::WriteFailed)
            }
        };

        text.push_str(CONTENTS_MARKER);
        text.push('\n');
        self.out
            .write_all(text.as_bytes())
            .map_err(EncodeError::WriteFailed)?;

        self.copy_contents(entry, size, contents)?;

        self.out
            .write_all(CONTENTS_MARKER.as_bytes())
            .and_then(|_| self.out.write_all(b"\n"))
            .map_err(EncodeError::WriteFailed)
    }

    fn copy_contents(&mut self, entry: &Entry, size: u64, contents: Option<&mut dyn Read>) -> Result<(), EncodeError> {
        let mut remaining = size;
        let shrunk = |remaining: u64| EncodeError::Shrunk {
            path: PathBuf::from(&entry.path),
            expected: size,
            actual: size - remaining,
        };

        let reader = match contents {
            Some(reader) => reader,
            None if size == 0 => return Ok(()),
            None => return Err(shrunk(remaining)),
        };

        let mut buf = vec![0; BLOCK_SIZE];
        while remaining > 0 {
            let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let n = match reader.read(&mut buf[..want]) {
                Ok(0) => return Err(shrunk(remaining)),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EncodeError::ReadFailed(e, PathBuf::from(&entry.path))),
            };
            self.out
                .write_all(&buf[..n])
                .map_err(EncodeError::WriteFailed)?;
            remaining -= n as u64;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), EncodeError> {
        self.out.flush().map_err(EncodeError::WriteFailed)
    }

    /// Flushes and returns the output.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        self.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    struct Fixed;

    impl Identities for Fixed {
        fn user_name(&mut self, uid: u32) -> io::Result<String> {
            Ok(format!("user{}", uid))
        }

        fn group_name(&mut self, gid: u32) -> io::Result<String> {
            Ok(format!("group{}", gid))
        }
    }

    struct Nobody;

    impl Identities for Nobody {
        fn user_name(&mut self, _uid: u32) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such user"))
        }

        fn group_name(&mut self, _gid: u32) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such group"))
        }
    }

    fn entry(path: &str, kind: EntryKind) -> Entry {
        Entry {
            path: path.to_string(),
            kind,
            user: Owner {
                name: "jordan".into(),
                id: 1000,
            },
            group: Owner {
                name: "users".into(),
                id: 100,
            },
            mode: 0o644,
            mtime: 1367000000,
        }
    }

    fn encode(f: impl FnOnce(&mut Encoder<&mut Vec<u8>, Fixed>)) -> String {
        let mut out = vec![];
        let mut encoder = Encoder::with_identities(&mut out, Fixed);
        f(&mut encoder);
        encoder.finish().unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn header() {
        let created = Utc.timestamp_opt(1367403072, 0).unwrap();
        let text = encode(|e| e.write_header(&ArchiveHeader::new(created)).unwrap());
        assert_eq!(
            text,
            "Metadata Encoding:\tutf-8\nArchive Creation Date:\t2013-05-01T10:11:12Z\n"
        );
    }

    #[test]
    fn regular_file_record() {
        let text = encode(|e| {
            let file = entry("dir/hello.txt", EntryKind::RegularFile { size: 5 });
            e.write_entry(&file, Some(&mut &b"hello"[..])).unwrap();
        });
        assert_eq!(
            text,
            "\nPath:\tdir/hello.txt\nType:\tRegular File\nFile Size:\t5\nUser Name:\tjordan\nUser ID:\t1000\nGroup Name:\tusers\nGroup ID:\t100\nPermissions:\t0000644\nModification Time:\t1367000000\n---\nhello---\n"
        );
    }

    #[test]
    fn device_and_link_records() {
        let text = encode(|e| {
            let dev = entry("null", EntryKind::CharacterDevice { major: 1, minor: 3 });
            e.write_entry(&dev, None).unwrap();
        });
        assert!(text.contains("Type:\tCharacter Device\nMajor:\t1\nMinor:\t3\nUser Name:"));

        let text = encode(|e| {
            let link = entry(
                "link",
                EntryKind::SymbolicLink {
                    target: "../target".into(),
                },
            );
            e.write_entry(&link, None).unwrap();
        });
        assert!(text.contains("Type:\tSymbolic Link\nLink Target:\t../target\n"));
        assert!(!text.contains("---"));
    }

    #[test]
    fn grown_file_is_truncated_and_shrunk_file_fails() {
        let text = encode(|e| {
            let file = entry("f", EntryKind::RegularFile { size: 3 });
            e.write_entry(&file, Some(&mut &b"abcdef"[..])).unwrap();
        });
        assert!(text.ends_with("---\nabc---\n"));

        let mut out = vec![];
        let mut encoder = Encoder::with_identities(&mut out, Fixed);
        let file = entry("f", EntryKind::RegularFile { size: 10 });
        let err = encoder
            .write_entry(&file, Some(&mut &b"abc"[..]))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            EncodeError::Shrunk {
                expected: 10,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn adds_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        let meta = std::fs::symlink_metadata(&path).unwrap();

        let text = encode(|e| assert_eq!(e.add(&path, &meta).unwrap(), Added::Written));
        assert!(text.contains(&format!("Path:\t{}\n", path.display())));
        assert!(text.contains("Type:\tRegular File\nFile Size:\t5\n"));
        assert!(text.contains(&format!("User Name:\tuser{}\n", meta.uid())));
        assert!(text.ends_with("---\nhello---\n"));
    }

    #[test]
    fn skips_dot_and_excluded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.ptar");
        std::fs::write(&path, b"").unwrap();
        let meta = std::fs::symlink_metadata(&path).unwrap();

        let mut out = vec![];
        let mut encoder = Encoder::with_identities(&mut out, Fixed).exclude(meta.dev(), meta.ino());
        assert_eq!(encoder.add(&path, &meta).unwrap(), Added::Skipped);
        let dot = std::fs::symlink_metadata(".").unwrap();
        assert_eq!(encoder.add(Path::new("."), &dot).unwrap(), Added::Skipped);
        encoder.finish().unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn per_entry_errors_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let newline = dir.path().join("two\nlines");
        std::fs::write(&newline, b"x").unwrap();
        let spaced = dir.path().join("trailing ");
        std::fs::write(&spaced, b"x").unwrap();

        let mut out = vec![];
        let mut encoder = Encoder::with_identities(&mut out, Fixed);
        for path in &[&newline, &spaced] {
            let meta = std::fs::symlink_metadata(path).unwrap();
            let err = encoder.add(path, &meta).unwrap_err();
            assert!(matches!(err, EncodeError::UnrepresentablePath(..)));
            assert!(!err.is_fatal());
        }

        let plain = dir.path().join("plain");
        std::fs::write(&plain, b"x").unwrap();
        let meta = std::fs::symlink_metadata(&plain).unwrap();
        let mut encoder = Encoder::with_identities(&mut out, Nobody);
        let err = encoder.add(&plain, &meta).unwrap_err();
        assert!(matches!(err, EncodeError::LookupFailed(..)));
        assert!(!err.is_fatal());

        assert!(out.is_empty());
    }

    #[test]
    fn permissions_drop_type_bits() {
        let dir = tempfile::tempdir().unwrap();
        let meta = std::fs::symlink_metadata(dir.path()).unwrap();
        let text = encode(|e| {
            e.add(dir.path(), &meta).unwrap();
        });
        let expected = format!("Permissions:\t{:07o}\n", meta.mode() & 0o7777);
        assert!(text.contains(&expected), "{}", text);
        assert!(text.contains("Type:\tDirectory\n"));
    }
}
