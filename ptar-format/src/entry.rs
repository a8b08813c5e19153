use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::DecodeErrorKind;
use crate::field::normalize;

/// File-type bits of a POSIX mode (`S_IFMT`).
pub const MODE_TYPE_MASK: u32 = 0o170000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    RegularFile,
    Directory,
    SymbolicLink,
    CharacterDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl EntryType {
    pub const ALL: [EntryType; 7] = [
        EntryType::RegularFile,
        EntryType::Directory,
        EntryType::SymbolicLink,
        EntryType::CharacterDevice,
        EntryType::BlockDevice,
        EntryType::Fifo,
        EntryType::Socket,
    ];

    /// The canonical label written by the encoder.
    pub fn label(self) -> &'static str {
        match self {
            EntryType::RegularFile => "Regular File",
            EntryType::Directory => "Directory",
            EntryType::SymbolicLink => "Symbolic Link",
            EntryType::CharacterDevice => "Character Device",
            EntryType::BlockDevice => "Block Device",
            EntryType::Fifo => "FIFO",
            EntryType::Socket => "Socket",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntryType {
    type Err = DecodeErrorKind;

    /// Matches labels ignoring case and whitespace, so `regularfile` and
    /// ` regular   file ` both name a regular file.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        EntryType::ALL
            .iter()
            .copied()
            .find(|ty| normalize(ty.label()) == wanted)
            .ok_or(DecodeErrorKind::UnknownType(wanted))
    }
}

/// The per-entry metadata keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Path,
    Type,
    FileSize,
    LinkTarget,
    Major,
    Minor,
    UserName,
    UserId,
    GroupName,
    GroupId,
    Permissions,
    ModificationTime,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Path,
        Field::Type,
        Field::FileSize,
        Field::LinkTarget,
        Field::Major,
        Field::Minor,
        Field::UserName,
        Field::UserId,
        Field::GroupName,
        Field::GroupId,
        Field::Permissions,
        Field::ModificationTime,
    ];

    /// The key as written by the encoder.
    pub fn key(self) -> &'static str {
        match self {
            Field::Path => "Path",
            Field::Type => "Type",
            Field::FileSize => "File Size",
            Field::LinkTarget => "Link Target",
            Field::Major => "Major",
            Field::Minor => "Minor",
            Field::UserName => "User Name",
            Field::UserId => "User ID",
            Field::GroupName => "Group Name",
            Field::GroupId => "Group ID",
            Field::Permissions => "Permissions",
            Field::ModificationTime => "Modification Time",
        }
    }

    /// Human-readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Field::Path => "file path",
            Field::Type => "file type",
            Field::FileSize => "file size",
            Field::LinkTarget => "link target",
            Field::Major => "major",
            Field::Minor => "minor",
            Field::UserName => "user name",
            Field::UserId => "uid",
            Field::GroupName => "group name",
            Field::GroupId => "gid",
            Field::Permissions => "file permissions",
            Field::ModificationTime => "file modification time",
        }
    }

    /// Looks up a key already passed through [`normalize`].
    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| normalize(field.key()) == key)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Metadata accumulated for one record, before any completeness check.
///
/// The decoder fills this in one line at a time and hands it to a consumer
/// at the end of the record. Listing only needs [`EntryMeta::path`];
/// extraction calls [`EntryMeta::complete`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    path: Option<String>,
    ty: Option<EntryType>,
    size: Option<u64>,
    link_target: Option<String>,
    major: Option<u32>,
    minor: Option<u32>,
    user_name: Option<String>,
    user_id: Option<u32>,
    group_name: Option<String>,
    group_id: Option<u32>,
    mode: Option<u32>,
    mtime: Option<i64>,
}

fn parse_number<T: FromStr>(field: Field, value: &str) -> Result<T, DecodeErrorKind> {
    value.parse().map_err(|_| DecodeErrorKind::InvalidValue {
        field,
        value: value.to_string(),
    })
}

impl EntryMeta {
    pub fn new() -> EntryMeta {
        EntryMeta::default()
    }

    /// Returns true if no field has been set since the last reset.
    pub fn is_empty(&self) -> bool {
        *self == EntryMeta::default()
    }

    #[inline(always)]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[inline(always)]
    pub fn entry_type(&self) -> Option<EntryType> {
        self.ty
    }

    #[inline(always)]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Parses and stores one field. A field given twice is an error, not an
    /// overwrite, and values may never be empty.
    pub fn set(&mut self, field: Field, value: &str) -> Result<(), DecodeErrorKind> {
        if value.is_empty() {
            return Err(DecodeErrorKind::EmptyValue);
        }
        if self.has(field) {
            return Err(DecodeErrorKind::Duplicate(field.name()));
        }

        tracing::trace!(%field, value, "metadata field");

        match field {
            Field::Path => self.path = Some(value.to_string()),
            Field::Type => self.ty = Some(value.parse()?),
            Field::FileSize => self.size = Some(parse_number(field, value)?),
            Field::LinkTarget => self.link_target = Some(value.to_string()),
            Field::Major => self.major = Some(parse_number(field, value)?),
            Field::Minor => self.minor = Some(parse_number(field, value)?),
            Field::UserName => self.user_name = Some(value.to_string()),
            Field::UserId => self.user_id = Some(parse_number(field, value)?),
            Field::GroupName => self.group_name = Some(value.to_string()),
            Field::GroupId => self.group_id = Some(parse_number(field, value)?),
            Field::Permissions => {
                let mode = u32::from_str_radix(value, 8)
                    .ok()
                    .filter(|mode| mode & MODE_TYPE_MASK == 0)
                    .ok_or_else(|| DecodeErrorKind::InvalidValue {
                        field,
                        value: value.to_string(),
                    })?;
                self.mode = Some(mode);
            }
            Field::ModificationTime => self.mtime = Some(parse_number(field, value)?),
        }
        Ok(())
    }

    /// The first field required for this record's type that has not been
    /// given, if any.
    pub fn missing(&self) -> Option<Field> {
        let ty = match self.ty {
            Some(ty) => ty,
            None if self.path.is_none() => return Some(Field::Path),
            None => return Some(Field::Type),
        };

        let mut required = vec![Field::Path];
        match ty {
            EntryType::RegularFile => required.push(Field::FileSize),
            EntryType::SymbolicLink => required.push(Field::LinkTarget),
            EntryType::CharacterDevice | EntryType::BlockDevice => {
                required.push(Field::Major);
                required.push(Field::Minor);
            }
            EntryType::Directory | EntryType::Fifo | EntryType::Socket => {}
        }
        required.extend_from_slice(&[
            Field::UserName,
            Field::UserId,
            Field::GroupName,
            Field::GroupId,
            Field::Permissions,
            Field::ModificationTime,
        ]);

        required.into_iter().find(|field| !self.has(*field))
    }

    fn has(&self, field: Field) -> bool {
        match field {
            Field::Path => self.path.is_some(),
            Field::Type => self.ty.is_some(),
            Field::FileSize => self.size.is_some(),
            Field::LinkTarget => self.link_target.is_some(),
            Field::Major => self.major.is_some(),
            Field::Minor => self.minor.is_some(),
            Field::UserName => self.user_name.is_some(),
            Field::UserId => self.user_id.is_some(),
            Field::GroupName => self.group_name.is_some(),
            Field::GroupId => self.group_id.is_some(),
            Field::Permissions => self.mode.is_some(),
            Field::ModificationTime => self.mtime.is_some(),
        }
    }

    /// Checks that every field required by the record's type is present and
    /// produces the complete entry. Fields that do not apply to the type are
    /// dropped.
    pub fn complete(self) -> Result<Entry, DecodeErrorKind> {
        if let Some(field) = self.missing() {
            return Err(DecodeErrorKind::Incomplete(field));
        }

        let incomplete = DecodeErrorKind::Incomplete;
        let kind = match self.ty.ok_or(incomplete(Field::Type))? {
            EntryType::RegularFile => EntryKind::RegularFile {
                size: self.size.ok_or(incomplete(Field::FileSize))?,
            },
            EntryType::Directory => EntryKind::Directory,
            EntryType::SymbolicLink => EntryKind::SymbolicLink {
                target: self.link_target.ok_or(incomplete(Field::LinkTarget))?,
            },
            EntryType::CharacterDevice => EntryKind::CharacterDevice {
                major: self.major.ok_or(incomplete(Field::Major))?,
                minor: self.minor.ok_or(incomplete(Field::Minor))?,
            },
            EntryType::BlockDevice => EntryKind::BlockDevice {
                major: self.major.ok_or(incomplete(Field::Major))?,
                minor: self.minor.ok_or(incomplete(Field::Minor))?,
            },
            EntryType::Fifo => EntryKind::Fifo,
            EntryType::Socket => EntryKind::Socket,
        };

        Ok(Entry {
            path: self.path.ok_or(incomplete(Field::Path))?,
            kind,
            user: Owner {
                name: self.user_name.ok_or(incomplete(Field::UserName))?,
                id: self.user_id.ok_or(incomplete(Field::UserId))?,
            },
            group: Owner {
                name: self.group_name.ok_or(incomplete(Field::GroupName))?,
                id: self.group_id.ok_or(incomplete(Field::GroupId))?,
            },
            mode: self.mode.ok_or(incomplete(Field::Permissions))?,
            mtime: self.mtime.ok_or(incomplete(Field::ModificationTime))?,
        })
    }
}

/// Type-specific part of a complete entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    RegularFile { size: u64 },
    Directory,
    SymbolicLink { target: String },
    CharacterDevice { major: u32, minor: u32 },
    BlockDevice { major: u32, minor: u32 },
    Fifo,
    Socket,
}

impl EntryKind {
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryKind::RegularFile { .. } => EntryType::RegularFile,
            EntryKind::Directory => EntryType::Directory,
            EntryKind::SymbolicLink { .. } => EntryType::SymbolicLink,
            EntryKind::CharacterDevice { .. } => EntryType::CharacterDevice,
            EntryKind::BlockDevice { .. } => EntryType::BlockDevice,
            EntryKind::Fifo => EntryType::Fifo,
            EntryKind::Socket => EntryType::Socket,
        }
    }
}

/// A user or group, by name and numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
    pub id: u32,
}

/// A complete archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The path exactly as recorded. Relative paths are resolved against the
    /// extraction root; absolute paths are used as they are.
    pub path: String,
    pub kind: EntryKind,
    pub user: Owner,
    pub group: Owner,
    /// Permission bits, without file-type bits.
    pub mode: u32,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: i64,
}

impl Entry {
    #[inline(always)]
    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }

    #[inline(always)]
    pub fn entry_type(&self) -> EntryType {
        self.kind.entry_type()
    }

    /// The payload length for regular files.
    pub fn size(&self) -> Option<u64> {
        match self.kind {
            EntryKind::RegularFile { size } => Some(size),
            _ => None,
        }
    }
}
