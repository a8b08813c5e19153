//! Filesystem operations used when extracting, and the metadata read back
//! from the filesystem when archiving.
//!
//! Everything here is a thin wrapper over one system call that reports plain
//! [`io::Error`]s; callers attach the path.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::entry::EntryType;

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

fn cvt(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Unlinks the non-directory object at `path`. A missing object is not an
/// error; a directory is.
pub fn remove(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Creates a directory. An existing directory is left as it is; any other
/// existing object, a symlink to a directory included, is an error.
pub fn create_directory(path: &Path, mode: u32) -> io::Result<()> {
    match fs::DirBuilder::new().mode(mode).create(path) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if fs::symlink_metadata(path)?.file_type().is_dir() {
                Ok(())
            } else {
                Err(e)
            }
        }
        other => other,
    }
}

/// Creates (or truncates) a regular file for writing.
pub fn create_file(path: &Path, mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

pub fn create_symlink(target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Character,
    Block,
}

pub fn create_device(path: &Path, kind: DeviceKind, mode: u32, major: u32, minor: u32) -> io::Result<()> {
    let format = match kind {
        DeviceKind::Character => libc::S_IFCHR,
        DeviceKind::Block => libc::S_IFBLK,
    };
    #[allow(unused_unsafe)]
    let dev = unsafe { libc::makedev(major as _, minor as _) };
    mknod(path, format | mode as libc::mode_t, dev)
}

pub fn create_fifo(path: &Path, mode: u32) -> io::Result<()> {
    let path = c_path(path)?;
    cvt(unsafe { libc::mkfifo(path.as_ptr(), mode as libc::mode_t) })
}

/// Creates a socket node. Nothing listens on it.
pub fn create_socket_node(path: &Path, mode: u32) -> io::Result<()> {
    mknod(path, libc::S_IFSOCK | mode as libc::mode_t, 0)
}

fn mknod(path: &Path, mode: libc::mode_t, dev: libc::dev_t) -> io::Result<()> {
    let path = c_path(path)?;
    cvt(unsafe { libc::mknod(path.as_ptr(), mode, dev) })
}

pub fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Sets the modification time of `path` itself, not of a symlink's target.
/// The access time is left alone.
pub fn set_mod_time(path: &Path, mtime: i64) -> io::Result<()> {
    let path = c_path(path)?;
    let times = [
        libc::timespec {
            tv_sec: 0,
            tv_nsec: libc::UTIME_OMIT,
        },
        libc::timespec {
            tv_sec: mtime as libc::time_t,
            tv_nsec: 0,
        },
    ];
    cvt(unsafe {
        libc::utimensat(
            libc::AT_FDCWD,
            path.as_ptr(),
            times.as_ptr(),
            libc::AT_SYMLINK_NOFOLLOW,
        )
    })
}

/// Sets numeric ownership without following symlinks.
pub fn set_owner_group(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    std::os::unix::fs::lchown(path, Some(uid), Some(gid))
}

/// The archive type of a file, or `None` for types that cannot be archived.
pub fn entry_type(file_type: fs::FileType) -> Option<EntryType> {
    if file_type.is_file() {
        Some(EntryType::RegularFile)
    } else if file_type.is_dir() {
        Some(EntryType::Directory)
    } else if file_type.is_symlink() {
        Some(EntryType::SymbolicLink)
    } else if file_type.is_char_device() {
        Some(EntryType::CharacterDevice)
    } else if file_type.is_block_device() {
        Some(EntryType::BlockDevice)
    } else if file_type.is_fifo() {
        Some(EntryType::Fifo)
    } else if file_type.is_socket() {
        Some(EntryType::Socket)
    } else {
        None
    }
}

/// Splits a device number into `(major, minor)`.
#[allow(unused_unsafe)]
pub fn device_numbers(rdev: u64) -> (u32, u32) {
    let rdev = rdev as libc::dev_t;
    unsafe { (libc::major(rdev) as u32, libc::minor(rdev) as u32) }
}

/// Resolves numeric owners to names for the archive's `User Name` and
/// `Group Name` fields.
pub trait Identities {
    fn user_name(&mut self, uid: u32) -> io::Result<String>;
    fn group_name(&mut self, gid: u32) -> io::Result<String>;
}

/// The system user and group databases, with every answer cached.
#[derive(Debug, Default)]
pub struct SystemIdentities {
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

impl SystemIdentities {
    pub fn new() -> SystemIdentities {
        SystemIdentities::default()
    }
}

impl Identities for SystemIdentities {
    fn user_name(&mut self, uid: u32) -> io::Result<String> {
        if let Some(name) = self.users.get(&uid) {
            return Ok(name.clone());
        }
        let name = lookup_user(uid)?;
        tracing::debug!(uid, name = %name, "resolved user");
        self.users.insert(uid, name.clone());
        Ok(name)
    }

    fn group_name(&mut self, gid: u32) -> io::Result<String> {
        if let Some(name) = self.groups.get(&gid) {
            return Ok(name.clone());
        }
        let name = lookup_group(gid)?;
        tracing::debug!(gid, name = %name, "resolved group");
        self.groups.insert(gid, name.clone());
        Ok(name)
    }
}

const LOOKUP_BUF_START: usize = 1024;
const LOOKUP_BUF_MAX: usize = 1 << 20;

fn name_from_ptr(name: *const libc::c_char) -> io::Result<String> {
    unsafe { CStr::from_ptr(name) }
        .to_str()
        .map(str::to_owned)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "name is not valid UTF-8"))
}

fn lookup_user(uid: u32) -> io::Result<String> {
    let mut buf: Vec<libc::c_char> = vec![0; LOOKUP_BUF_START];
    loop {
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let ret = unsafe {
            libc::getpwuid_r(
                uid as libc::uid_t,
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        match ret {
            0 if result.is_null() => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no user with id {}", uid),
                ))
            }
            0 => return name_from_ptr(pwd.pw_name),
            libc::ERANGE if buf.len() < LOOKUP_BUF_MAX => buf.resize(buf.len() * 2, 0),
            e => return Err(io::Error::from_raw_os_error(e)),
        }
    }
}

fn lookup_group(gid: u32) -> io::Result<String> {
    let mut buf: Vec<libc::c_char> = vec![0; LOOKUP_BUF_START];
    loop {
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        let ret = unsafe {
            libc::getgrgid_r(
                gid as libc::gid_t,
                &mut grp,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        match ret {
            0 if result.is_null() => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no group with id {}", gid),
                ))
            }
            0 => return name_from_ptr(grp.gr_name),
            libc::ERANGE if buf.len() < LOOKUP_BUF_MAX => buf.resize(buf.len() * 2, 0),
            e => return Err(io::Error::from_raw_os_error(e)),
        }
    }
}
