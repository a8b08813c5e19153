//! Archives a small directory tree and extracts it again.

use std::fs;
use std::io::{self, BufReader, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use ptar_format::fs::Identities;
use ptar_format::{ArchiveHeader, Encoder};
use tempfile::TempDir;

struct Fixed;

impl Identities for Fixed {
    fn user_name(&mut self, uid: u32) -> io::Result<String> {
        Ok(format!("user{}", uid))
    }

    fn group_name(&mut self, gid: u32) -> io::Result<String> {
        Ok(format!("group{}", gid))
    }
}

/// Pre-order, sorted, like the command line tree walk.
fn walk(path: &Path, out: &mut Vec<PathBuf>) {
    out.push(path.to_path_buf());
    let meta = fs::symlink_metadata(path).unwrap();
    if meta.is_dir() {
        let mut children: Vec<_> = fs::read_dir(path)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        children.sort();
        for child in children {
            walk(&child, out);
        }
    }
}

fn build_tree(root: &Path) {
    let tree = root.join("tree");
    fs::create_dir(&tree).unwrap();
    fs::write(tree.join("a.txt"), b"hello\n").unwrap();
    ptar_format::fs::set_permissions(&tree.join("a.txt"), 0o640).unwrap();

    let sub = tree.join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("b.bin"), b"\x00\x01---\n\n---\nPath: not metadata").unwrap();
    fs::write(sub.join("empty"), b"").unwrap();
    ptar_format::fs::set_permissions(&sub, 0o750).unwrap();

    std::os::unix::fs::symlink("a.txt", tree.join("link")).unwrap();
    ptar_format::fs::create_fifo(&tree.join("fifo"), 0o600).unwrap();

    let mut paths = vec![];
    walk(&tree, &mut paths);
    for (i, path) in paths.iter().rev().enumerate() {
        ptar_format::fs::set_mod_time(path, 1_300_000_000 + i as i64).unwrap();
    }
}

fn encode(paths: &[PathBuf]) -> Vec<u8> {
    let mut out = vec![];
    let mut encoder = Encoder::with_identities(&mut out, Fixed);
    let created = Utc.timestamp_opt(1367403072, 0).unwrap();
    encoder.write_header(&ArchiveHeader::new(created)).unwrap();
    for path in paths {
        let meta = fs::symlink_metadata(path).unwrap();
        encoder.add(path, &meta).unwrap();
    }
    encoder.finish().unwrap();
    out
}

/// The only test that depends on the working directory, which it changes.
#[test]
fn tree_survives_round_trip() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    build_tree(src.path());

    std::env::set_current_dir(src.path()).unwrap();
    let mut paths = vec![];
    walk(Path::new("tree"), &mut paths);
    let archive = encode(&paths);

    let stats = ptar_format::extract(&archive[..], dest.path()).unwrap();
    assert_eq!(stats.dirs_created, 2);
    assert_eq!(stats.files_extracted, 3);
    assert_eq!(stats.links_created, 1);
    assert_eq!(stats.nodes_created, 1);
    assert_eq!(stats.bytes_written, 6 + 29);

    for path in &paths {
        let before = fs::symlink_metadata(src.path().join(path)).unwrap();
        let after = fs::symlink_metadata(dest.path().join(path)).unwrap();
        let name = path.display();

        assert_eq!(before.file_type(), after.file_type(), "{}", name);
        assert_eq!(before.uid(), after.uid(), "{}", name);
        assert_eq!(before.gid(), after.gid(), "{}", name);
        assert_eq!(before.mtime(), after.mtime(), "{}", name);

        if before.file_type().is_symlink() {
            assert_eq!(
                fs::read_link(src.path().join(path)).unwrap(),
                fs::read_link(dest.path().join(path)).unwrap()
            );
            continue;
        }
        assert_eq!(before.mode() & 0o7777, after.mode() & 0o7777, "{}", name);
        if before.is_file() {
            assert_eq!(
                fs::read(src.path().join(path)).unwrap(),
                fs::read(dest.path().join(path)).unwrap(),
                "{}",
                name
            );
        }
    }
}

#[test]
fn listing_matches_walk_whether_seeking_or_reading() {
    let src = TempDir::new().unwrap();
    build_tree(src.path());

    let mut paths = vec![];
    walk(&src.path().join("tree"), &mut paths);
    let archive = encode(&paths);

    let archive_path = src.path().join("tree.ptar");
    fs::File::create(&archive_path)
        .and_then(|mut f| f.write_all(&archive))
        .unwrap();

    let mut read = vec![];
    let count = ptar_format::list(&archive[..], &mut read).unwrap();
    assert_eq!(count, paths.len());

    let mut seeked = vec![];
    let file = BufReader::with_capacity(16, fs::File::open(&archive_path).unwrap());
    ptar_format::list(file, &mut seeked).unwrap();

    assert_eq!(read, seeked);
    let expected: String = paths
        .iter()
        .map(|p| format!("{}\n", p.display()))
        .collect();
    assert_eq!(String::from_utf8(read).unwrap(), expected);
}

#[test]
fn truncated_archive_is_rejected() {
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    build_tree(src.path());

    let mut paths = vec![];
    walk(&src.path().join("tree"), &mut paths);
    let mut archive = encode(&paths);
    let marker = archive
        .windows(4)
        .rposition(|w| w == b"---\n")
        .unwrap();
    archive.truncate(marker);

    let err = ptar_format::list(&archive[..], io::sink()).unwrap_err();
    assert!(err.to_string().contains("end-of-file"), "{}", err);
    assert!(ptar_format::extract(&archive[..], dest.path()).is_err());
}
