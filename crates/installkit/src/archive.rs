//! tar.gz extraction of named members.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

/// Whether a member path is safe to join onto a destination directory.
#[must_use]
pub fn is_safe_member(member: &str) -> bool {
    let path = Path::new(member);
    !member.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn clean(path: &str) -> &str {
    let mut path = path;
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path
}

/// Extract `members` from the tar.gz at `archive` into `dest`.
///
/// Members are matched by exact path inside the archive (a leading `./` on
/// either side is ignored). Every requested member must be present and be a
/// regular file. Returns the extracted paths in the order of `members`.
///
/// # Errors
///
/// Returns `Error::ExtractionFailed` if the archive cannot be decoded, a
/// member is missing or not a regular file, or writing into `dest` fails.
pub fn extract_members(
    component: &str,
    archive: &Path,
    dest: &Path,
    members: &[String],
) -> Result<Vec<PathBuf>> {
    let failed = |message: String| Error::ExtractionFailed {
        component: component.to_string(),
        message,
    };

    for member in members {
        if !is_safe_member(member) {
            return Err(failed(format!("refusing unsafe member path '{member}'")));
        }
    }

    let wanted: HashMap<&str, &String> = members.iter().map(|m| (clean(m), m)).collect();
    let mut found: HashMap<&str, PathBuf> = HashMap::new();

    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    let entries = tarball
        .entries()
        .map_err(|e| failed(format!("cannot read archive: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| failed(format!("malformed archive: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| failed(format!("malformed entry path: {e}")))?
            .to_string_lossy()
            .into_owned();

        let Some((&key, &member)) = wanted.get_key_value(clean(&path)) else {
            continue;
        };

        let kind = entry.header().entry_type();
        if kind != EntryType::Regular && kind != EntryType::Continuous {
            return Err(failed(format!("member '{member}' is not a regular file")));
        }

        let out = dest.join(clean(member));
        write_entry(&mut entry, &out).map_err(|e| failed(format!("cannot write {}: {e}", out.display())))?;
        log::debug!(target: component, "extracted {member}");
        found.insert(key, out);
    }

    members
        .iter()
        .map(|m| {
            found
                .remove(clean(m))
                .ok_or_else(|| failed(format!("member '{m}' not found in archive")))
        })
        .collect()
}

fn write_entry(reader: &mut impl io::Read, out: &Path) -> io::Result<()> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(out)?;
    io::copy(reader, &mut file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        {
            let mut builder = tar::Builder::new(&mut encoder);
            for (name, data) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, name, *data).unwrap();
            }
            builder.finish().unwrap();
        }
        encoder.finish().unwrap()
    }

    fn write_archive(dir: &Path, data: &[u8]) -> PathBuf {
        let path = dir.join("artifact.tar.gz");
        fs::write(&path, data).unwrap();
        path
    }

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_extract_members_in_requested_order() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(
            dir.path(),
            &tarball(&[
                ("bin/ctr", b"ctr"),
                ("bin/containerd", b"containerd"),
                ("bin/containerd-stress", b"stress"),
                ("bin/containerd-shim-runc-v2", b"shim"),
            ]),
        );
        let dest = dir.path().join("out");

        let paths = extract_members(
            "containerd",
            &archive,
            &dest,
            &members(&["bin/containerd", "bin/containerd-shim-runc-v2", "bin/ctr"]),
        )
        .unwrap();

        assert_eq!(paths.len(), 3);
        assert_eq!(fs::read(&paths[0]).unwrap(), b"containerd");
        assert_eq!(fs::read(&paths[1]).unwrap(), b"shim");
        assert_eq!(fs::read(&paths[2]).unwrap(), b"ctr");
        assert!(!dest.join("bin/containerd-stress").exists());
    }

    #[test]
    fn test_extract_ignores_dot_slash_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path(), &tarball(&[("./crictl", b"crictl")]));
        let paths =
            extract_members("crictl", &archive, &dir.path().join("out"), &members(&["crictl"]))
                .unwrap();
        assert_eq!(fs::read(&paths[0]).unwrap(), b"crictl");
    }

    #[test]
    fn test_extract_missing_member() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path(), &tarball(&[("bin/containerd", b"x")]));
        let err = extract_members(
            "containerd",
            &archive,
            &dir.path().join("out"),
            &members(&["bin/containerd", "bin/ctr"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed { .. }));
        assert!(err.to_string().contains("bin/ctr"));
    }

    #[test]
    fn test_extract_malformed_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path(), b"definitely not gzip");
        let err = extract_members("etcd", &archive, &dir.path().join("out"), &members(&["etcd"]))
            .unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed { .. }));
    }

    #[test]
    fn test_extract_rejects_unsafe_member() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path(), &tarball(&[("etcd", b"x")]));
        let err = extract_members(
            "etcd",
            &archive,
            &dir.path().join("out"),
            &members(&["../etcd"]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsafe"));
    }

    #[test]
    fn test_is_safe_member() {
        assert!(is_safe_member("bin/containerd"));
        assert!(is_safe_member("./crictl"));
        assert!(!is_safe_member("/usr/bin/etcd"));
        assert!(!is_safe_member("a/../../etc/passwd"));
        assert!(!is_safe_member(""));
    }
}
