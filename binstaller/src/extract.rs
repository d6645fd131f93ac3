//! Archive extraction with strip-components and path-traversal defense.
//!
//! Used by the embedder's `calculate` mode; semantically this is the
//! in-process twin of the generated scripts' `untar` helper, including which
//! formats dispatch where and how strip-components treats too-shallow
//! entries (they are skipped, not errors).
//!
//! Nothing here trusts archive contents: every entry's destination is
//! re-derived from cleaned components and must stay inside the target
//! directory, and symlinks may neither be absolute nor resolve outside it.
//! The first offending entry aborts extraction, leaving partial output for
//! the caller to clean up.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use camino::Utf8Path;
use flate2::read::GzDecoder;
use tar::EntryType;
use xz2::read::XzDecoder;

use crate::errors::{BinstallError, BinstallResult};

/// Extract (or just place) a downloaded asset into `dest`.
///
/// Dispatches on the filename: `.tar[.gz|.xz|.bz2]`, `.tgz` and `.zip` are
/// unpacked, a bare `.gz` is decompressed to its stem, and anything else is
/// treated as a single raw binary and copied in unchanged.
pub fn extract_archive(
    archive: &Utf8Path,
    dest: &Utf8Path,
    strip_components: u32,
) -> BinstallResult<()> {
    let filename = archive.file_name().unwrap_or_default();
    let dest = dest.as_std_path();
    fs::create_dir_all(dest)?;
    if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        untar_all(GzDecoder::new(File::open(archive)?), dest, strip_components)
    } else if filename.ends_with(".tar.xz") {
        untar_all(XzDecoder::new(File::open(archive)?), dest, strip_components)
    } else if filename.ends_with(".tar.bz2") {
        untar_all(BzDecoder::new(File::open(archive)?), dest, strip_components)
    } else if filename.ends_with(".tar") {
        untar_all(File::open(archive)?, dest, strip_components)
    } else if filename.ends_with(".zip") {
        unzip_all(archive, dest, strip_components)
    } else if filename.ends_with(".gz") {
        gunzip_one(archive, dest)
    } else {
        let filename = archive.file_name().ok_or(BinstallError::UnsupportedArchive {
            path: archive.to_owned(),
        })?;
        fs::copy(archive, dest.join(filename))?;
        Ok(())
    }
}

fn is_absolute_entry(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::RootDir | Component::Prefix(_)))
}

/// Drop the first `strip` components of an entry path; `None` means the
/// entry is too shallow and gets skipped
fn strip_entry_path(path: &Path, strip: u32) -> Option<PathBuf> {
    let components: Vec<Component<'_>> = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    if components.len() <= strip as usize {
        return None;
    }
    Some(components[strip as usize..].iter().copied().collect())
}

/// Join a cleaned relative path onto `dest`; `None` means the path escapes
fn clean_join(dest: &Path, rel: &Path) -> Option<PathBuf> {
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => stack.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let mut out = dest.to_path_buf();
    for part in stack {
        out.push(part);
    }
    Some(out)
}

fn untar_all(reader: impl Read, dest: &Path, strip: u32) -> BinstallResult<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw = entry.path()?.into_owned();
        let display = raw.to_string_lossy().into_owned();
        if is_absolute_entry(&raw) {
            return Err(BinstallError::PathTraversal { entry: display });
        }
        let Some(rel) = strip_entry_path(&raw, strip) else {
            continue;
        };
        let Some(out_path) = clean_join(dest, &rel) else {
            return Err(BinstallError::PathTraversal { entry: display });
        };
        if out_path == dest {
            continue;
        }
        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&out_path)?;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()?
                    .ok_or_else(|| BinstallError::PathTraversal {
                        entry: display.clone(),
                    })?
                    .into_owned();
                let target_display = target.to_string_lossy().into_owned();
                if is_absolute_entry(&target) {
                    return Err(BinstallError::SymlinkEscape {
                        entry: display,
                        target: target_display,
                    });
                }
                let link_parent = rel.parent().unwrap_or(Path::new(""));
                if clean_join(dest, &link_parent.join(&target)).is_none() {
                    return Err(BinstallError::SymlinkEscape {
                        entry: display,
                        target: target_display,
                    });
                }
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                #[cfg(unix)]
                std::os::unix::fs::symlink(&target, &out_path)?;
                #[cfg(not(unix))]
                tracing::warn!("skipping symlink {display} -> {target_display}");
            }
            _ => {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry.unpack(&out_path)?;
            }
        }
    }
    Ok(())
}

fn unzip_all(zipfile: &Utf8Path, dest: &Path, strip: u32) -> BinstallResult<()> {
    let file = File::open(zipfile)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let display = entry.name().to_owned();
        let Some(raw) = entry.enclosed_name() else {
            return Err(BinstallError::PathTraversal { entry: display });
        };
        let Some(rel) = strip_entry_path(&raw, strip) else {
            continue;
        };
        let Some(out_path) = clean_join(dest, &rel) else {
            return Err(BinstallError::PathTraversal { entry: display });
        };
        if out_path == dest {
            continue;
        }
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

fn gunzip_one(archive: &Utf8Path, dest: &Path) -> BinstallResult<()> {
    let stem = archive.file_stem().unwrap_or("unpacked");
    let mut decoder = GzDecoder::new(File::open(archive)?);
    let mut out = File::create(dest.join(stem))?;
    io::copy(&mut decoder, &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use temp_dir::TempDir;

    fn write_tar_gz(dir: &Path, entries: &[(&str, &str)]) -> Utf8PathBuf {
        let path = dir.join("fixture.tar.gz");
        let file = File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (entry_path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            let name = header.as_gnu_mut().unwrap().name.as_mut();
            let bytes = entry_path.as_bytes();
            name[..bytes.len()].copy_from_slice(bytes);
            header.set_cksum();
            builder
                .append(&header, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        Utf8PathBuf::from_path_buf(path).unwrap()
    }

    fn write_tar_gz_with_symlink(dir: &Path, target: &str) -> Utf8PathBuf {
        let path = dir.join("symlink.tar.gz");
        let file = File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, "sub/link", target).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        Utf8PathBuf::from_path_buf(path).unwrap()
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut found = Vec::new();
        fn walk(root: &Path, dir: &Path, found: &mut Vec<String>) {
            for entry in fs::read_dir(dir).unwrap() {
                let entry = entry.unwrap();
                let path = entry.path();
                if path.is_dir() {
                    walk(root, &path, found);
                } else {
                    found.push(
                        path.strip_prefix(root)
                            .unwrap()
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
            }
        }
        walk(dir, dir, &mut found);
        found.sort();
        found
    }

    #[test]
    fn strip_components_drops_leading_dirs_and_shallow_entries() {
        let tmp = TempDir::new().unwrap();
        let archive = write_tar_gz(
            tmp.path(),
            &[
                ("root/dir1/file1.txt", "1"),
                ("root/dir1/file2.txt", "2"),
                ("root/file3.txt", "3"),
            ],
        );
        let dest = tmp.path().join("out");
        extract_archive(
            &archive,
            Utf8Path::from_path(&dest).unwrap(),
            1,
        )
        .unwrap();
        assert_eq!(
            listing(&dest),
            vec!["dir1/file1.txt", "dir1/file2.txt", "file3.txt"]
        );
        assert!(!dest.join("root").exists());
    }

    #[test]
    fn zero_strip_keeps_layout() {
        let tmp = TempDir::new().unwrap();
        let archive = write_tar_gz(tmp.path(), &[("root/file.txt", "x")]);
        let dest = tmp.path().join("out");
        extract_archive(&archive, Utf8Path::from_path(&dest).unwrap(), 0).unwrap();
        assert_eq!(listing(&dest), vec!["root/file.txt"]);
    }

    #[test]
    fn dotdot_entries_abort_without_escaping() {
        let tmp = TempDir::new().unwrap();
        let archive = write_tar_gz(tmp.path(), &[("../evil.txt", "boom")]);
        let dest = tmp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        let err =
            extract_archive(&archive, Utf8Path::from_path(&dest).unwrap(), 0).unwrap_err();
        assert!(matches!(err, BinstallError::PathTraversal { .. }), "{err}");
        assert!(!tmp.path().join("evil.txt").exists());
    }

    #[test]
    fn nested_dotdot_escape_is_caught_after_clean() {
        let tmp = TempDir::new().unwrap();
        let archive = write_tar_gz(tmp.path(), &[("a/../../evil.txt", "boom")]);
        let dest = tmp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        let err =
            extract_archive(&archive, Utf8Path::from_path(&dest).unwrap(), 0).unwrap_err();
        assert!(matches!(err, BinstallError::PathTraversal { .. }), "{err}");
        assert!(!tmp.path().join("evil.txt").exists());
    }

    #[test]
    fn absolute_symlink_targets_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let archive = write_tar_gz_with_symlink(tmp.path(), "/etc/passwd");
        let dest = tmp.path().join("out");
        let err =
            extract_archive(&archive, Utf8Path::from_path(&dest).unwrap(), 0).unwrap_err();
        assert!(matches!(err, BinstallError::SymlinkEscape { .. }), "{err}");
    }

    #[test]
    fn escaping_symlink_targets_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let archive = write_tar_gz_with_symlink(tmp.path(), "../../outside");
        let dest = tmp.path().join("out");
        let err =
            extract_archive(&archive, Utf8Path::from_path(&dest).unwrap(), 0).unwrap_err();
        assert!(matches!(err, BinstallError::SymlinkEscape { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn inside_symlinks_are_allowed() {
        let tmp = TempDir::new().unwrap();
        let archive = write_tar_gz_with_symlink(tmp.path(), "../sibling");
        let dest = tmp.path().join("out");
        extract_archive(&archive, Utf8Path::from_path(&dest).unwrap(), 0).unwrap();
        assert!(dest.join("sub/link").is_symlink());
    }

    #[test]
    fn zip_strip_matches_tar_semantics() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fixture.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("root/dir1/file1.txt", options).unwrap();
        writer.write_all(b"1").unwrap();
        writer.start_file("root/file3.txt", options).unwrap();
        writer.write_all(b"3").unwrap();
        writer.start_file("loose.txt", options).unwrap();
        writer.write_all(b"dropped").unwrap();
        writer.finish().unwrap();

        let dest = tmp.path().join("out");
        extract_archive(
            Utf8Path::from_path(&path).unwrap(),
            Utf8Path::from_path(&dest).unwrap(),
            1,
        )
        .unwrap();
        assert_eq!(listing(&dest), vec!["dir1/file1.txt", "file3.txt"]);
    }

    #[test]
    fn zip_traversal_names_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("evil.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("../evil.txt", options).unwrap();
        writer.write_all(b"boom").unwrap();
        writer.finish().unwrap();

        let dest = tmp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        let err = extract_archive(
            Utf8Path::from_path(&path).unwrap(),
            Utf8Path::from_path(&dest).unwrap(),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, BinstallError::PathTraversal { .. }), "{err}");
        assert!(!tmp.path().join("evil.txt").exists());
    }

    #[test]
    fn bare_gz_decompresses_to_stem() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tool.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"#!/bin/sh\n").unwrap();
        encoder.finish().unwrap();

        let dest = tmp.path().join("out");
        extract_archive(
            Utf8Path::from_path(&path).unwrap(),
            Utf8Path::from_path(&dest).unwrap(),
            0,
        )
        .unwrap();
        assert_eq!(fs::read(dest.join("tool")).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn unknown_formats_are_copied_through() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tool_linux_amd64");
        fs::write(&path, b"ELF").unwrap();
        let dest = tmp.path().join("out");
        extract_archive(
            Utf8Path::from_path(&path).unwrap(),
            Utf8Path::from_path(&dest).unwrap(),
            0,
        )
        .unwrap();
        assert_eq!(fs::read(dest.join("tool_linux_amd64")).unwrap(), b"ELF");
    }
}
