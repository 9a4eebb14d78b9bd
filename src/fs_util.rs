use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;
use walkdir::WalkDir;

use crate::diagnostics::{Notice, NoticeKind};
use crate::error::SampleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    Exists,
}

pub fn require_dir(path: &Utf8Path) -> Result<(), SampleError> {
    if path.as_std_path().is_dir() {
        Ok(())
    } else {
        Err(SampleError::NotADirectory(path.to_path_buf()))
    }
}

#[derive(Debug, Default)]
pub struct FileScan {
    pub files: Vec<Utf8PathBuf>,
    pub notices: Vec<Notice>,
}

/// Files below `root` whose name ends with `suffix`, sorted by path.
/// `max_depth` of 1 restricts the search to the directory itself.
pub fn find_files(
    root: &Utf8Path,
    suffix: &str,
    max_depth: Option<usize>,
) -> Result<FileScan, SampleError> {
    require_dir(root)?;
    let mut walker = WalkDir::new(root.as_std_path()).follow_links(true);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut scan = FileScan::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(root = %root, "skipping unreadable entry: {err}");
                let mut notice = Notice::new(NoticeKind::Unreadable {
                    reason: err.to_string(),
                });
                if let Some(path) = err.path().and_then(Utf8Path::from_path) {
                    notice = notice.path(path);
                }
                scan.notices.push(notice);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => path,
            Err(raw) => {
                let name = raw.to_string_lossy();
                if name.ends_with(suffix) {
                    warn!(root = %root, "skipping non-utf8 file name {name}");
                    scan.notices.push(Notice::new(NoticeKind::Unreadable {
                        reason: format!("file name is not UTF-8: {name}"),
                    }));
                }
                continue;
            }
        };
        if path.file_name().is_some_and(|name| name.ends_with(suffix)) {
            scan.files.push(path);
        }
    }
    scan.files.sort();
    Ok(scan)
}

pub fn ensure_dir(path: &Utf8Path) -> io::Result<()> {
    if path.as_std_path().is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path.as_std_path())
}

pub fn link_if_absent(source: &Utf8Path, target: &Utf8Path) -> io::Result<LinkOutcome> {
    if fs::symlink_metadata(target.as_std_path()).is_ok() {
        return Ok(LinkOutcome::Exists);
    }
    match fs::hard_link(source.as_std_path(), target.as_std_path()) {
        Ok(()) => Ok(LinkOutcome::Linked),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(LinkOutcome::Exists),
        Err(err) => Err(err),
    }
}

pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SampleError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SampleError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = NamedTempFile::new_in(parent.as_std_path())
        .map_err(|err| SampleError::Filesystem(err.to_string()))?;
    io::Write::write_all(&mut temp, content)
        .map_err(|err| SampleError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SampleError::Filesystem(format!("write {path}: {err}")))?;
    Ok(())
}
