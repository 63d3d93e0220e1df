// src/debug/helpers.rs

//! Temporary file and directory helpers for testing.

use crate::common::{FPath, FileOpenOptions};
use crate::readers::helpers::path_to_fpath;

use std::fs::File;
#[allow(unused_imports)] // XXX: clippy wrongly marks this as unused
use std::io::Write; // for `NamedTempFile.write_all`

use ::lazy_static::lazy_static;
use ::si_trace_print::{defn, defx, defñ};

#[doc(hidden)]
pub use ::tempfile::NamedTempFile;
#[doc(hidden)]
pub use ::tempfile::TempDir;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// temporary file helper functions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// NamedTempFile instances default to this file name prefix.
///
/// A known prefix makes leftover files easy to find and remove.
/// See <https://github.com/Stebalien/tempfile/issues/183>.
pub const STR_TEMPFILE_PREFIX: &str = "tmp-ltm-test-";

lazy_static! {
    pub static ref STRING_TEMPFILE_PREFIX: String = String::from(STR_TEMPFILE_PREFIX);
}

/// Small helper function for copying `NamedTempFile` path to a `FPath`.
pub fn ntf_fpath(ntf: &NamedTempFile) -> FPath {
    path_to_fpath(ntf.path())
}

/// Testing helper function to write a `[u8]` to a temporary file.
pub fn create_temp_file_bytes(data: &[u8]) -> NamedTempFile {
    let mut ntf = match ::tempfile::Builder::new()
        .prefix::<str>(&STRING_TEMPFILE_PREFIX)
        .tempfile()
    {
        Ok(val) => val,
        Err(err) => {
            panic!("tempfile::Builder::new()..tempfile() return Err {}", err);
        }
    };
    match ntf.write_all(data) {
        Ok(_) => {}
        Err(err) => {
            panic!("NamedTempFile::write_all() return Err {}", err);
        }
    }

    ntf
}

/// Testing helper function to write a `str` to a temporary file.
///
/// BUG: `NamedTempFile` created within `lazy_static` will fail to remove itself
///      <https://github.com/Stebalien/tempfile/issues/183>.
pub fn create_temp_file(data: &str) -> NamedTempFile {
    create_temp_file_bytes(data.as_bytes())
}

/// Create a temporary directory.
/// Used as a throwaway state directory.
pub fn create_temp_dir() -> TempDir {
    defñ!();
    match ::tempfile::Builder::new()
        .prefix::<str>(&STRING_TEMPFILE_PREFIX)
        .tempdir()
    {
        Ok(val) => val,
        Err(err) => panic!("tempfile::Builder::new()..tempdir() return Err {}", err),
    }
}

/// Path of `name` within `tmpdir`. The file is not created.
pub fn fpath_in_tmpdir(tmpdir: &TempDir, name: &str) -> FPath {
    path_to_fpath(tmpdir.path().join(name).as_path())
}

/// Append `data` to the file at `path`, as a log writer would.
pub fn append_file_bytes(path: &FPath, data: &[u8]) {
    defn!("({:?}, {} bytes)", path, data.len());
    let mut file_: File = match FileOpenOptions::new()
        .append(true)
        .open(path)
    {
        Ok(val) => val,
        Err(err) => panic!("append open {:?} Error {}", path, err),
    };
    if let Err(err) = file_.write_all(data) {
        panic!("append write {:?} Error {}", path, err);
    }
    defx!();
}

/// Create or replace the file at `path` with `data`.
///
/// Replacing via a new file gives the path a new inode, like `logrotate`
/// moving the old file away and the writer creating a fresh one.
pub fn replace_file_bytes(path: &FPath, data: &[u8]) {
    defn!("({:?}, {} bytes)", path, data.len());
    let _ = std::fs::remove_file(path);
    if let Err(err) = std::fs::write(path, data) {
        panic!("write {:?} Error {}", path, err);
    }
    defx!();
}

/// Truncate the file at `path` in place (same inode) to hold `data`.
pub fn truncate_file_bytes(path: &FPath, data: &[u8]) {
    defn!("({:?}, {} bytes)", path, data.len());
    let mut file_: File = match FileOpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
    {
        Ok(val) => val,
        Err(err) => panic!("truncate open {:?} Error {}", path, err),
    };
    if let Err(err) = file_.write_all(data) {
        panic!("truncate write {:?} Error {}", path, err);
    }
    defx!();
}
