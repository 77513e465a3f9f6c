pub mod hybrid;
pub mod report;
pub mod retrieval;
pub mod store;
pub mod sync;
pub mod vector;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// `<path>.tmp`, the staging file for atomic writes.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    path.with_file_name(tmp_name)
}

/// Write `data` to a temp sibling and rename it over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
