//! The conversion seam and output-path helpers.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Result, WatcherError};

/// Renders one source document into the output tree.
///
/// Implementations compute their own target with [`converted_path`], write
/// it, and return the path written. A failed conversion should leave no
/// output behind.
pub trait Converter: Send + Sync {
    fn convert(
        &self,
        source: &Path,
        content_root: &Path,
        output_root: &Path,
        out_format: &str,
    ) -> Result<PathBuf>;
}

impl<F> Converter for F
where
    F: Fn(&Path, &Path, &Path, &str) -> Result<PathBuf> + Send + Sync,
{
    fn convert(
        &self,
        source: &Path,
        content_root: &Path,
        output_root: &Path,
        out_format: &str,
    ) -> Result<PathBuf> {
        self(source, content_root, output_root, out_format)
    }
}

/// Replace the `content_root` prefix of `path` with `output_root`.
pub fn mirror_path(path: &Path, content_root: &Path, output_root: &Path) -> Result<PathBuf> {
    let relative = path
        .strip_prefix(content_root)
        .map_err(|_| WatcherError::OutsideRoot {
            path: path.to_path_buf(),
            root: content_root.to_path_buf(),
        })?;
    Ok(output_root.join(relative))
}

/// The mirrored path of `source` with its final extension replaced by `out_format`.
pub fn converted_path(
    source: &Path,
    content_root: &Path,
    output_root: &Path,
    out_format: &str,
) -> Result<PathBuf> {
    let mirrored = mirror_path(source, content_root, output_root)?;
    Ok(mirrored.with_extension(out_format.trim_start_matches('.')))
}

/// Write `bytes` to `target` through a temp file in the same directory.
///
/// Readers of `target` see either the old contents or the new ones, never a
/// partial write. On unix the file is created `0644`, subject to the umask.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = staging_file(target)?;
    tmp.write_all(bytes)?;
    tmp.as_file().flush()?;
    tmp.persist(target)?;
    Ok(())
}

/// Copy `source` byte for byte to `target` through a temp file, like [`write_atomic`].
///
/// The copy takes the permissions of `source`.
pub fn copy_atomic(source: &Path, target: &Path) -> Result<()> {
    let mut reader = File::open(source)?;
    let permissions = reader.metadata()?.permissions();
    let mut tmp = staging_file(target)?;
    std::io::copy(&mut reader, &mut tmp)?;
    tmp.as_file().flush()?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(target)?;
    Ok(())
}

/// Temp file next to `target`, created with the mode of an ordinary new file.
fn staging_file(target: &Path) -> Result<NamedTempFile> {
    #[cfg(unix)]
    let builder = {
        use std::os::unix::fs::PermissionsExt;

        let mut builder = tempfile::Builder::new();
        builder.permissions(std::fs::Permissions::from_mode(0o644));
        builder
    };
    #[cfg(not(unix))]
    let builder = tempfile::Builder::new();

    Ok(builder.tempfile_in(staging_dir(target))?)
}

fn staging_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
