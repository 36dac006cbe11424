//! Packing of local directory trees for upload
//!
//! Directory artifacts travel as a single gzip-compressed tarball. Build
//! output and VCS metadata are left behind: they are large, host specific,
//! and rebuilt on the target anyway.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io;
use std::path::Path;

/// Directory names never shipped to the host
pub const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "__pycache__", "target"];

/// File suffixes never shipped to the host
pub const SKIPPED_SUFFIXES: &[&str] = &[".pyc", ".log"];

/// Returns true if `name` should be left out of an upload archive
pub fn should_skip(name: &str, is_dir: bool) -> bool {
    if is_dir {
        SKIPPED_DIRS.contains(&name)
    } else {
        SKIPPED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
    }
}

/// Pack the contents of `source` into a `tar.gz` at `dest`
///
/// Entries are stored relative to `source`, so extracting with
/// `tar -xzf dest -C <dir>` recreates the tree under `<dir>`. Returns the
/// number of files written.
pub fn pack_dir(source: &Path, dest: &Path) -> io::Result<usize> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut count = 0;
    append_tree(&mut builder, source, Path::new(""), &mut count)?;

    builder.into_inner()?.finish()?;
    Ok(count)
}

fn append_tree<W: io::Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    relative: &Path,
    count: &mut usize,
) -> io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let file_type = entry.file_type()?;
        let is_dir = file_type.is_dir();

        if should_skip(&name_str, is_dir) {
            continue;
        }

        let path = entry.path();
        let archived = relative.join(&name);

        if is_dir {
            builder.append_dir(&archived, &path)?;
            append_tree(builder, &path, &archived, count)?;
        } else {
            builder.append_path_with_name(&path, &archived)?;
            *count += 1;
        }
    }

    Ok(())
}
