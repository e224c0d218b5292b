//! Output files: VTK image-data snapshots of the macroscopic fields and
//! plain-text debug dumps of the classification map and distributions.
//!
//! The writers in [`vtk`] and [`dump`] take plain slices and any
//! [`std::io::Write`], so they run without a device. This module adds file
//! naming and directory creation on top.

pub mod dump;
pub mod vtk;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use kernel::geometry::digits;

use crate::error::{SimulationError, SimulationResult};

/// `{dir}/lbmcl.{iteration}.vti`, the iteration zero-padded to the digit
/// count of `iterations`.
pub fn snapshot_path(dir: impl AsRef<Path>, iteration: usize, iterations: usize) -> PathBuf {
    let width = digits(iterations);
    dir.as_ref().join(format!("lbmcl.{iteration:0width$}.vti"))
}

/// `{dir}/map.dump`.
pub fn map_dump_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join("map.dump")
}

/// `{dir}/f_{iteration}.dump`, padded like [`snapshot_path`].
pub fn distribution_dump_path(dir: impl AsRef<Path>, iteration: usize, iterations: usize) -> PathBuf {
    let width = digits(iterations);
    dir.as_ref().join(format!("f_{iteration:0width$}.dump"))
}

/// Create `path` (and its parent directories) and fill it with `write`.
pub fn write_file<F>(path: &Path, write: F) -> SimulationResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(SimulationError::io(parent))?;
    }
    let file = File::create(path).map_err(SimulationError::io(path))?;
    let mut out = BufWriter::new(file);
    write(&mut out)
        .and_then(|()| out.flush())
        .map_err(SimulationError::io(path))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

pub(crate) fn check_len(name: &str, len: usize, needed: usize) -> io::Result<()> {
    if len < needed {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{name} holds {len} values, lattice needs {needed}"),
        ));
    }
    Ok(())
}
