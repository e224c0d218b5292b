//! ASCII VTK image-data snapshots of density and velocity.
//!
//! Only the interior `1..dim-1` of every axis is written, so both extents are
//! `0..dim-3`. Values use C-style scientific notation with 16 fractional
//! digits (`1.0000000000000000e+00`), each followed by one space, one text
//! line per `(y, z)` row.

use std::io::{self, Write};

use kernel::geometry::{cell_index, velocity_index};
use kernel::Real;

use super::check_len;

/// Fractional digits of every value.
pub const VTK_PRECISION: usize = 16;

/// Format `value` like C's `%.{precision}e`: signed, at least two exponent
/// digits.
pub fn scientific(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let formatted = format!("{value:.precision$e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        }
        None => formatted,
    }
}

/// Write one snapshot of a lattice of side `dim`.
///
/// `rho` holds one value per cell, `u` three per cell, both indexed like the
/// device buffers.
pub fn write_snapshot<W: Write, T: Real>(out: &mut W, dim: usize, rho: &[T], u: &[T]) -> io::Result<()> {
    if dim < 3 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("dim {dim} has no interior"),
        ));
    }
    let cells = dim * dim * dim;
    check_len("rho", rho.len(), cells)?;
    check_len("u", u.len(), cells * 3)?;

    let (from, to) = (1, dim - 1);
    let extent = to - from - 1;
    let data_type = T::PRECISION.vtk_type();

    writeln!(out, "<?xml version=\"1.0\"?>")?;
    writeln!(
        out,
        "<VTKFile type=\"ImageData\" version=\"0.1\" byte_order=\"LittleEndian\" header_type=\"UInt64\">"
    )?;
    writeln!(
        out,
        "  <ImageData WholeExtent=\"0 {extent} 0 {extent} 0 {extent}\" Origin=\"0 0 0\" Spacing=\"1 1 1\">"
    )?;
    writeln!(out, "    <Piece Extent=\"0 {extent} 0 {extent} 0 {extent}\">")?;
    writeln!(out, "      <PointData Scalars=\"rho\">")?;

    writeln!(
        out,
        "        <DataArray type=\"{data_type}\" Name=\"rho\" NumberOfComponents=\"1\" format=\"ascii\">"
    )?;
    for z in from..to {
        for y in from..to {
            for x in from..to {
                let value = rho[cell_index(x, y, z, dim)].to_f64();
                write!(out, "{} ", scientific(value, VTK_PRECISION))?;
            }
            writeln!(out)?;
        }
    }
    writeln!(out, "        </DataArray>")?;

    writeln!(
        out,
        "        <DataArray type=\"{data_type}\" Name=\"v\" NumberOfComponents=\"3\" format=\"ascii\">"
    )?;
    for z in from..to {
        for y in from..to {
            for x in from..to {
                let id = cell_index(x, y, z, dim);
                for c in 0..3 {
                    let value = u[velocity_index(id, c)].to_f64();
                    write!(out, "{} ", scientific(value, VTK_PRECISION))?;
                }
            }
            writeln!(out)?;
        }
    }
    writeln!(out, "        </DataArray>")?;

    writeln!(out, "      </PointData>")?;
    writeln!(out, "    </Piece>")?;
    writeln!(out, "  </ImageData>")?;
    writeln!(out, "</VTKFile>")
}
