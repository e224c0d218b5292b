//! Plain-text debug dumps.
//!
//! - Map dump: a legend of the five category codes, then one block per z
//!   plane, one line per y row, one code per x followed by a space.
//! - Distribution dump: per row, a header with the direction indices, then
//!   one line per cell with its coordinates and all `Q` populations in
//!   fixed notation.
//!
//! Both separate rows blocks and planes with blank lines and end with one
//! extra blank line.

use std::io::{self, Write};

use kernel::cell;
use kernel::geometry::{cell_index, digits, population_index, Q};
use kernel::Real;

use super::check_len;

/// Fractional digits of a dumped population.
pub const DUMP_PRECISION: usize = 6;

const LEGEND: [(&str, i32); 5] = [
    ("FLUID", 1),
    ("MOVING", 2),
    ("BOUNDARY", 3),
    ("WALL", 4),
    ("CORNER", 5),
];

/// Write the classification map of a lattice of side `dim`.
pub fn write_map<W: Write>(out: &mut W, dim: usize, map: &[i32]) -> io::Result<()> {
    check_len("map", map.len(), dim * dim * dim)?;

    for (name, code) in LEGEND {
        writeln!(out, "# {name:<12}{code}")?;
    }
    writeln!(out)?;

    for z in 0..dim {
        for y in 0..dim {
            for x in 0..dim {
                write!(out, "{} ", cell::dump_code(map[cell_index(x, y, z, dim)]))?;
            }
            writeln!(out)?;
        }
        writeln!(out)?;
    }
    writeln!(out)
}

/// Write every population of a lattice of side `dim` stored with block
/// width `stride`.
pub fn write_distribution<W: Write, T: Real>(
    out: &mut W,
    dim: usize,
    stride: usize,
    f: &[T],
) -> io::Result<()> {
    let cells = dim * dim * dim;
    if cells > 0 {
        check_len("f", f.len(), population_index(cells - 1, Q - 1, stride.max(1)) + 1)?;
    }

    // "(x,y,z) "
    let width = digits(dim);
    let label_width = 3 * width + 5;
    let column = DUMP_PRECISION + 2;
    let precision = DUMP_PRECISION;

    for z in 0..dim {
        for y in 0..dim {
            write!(out, "{:label_width$}", "")?;
            for q in 0..Q {
                write!(out, "{q:>column$} ")?;
            }
            writeln!(out)?;

            for x in 0..dim {
                let id = cell_index(x, y, z, dim);
                write!(out, "({x:>width$},{y:>width$},{z:>width$}) ")?;
                for q in 0..Q {
                    let value = f[population_index(id, q, stride.max(1))].to_f64();
                    write!(out, "{value:>column$.precision$} ")?;
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }
        writeln!(out)?;
    }
    writeln!(out)
}
