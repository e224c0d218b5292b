//! Cell classification flags stored in the lattice map.
//!
//! The map holds one `i32` bit set per cell. Categories are tested through
//! the predicates below; the analysis dump turns them into the codes
//! 1 (fluid) .. 5 (corner) with [`dump_code`].

/// Cell updated by the collide/stream step.
pub const FLUID: i32 = 1 << 0;
/// Shell cell of the moving lid.
pub const MOVING: i32 = 1 << 1;
/// Fluid cell adjacent to the shell.
pub const BOUNDARY: i32 = 1 << 2;
/// Stationary shell cell.
pub const WALL: i32 = 1 << 3;
/// Shell cell shared by two or more faces.
pub const CORNER: i32 = 1 << 4;

/// Cell takes part in the collide/stream update.
#[inline]
pub fn is_fluid(cell: i32) -> bool {
    cell & FLUID != 0
}

/// Cell belongs to the moving lid.
#[inline]
pub fn is_moving(cell: i32) -> bool {
    cell & MOVING != 0
}

/// Fluid cell next to the shell.
#[inline]
pub fn is_boundary(cell: i32) -> bool {
    cell & BOUNDARY != 0
}

/// Stationary wall cell.
#[inline]
pub fn is_wall(cell: i32) -> bool {
    cell & WALL != 0
}

/// Edge or corner cell of the shell.
#[inline]
pub fn is_corner(cell: i32) -> bool {
    cell & CORNER != 0
}

/// Solid cells reflect populations instead of colliding.
#[inline]
pub fn is_solid(cell: i32) -> bool {
    cell & (MOVING | WALL | CORNER) != 0
}

/// Analysis code of a cell: 1 fluid, 2 moving, 3 boundary, 4 wall, 5 corner.
///
/// When several predicates match, the later category in that list wins.
/// A cell matching none yields 0.
pub fn dump_code(cell: i32) -> i32 {
    let mut code = 0;
    if is_fluid(cell) {
        code = 1;
    }
    if is_moving(cell) {
        code = 2;
    }
    if is_boundary(cell) {
        code = 3;
    }
    if is_wall(cell) {
        code = 4;
    }
    if is_corner(cell) {
        code = 5;
    }
    code
}

/// Classification of `(x, y, z)` for the lid-driven cavity: a closed box
/// whose `y = dim - 1` face moves along `x`.
pub fn cavity_cell(x: usize, y: usize, z: usize, dim: usize) -> i32 {
    let last = dim.saturating_sub(1);
    let on_face = |c: usize| c == 0 || c == last;
    let faces = [x, y, z].iter().filter(|&&c| on_face(c)).count();

    match faces {
        0 => {
            let near = |c: usize| c == 1 || c + 2 == dim;
            if near(x) || near(y) || near(z) {
                FLUID | BOUNDARY
            } else {
                FLUID
            }
        }
        1 if y == last => MOVING,
        1 => WALL,
        _ => CORNER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_categories_take_precedence() {
        assert_eq!(dump_code(FLUID), 1);
        assert_eq!(dump_code(MOVING), 2);
        assert_eq!(dump_code(FLUID | BOUNDARY), 3);
        assert_eq!(dump_code(WALL | FLUID), 4);
        assert_eq!(dump_code(CORNER | WALL | MOVING), 5);
        assert_eq!(dump_code(0), 0);
    }

    #[test]
    fn cavity_shell_classification() {
        let dim = 5;
        assert_eq!(cavity_cell(2, 2, 2, dim), FLUID);
        assert_eq!(cavity_cell(1, 2, 2, dim), FLUID | BOUNDARY);
        assert_eq!(cavity_cell(2, 4, 2, dim), MOVING);
        assert_eq!(cavity_cell(2, 0, 2, dim), WALL);
        assert_eq!(cavity_cell(0, 0, 2, dim), CORNER);
        assert_eq!(cavity_cell(4, 4, 4, dim), CORNER);
    }

    #[test]
    fn solid_cells_are_exactly_the_shell() {
        let dim = 4;
        for z in 0..dim {
            for y in 0..dim {
                for x in 0..dim {
                    let shell = [x, y, z].iter().any(|&c| c == 0 || c == dim - 1);
                    assert_eq!(is_solid(cavity_cell(x, y, z, dim)), shell);
                }
            }
        }
    }
}
