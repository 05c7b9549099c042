// ============================================================================
// SYMMETRY: mirror transforms and orbit closure
// ============================================================================

use std::collections::HashSet;

/// Mirror symmetry mode for painting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SymmetryMode {
    #[default]
    None,
    /// Point reflection through the grid center.
    Center,
    /// Left↔Right (vertical axis).
    Vertical,
    /// Top↔Bottom (horizontal axis).
    Horizontal,
    /// Reflection across the anti-diagonal (bottom-left to top-right).
    Diagonal45,
    /// Reflection across the main diagonal (top-left to bottom-right).
    Diagonal135,
    Cross,
    DiagonalCross,
    Octagonal,
}

/// A single mirror transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mirror {
    Center,
    Vertical,
    Horizontal,
    Diagonal45,
    Diagonal135,
}

impl SymmetryMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(SymmetryMode::None),
            "center" => Some(SymmetryMode::Center),
            "vertical" => Some(SymmetryMode::Vertical),
            "horizontal" => Some(SymmetryMode::Horizontal),
            "diagonal-45" | "diagonal45" => Some(SymmetryMode::Diagonal45),
            "diagonal-135" | "diagonal135" => Some(SymmetryMode::Diagonal135),
            "cross" => Some(SymmetryMode::Cross),
            "diagonal-cross" | "diagonalcross" => Some(SymmetryMode::DiagonalCross),
            "octagonal" => Some(SymmetryMode::Octagonal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymmetryMode::None => "none",
            SymmetryMode::Center => "center",
            SymmetryMode::Vertical => "vertical",
            SymmetryMode::Horizontal => "horizontal",
            SymmetryMode::Diagonal45 => "diagonal-45",
            SymmetryMode::Diagonal135 => "diagonal-135",
            SymmetryMode::Cross => "cross",
            SymmetryMode::DiagonalCross => "diagonal-cross",
            SymmetryMode::Octagonal => "octagonal",
        }
    }

    pub fn is_active(self) -> bool {
        self != SymmetryMode::None
    }

    /// Transforms applied by this mode (0–4).
    pub fn mirrors(self) -> &'static [Mirror] {
        match self {
            SymmetryMode::None => &[],
            SymmetryMode::Center => &[Mirror::Center],
            SymmetryMode::Vertical => &[Mirror::Vertical],
            SymmetryMode::Horizontal => &[Mirror::Horizontal],
            SymmetryMode::Diagonal45 => &[Mirror::Diagonal45],
            SymmetryMode::Diagonal135 => &[Mirror::Diagonal135],
            SymmetryMode::Cross => &[Mirror::Vertical, Mirror::Horizontal],
            SymmetryMode::DiagonalCross => &[Mirror::Diagonal45, Mirror::Diagonal135],
            SymmetryMode::Octagonal => &[
                Mirror::Vertical,
                Mirror::Horizontal,
                Mirror::Diagonal45,
                Mirror::Diagonal135,
            ],
        }
    }
}

/// Map `v` in `0..=extent-1` to `0..=1`; a 1-wide axis maps to 0.
fn normalize(v: i64, extent: u32) -> f64 {
    if extent <= 1 { 0.0 } else { v as f64 / (extent - 1) as f64 }
}

fn denormalize(n: f64, extent: u32) -> i64 {
    if extent <= 1 { 0 } else { (n * (extent - 1) as f64).round() as i64 }
}

impl Mirror {
    /// Apply to (x, y) on a `w × h` grid. The result may be out of bounds.
    pub fn apply(self, x: i64, y: i64, w: u32, h: u32) -> (i64, i64) {
        let wx = w as i64 - 1 - x;
        let hy = h as i64 - 1 - y;
        match self {
            Mirror::Center => (wx, hy),
            Mirror::Vertical => (wx, y),
            Mirror::Horizontal => (x, hy),
            Mirror::Diagonal135 => {
                let (nx, ny) = (normalize(x, w), normalize(y, h));
                (denormalize(ny, w), denormalize(nx, h))
            }
            Mirror::Diagonal45 => {
                let (nx, ny) = (normalize(x, w), normalize(y, h));
                (denormalize(1.0 - ny, w), denormalize(1.0 - nx, h))
            }
        }
    }
}

/// Every in-bounds cell that must be painted together with (x, y), seed first.
///
/// Runs the mirror set to a fixed point, so compositions such as
/// vertical∘horizontal are included even though only the generators are listed.
/// Diagonal mirrors round through normalized coordinates, which makes orbits on
/// non-square grids approximate.
pub fn compute_symmetry_targets(mode: SymmetryMode, x: u32, y: u32, w: u32, h: u32) -> Vec<(u32, u32)> {
    let seed = (x, y);
    let mirrors = mode.mirrors();
    if mirrors.is_empty() || x >= w || y >= h {
        return vec![seed];
    }

    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    let mut orbit = vec![seed];
    let mut frontier = vec![seed];
    seen.insert(seed);

    while let Some((px, py)) = frontier.pop() {
        for mirror in mirrors {
            let (mx, my) = mirror.apply(px as i64, py as i64, w, h);
            if mx < 0 || my < 0 || mx >= w as i64 || my >= h as i64 {
                continue;
            }
            let p = (mx as u32, my as u32);
            if seen.insert(p) {
                orbit.push(p);
                frontier.push(p);
            }
        }
    }
    orbit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
        v.sort();
        v
    }

    #[test]
    fn none_returns_seed_only() {
        assert_eq!(compute_symmetry_targets(SymmetryMode::None, 2, 3, 8, 8), vec![(2, 3)]);
    }

    #[test]
    fn octagonal_corner_orbit_is_the_four_corners() {
        let targets = compute_symmetry_targets(SymmetryMode::Octagonal, 0, 0, 8, 8);
        assert_eq!(sorted(targets), vec![(0, 0), (0, 7), (7, 0), (7, 7)]);
    }

    #[test]
    fn cross_includes_composed_reflection() {
        let targets = compute_symmetry_targets(SymmetryMode::Cross, 1, 2, 6, 6);
        assert_eq!(sorted(targets), vec![(1, 2), (1, 3), (4, 2), (4, 3)]);
    }

    #[test]
    fn center_cell_of_odd_grid_is_fixed() {
        let targets = compute_symmetry_targets(SymmetryMode::Octagonal, 2, 2, 5, 5);
        assert_eq!(targets, vec![(2, 2)]);
    }

    #[test]
    fn octagonal_generic_point_has_eight_images() {
        let targets = compute_symmetry_targets(SymmetryMode::Octagonal, 1, 2, 8, 8);
        assert_eq!(targets.len(), 8);
    }

    #[test]
    fn diagonal_on_non_square_grid_is_approximate() {
        // 4 wide, 7 tall: (1,0) normalizes to (1/3, 0) and lands on (0, 2),
        // which maps back to (1, 0) again; the orbit stays closed but the
        // mapping is not an exact reflection.
        let targets = compute_symmetry_targets(SymmetryMode::Diagonal135, 1, 0, 4, 7);
        assert_eq!(sorted(targets), vec![(0, 2), (1, 0)]);
    }

    #[test]
    fn out_of_bounds_seed_is_returned_unchanged() {
        assert_eq!(compute_symmetry_targets(SymmetryMode::Cross, 9, 9, 4, 4), vec![(9, 9)]);
    }
}
