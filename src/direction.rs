use crate::{Point, Vertex};

/// A line through the origin that vertices are projected onto.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Direction {
    pub dx: f64,
    pub dy: f64,
}

impl Direction {
    /// Vertical, horizontal and the two diagonals, in the order they are tried.
    pub const CANDIDATES: [Direction; 4] = [
        Direction { dx: 0.0, dy: 1.0 },
        Direction { dx: 1.0, dy: 0.0 },
        Direction { dx: 1.0, dy: 1.0 },
        Direction { dx: 1.0, dy: -1.0 },
    ];

    /// Position of the point along this direction. Axis-aligned directions use
    /// the raw coordinate, diagonals the signed length of the orthogonal
    /// projection onto the unit vector.
    pub fn project(&self, p: &Point) -> f64 {
        if self.dx == 0.0 {
            return p.y;
        }
        if self.dy == 0.0 {
            return p.x;
        }
        (p.x * self.dx + p.y * self.dy) / self.dx.hypot(self.dy)
    }
}

/// The chosen direction together with the vertices ordered along it.
#[derive(Clone, Debug)]
pub struct Projection {
    pub direction: Direction,
    pub spread: f64,
    /// Indices into the input slice, ascending by projection. Equal
    /// projections keep their input order.
    pub order: Vec<usize>,
}

/// Picks the candidate direction along which the vertices are stretched the
/// most. The first candidate wins ties. Returns `None` for an empty slice.
pub fn select_direction(vertices: &[Vertex]) -> Option<Projection> {
    if vertices.is_empty() {
        return None;
    }

    let mut best = Direction::CANDIDATES[0];
    let mut max_spread = f64::NEG_INFINITY;
    for direction in Direction::CANDIDATES {
        let (min, max) = vertices
            .iter()
            .map(|v| direction.project(&v.point))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p), hi.max(p))
            });
        let spread = max - min;
        if spread > max_spread {
            max_spread = spread;
            best = direction;
        }
    }

    let keys: Vec<f64> = vertices.iter().map(|v| best.project(&v.point)).collect();
    let mut order: Vec<usize> = (0..vertices.len()).collect();
    order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));

    log::trace!("direction ({}, {}) with spread {max_spread}", best.dx, best.dy);
    Some(Projection {
        direction: best,
        spread: max_spread,
        order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> Vec<Vertex> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Vertex::new(i as u64, x, y, 1))
            .collect()
    }

    #[test]
    fn horizontal_line_picks_x_axis() {
        let vertices = line(&[(3.0, 0.0), (1.0, 0.0), (0.0, 0.0), (2.0, 0.0)]);
        let projection = select_direction(&vertices).unwrap();
        assert_eq!(projection.direction, Direction { dx: 1.0, dy: 0.0 });
        assert_eq!(projection.spread, 3.0);
        assert_eq!(projection.order, vec![2, 1, 3, 0]);
    }

    #[test]
    fn ties_keep_input_order() {
        let vertices = line(&[(0.0, 1.0), (5.0, 0.0), (1.0, 1.0), (2.0, 0.0)]);
        let projection = select_direction(&vertices).unwrap();
        assert_eq!(projection.direction, Direction { dx: 1.0, dy: 0.0 });

        let vertical = line(&[(0.0, 0.0), (1.0, 0.0), (0.0, 9.0)]);
        let projection = select_direction(&vertical).unwrap();
        assert_eq!(projection.direction, Direction { dx: 0.0, dy: 1.0 });
        assert_eq!(projection.order, vec![0, 1, 2]);
    }

    #[test]
    fn diagonal_spread() {
        let vertices = line(&[(0.0, 0.0), (4.0, 4.0), (1.0, 1.2)]);
        let projection = select_direction(&vertices).unwrap();
        // Along (1, 1) the spread is 8 / sqrt(2), more than either axis.
        assert_eq!(projection.direction, Direction { dx: 1.0, dy: 1.0 });
        assert_eq!(projection.order, vec![0, 2, 1]);
    }

    #[test]
    fn empty_input() {
        assert!(select_direction(&[]).is_none());
    }
}
