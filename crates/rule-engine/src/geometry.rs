//! Planar geometry used by zone and line rules

use track_store::Position;

/// Even-odd ray-cast point-in-polygon test.
///
/// Points exactly on an edge may resolve either way; rule thresholds do
/// not depend on boundary inclusion.
pub fn point_in_polygon(point: Position, polygon: &[[f64; 2]]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let (x, y) = (point.x, point.y);
    let mut inside = false;
    let mut j = polygon.len() - 1;

    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i][0], polygon[i][1]);
        let (xj, yj) = (polygon[j][0], polygon[j][1]);

        let crosses = (yi > y) != (yj > y);
        if crosses {
            let x_at_y = (xj - xi) * (y - yi) / (yj - yi) + xi;
            if x < x_at_y {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

/// Arithmetic-mean centroid of the polygon vertices.
pub fn polygon_centroid(polygon: &[[f64; 2]]) -> Position {
    if polygon.is_empty() {
        return Position::default();
    }
    let n = polygon.len() as f64;
    let (sx, sy) = polygon
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    Position::new(sx / n, sy / n)
}

fn ccw(a: Position, b: Position, c: Position) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Proper segment intersection between movement (a1→a2) and line (b1→b2).
pub fn segments_intersect(a1: Position, a2: Position, b1: Position, b2: Position) -> bool {
    ccw(a1, b1, b2) != ccw(a2, b1, b2) && ccw(a1, a2, b1) != ccw(a1, a2, b2)
}

/// Z component of the cross product between the line vector (start→end)
/// and (point - start). Positive means the point lies to the left of the
/// line direction.
pub fn side_of_line(start: Position, end: Position, point: Position) -> f64 {
    (end.x - start.x) * (point.y - start.y) - (end.y - start.y) * (point.x - start.x)
}
