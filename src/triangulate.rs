// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use lithomark_geom::Point;

/// Triangles below this signed area are dropped as degenerate, in mm^2.
pub(crate) const MIN_TRIANGLE_AREA: f32 = 1e-6;

/// Triangulates a polygon with holes by ear clipping.
///
/// The outer ring must be counter-clockwise (positive signed area) and holes
/// clockwise. Every hole is first joined to the outer ring through a bridge
/// to its rightmost vertex, producing one simple polygon; ears are then
/// clipped until three vertices remain.
///
/// Returns the vertex list and CCW triangles indexing into it, or `None` when
/// the polygon cannot be triangulated (e.g. it self-intersects).
pub(crate) fn triangulate_polygon(
    outer: &[Point],
    holes: &[Vec<Point>],
) -> Option<(Vec<Point>, Vec<[u32; 3]>)> {
    if outer.len() < 3 {
        return None;
    }

    let mut polygon = outer.to_vec();
    if !holes.is_empty() {
        // Bridge right-to-left so earlier bridges cannot block later ones.
        let mut ordered: Vec<&Vec<Point>> = holes.iter().filter(|h| h.len() >= 3).collect();
        ordered.sort_by(|a, b| {
            let ax = a.iter().map(|p| p.x).fold(f32::MIN, f32::max);
            let bx = b.iter().map(|p| p.x).fold(f32::MIN, f32::max);
            bx.partial_cmp(&ax).unwrap()
        });

        for hole in ordered {
            polygon = bridge_hole(&polygon, hole)?;
        }
    }

    let triangles = clip_ears(&polygon)?;
    Some((polygon, triangles))
}

/// Joins a hole into the polygon through a mutually visible vertex pair.
///
/// The classic rightmost-vertex construction: cast a ray from the hole's
/// rightmost vertex towards +x, find the closest polygon edge it hits and
/// bridge to the best visible vertex of that edge.
fn bridge_hole(polygon: &[Point], hole: &[Point]) -> Option<Vec<Point>> {
    let n = polygon.len();

    // The hole vertex with the largest x.
    let m_at = hole
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.x.partial_cmp(&b.x).unwrap())
        .map(|(i, _)| i)?;
    let m = hole[m_at];

    // Closest intersection of the +x ray with the polygon edges.
    let mut best: Option<(usize, f32)> = None;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y - m.y) * (b.y - m.y) > 0.0 {
            continue; // edge does not span the ray's scanline
        }
        let dy = b.y - a.y;
        if dy.abs() <= f32::EPSILON {
            continue;
        }
        let t = (m.y - a.y) / dy;
        let x = a.x + (b.x - a.x) * t;
        if x < m.x {
            continue;
        }
        if best.map_or(true, |(_, bx)| x < bx) {
            best = Some((i, x));
        }
    }

    let (edge_at, hit_x) = best?;
    let a = polygon[edge_at];
    let b = polygon[(edge_at + 1) % n];
    let hit = Point::from_xy(hit_x, m.y);

    // The visible candidate is the edge endpoint with the larger x. Reflex
    // polygon vertices inside the triangle (m, hit, candidate) may block the
    // bridge; if any exist, take the one with the smallest angle to the ray.
    let mut bridge_at = if a.x > b.x { edge_at } else { (edge_at + 1) % n };
    let mut blocking: Option<(usize, f32)> = None;
    for (i, &p) in polygon.iter().enumerate() {
        if i == bridge_at || p == m {
            continue;
        }
        if !point_in_triangle(p, m, hit, polygon[bridge_at]) {
            continue;
        }

        let dx = p.x - m.x;
        let dy = (p.y - m.y).abs();
        let tan = if dx.abs() <= f32::EPSILON {
            f32::MAX
        } else {
            dy / dx
        };
        if blocking.map_or(true, |(_, bt)| tan < bt) {
            blocking = Some((i, tan));
        }
    }
    if let Some((i, _)) = blocking {
        bridge_at = i;
    }

    // Splice: polygon up to the bridge vertex, the whole hole starting at its
    // rightmost vertex, then back across the bridge and around the polygon.
    let mut result = Vec::with_capacity(n + hole.len() + 2);
    result.extend_from_slice(&polygon[..=bridge_at]);
    for j in 0..=hole.len() {
        result.push(hole[(m_at + j) % hole.len()]);
    }
    result.extend_from_slice(&polygon[bridge_at..]);
    Some(result)
}

fn clip_ears(polygon: &[Point]) -> Option<Vec<[u32; 3]>> {
    let n = polygon.len();
    if n < 3 {
        return None;
    }

    let mut indices: Vec<u32> = (0..n as u32).collect();
    let mut triangles = Vec::with_capacity(n.saturating_sub(2));

    let mut guard = 0usize;
    let max_steps = n * n + 16;

    while indices.len() > 3 {
        let len = indices.len();
        let mut clipped = false;

        for i in 0..len {
            let prev = polygon[indices[(i + len - 1) % len] as usize];
            let cur = polygon[indices[i] as usize];
            let next = polygon[indices[(i + 1) % len] as usize];

            if !is_ear(polygon, &indices, i, prev, cur, next) {
                continue;
            }

            let tri = [
                indices[(i + len - 1) % len],
                indices[i],
                indices[(i + 1) % len],
            ];
            if triangle_area(prev, cur, next) >= MIN_TRIANGLE_AREA {
                triangles.push(tri);
            }
            indices.remove(i);
            clipped = true;
            break;
        }

        if !clipped {
            // No ear found; either the polygon is degenerate (collinear
            // leftovers) or it self-intersects.
            let degenerate = indices
                .windows(3)
                .all(|w| {
                    triangle_area(
                        polygon[w[0] as usize],
                        polygon[w[1] as usize],
                        polygon[w[2] as usize],
                    ) < MIN_TRIANGLE_AREA
                });
            if degenerate {
                return Some(triangles);
            }
            return None;
        }

        guard += 1;
        if guard > max_steps {
            return None;
        }
    }

    let tri = [indices[0], indices[1], indices[2]];
    let area = triangle_area(
        polygon[tri[0] as usize],
        polygon[tri[1] as usize],
        polygon[tri[2] as usize],
    );
    if area >= MIN_TRIANGLE_AREA {
        triangles.push(tri);
    }

    Some(triangles)
}

fn is_ear(
    polygon: &[Point],
    indices: &[u32],
    i: usize,
    prev: Point,
    cur: Point,
    next: Point,
) -> bool {
    // Convex corner in a CCW polygon.
    if (cur - prev).cross(next - cur) <= 0.0 {
        return false;
    }

    // No remaining vertex may sit inside the candidate ear.
    let len = indices.len();
    for j in 0..len {
        if j == i || j == (i + len - 1) % len || j == (i + 1) % len {
            continue;
        }
        let p = polygon[indices[j] as usize];
        // Bridge duplicates share coordinates with ear corners; they do not
        // block the ear.
        if p == prev || p == cur || p == next {
            continue;
        }
        if point_in_triangle(p, prev, cur, next) {
            return false;
        }
    }

    true
}

pub(crate) fn triangle_area(a: Point, b: Point, c: Point) -> f32 {
    ((b - a).cross(c - a) * 0.5).abs()
}

fn point_in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let d1 = (p - a).cross(b - a);
    let d2 = (p - b).cross(c - b);
    let d3 = (p - c).cross(a - c);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ccw_square(size: f32) -> Vec<Point> {
        vec![
            Point::from_xy(0.0, 0.0),
            Point::from_xy(size, 0.0),
            Point::from_xy(size, size),
            Point::from_xy(0.0, size),
        ]
    }

    fn total_area(vertices: &[Point], triangles: &[[u32; 3]]) -> f32 {
        triangles
            .iter()
            .map(|t| {
                triangle_area(
                    vertices[t[0] as usize],
                    vertices[t[1] as usize],
                    vertices[t[2] as usize],
                )
            })
            .sum()
    }

    fn all_ccw(vertices: &[Point], triangles: &[[u32; 3]]) -> bool {
        triangles.iter().all(|t| {
            let a = vertices[t[0] as usize];
            let b = vertices[t[1] as usize];
            let c = vertices[t[2] as usize];
            (b - a).cross(c - a) > 0.0
        })
    }

    #[test]
    fn triangle_stays_a_triangle() {
        let tri = vec![
            Point::from_xy(0.0, 0.0),
            Point::from_xy(4.0, 0.0),
            Point::from_xy(2.0, 3.0),
        ];
        let (vertices, triangles) = triangulate_polygon(&tri, &[]).unwrap();
        assert_eq!(triangles.len(), 1);
        assert!((total_area(&vertices, &triangles) - 6.0).abs() < 1e-4);
    }

    #[test]
    fn square_becomes_two_triangles() {
        let (vertices, triangles) = triangulate_polygon(&ccw_square(10.0), &[]).unwrap();
        assert_eq!(triangles.len(), 2);
        assert!((total_area(&vertices, &triangles) - 100.0).abs() < 1e-3);
        assert!(all_ccw(&vertices, &triangles));
    }

    #[test]
    fn concave_polygon() {
        // An L-shape.
        let l = vec![
            Point::from_xy(0.0, 0.0),
            Point::from_xy(4.0, 0.0),
            Point::from_xy(4.0, 2.0),
            Point::from_xy(2.0, 2.0),
            Point::from_xy(2.0, 4.0),
            Point::from_xy(0.0, 4.0),
        ];
        let (vertices, triangles) = triangulate_polygon(&l, &[]).unwrap();
        assert_eq!(triangles.len(), 4);
        assert!((total_area(&vertices, &triangles) - 12.0).abs() < 1e-3);
        assert!(all_ccw(&vertices, &triangles));
    }

    #[test]
    fn square_with_hole() {
        let outer = ccw_square(10.0);
        // A CW hole in the middle.
        let hole = vec![
            Point::from_xy(4.0, 4.0),
            Point::from_xy(4.0, 6.0),
            Point::from_xy(6.0, 6.0),
            Point::from_xy(6.0, 4.0),
        ];
        let (vertices, triangles) = triangulate_polygon(&outer, &[hole]).unwrap();
        assert!((total_area(&vertices, &triangles) - 96.0).abs() < 1e-3);
        assert!(all_ccw(&vertices, &triangles));
    }

    #[test]
    fn two_holes() {
        let outer = ccw_square(20.0);
        let hole_a = vec![
            Point::from_xy(2.0, 2.0),
            Point::from_xy(2.0, 5.0),
            Point::from_xy(5.0, 5.0),
            Point::from_xy(5.0, 2.0),
        ];
        let hole_b = vec![
            Point::from_xy(12.0, 12.0),
            Point::from_xy(12.0, 16.0),
            Point::from_xy(16.0, 16.0),
            Point::from_xy(16.0, 12.0),
        ];
        let (vertices, triangles) = triangulate_polygon(&outer, &[hole_a, hole_b]).unwrap();
        assert!((total_area(&vertices, &triangles) - (400.0 - 9.0 - 16.0)).abs() < 1e-2);
        assert!(all_ccw(&vertices, &triangles));
    }

    #[test]
    fn degenerate_input() {
        assert!(triangulate_polygon(&[], &[]).is_none());
        assert!(triangulate_polygon(
            &[Point::from_xy(0.0, 0.0), Point::from_xy(1.0, 0.0)],
            &[]
        )
        .is_none());

        // Collinear points enclose no area.
        let line = vec![
            Point::from_xy(0.0, 0.0),
            Point::from_xy(1.0, 0.0),
            Point::from_xy(2.0, 0.0),
        ];
        let (_, triangles) = triangulate_polygon(&line, &[]).unwrap();
        assert!(triangles.is_empty());
    }
}
