// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::HashMap;

use arrayvec::ArrayVec;
use lithomark_geom::Point;

use crate::pool::BufferPool;
use crate::regions::Component;

/// An oriented boundary of a component.
///
/// Coordinates are image-space pixel centers, i.e. pixel `(x, y)` contributes
/// the sample point `(x + 0.5, y + 0.5)`. With image axes (y grows downward)
/// the outer ring has positive signed area and holes have negative one.
#[derive(Clone, Debug)]
pub struct Contour {
    /// The outer boundary.
    pub outer: Vec<Point>,
    /// Inner hole boundaries.
    pub holes: Vec<Vec<Point>>,
}

// A segment endpoint on the half-integer grid, stored at 2x so it hashes
// exactly.
type GridPoint = (i32, i32);

/// Traces the component boundary with marching squares and simplifies it.
///
/// `tolerance` is the Ramer-Douglas-Peucker threshold in pixel units.
///
/// A component usually produces a single contour, but noise pixels merged in
/// from dissolved specks can form disjoint islands; every island becomes its
/// own contour. Returns an empty list when the component degenerates below a
/// triangle.
pub(crate) fn trace_component(
    component: &Component,
    tolerance: f32,
    pool: &mut BufferPool,
) -> Vec<Contour> {
    // One sample of padding on every side so boundary cells close properly.
    let w = component.bounds.width() as usize + 2;
    let h = component.bounds.height() as usize + 2;
    let ox = component.bounds.x() - 1;
    let oy = component.bounds.y() - 1;

    let mut mask = pool.acquire_u8(w * h);
    for &(x, y) in &component.pixels {
        let lx = (x as i32 - ox) as usize;
        let ly = (y as i32 - oy) as usize;
        mask[ly * w + lx] = 1;
    }

    let loops = trace_mask(&mask, w, h);
    pool.release_u8(mask);

    let mut rings: Vec<Vec<Point>> = Vec::with_capacity(loops.len());
    for mut ring in loops {
        // Translate the half-integer grid into image coordinates.
        for p in &mut ring {
            p.x = p.x + ox as f32 + 0.5;
            p.y = p.y + oy as f32 + 0.5;
        }
        let ring = simplify_ring(&ring, tolerance);
        if ring.len() >= 3 {
            rings.push(ring);
        }
    }

    nest_rings(rings)
}

/// Sorts traced rings into outer boundaries and their holes by containment
/// depth: a ring inside an even number of other rings is an outer boundary,
/// a ring at odd depth is a hole of its immediate parent.
fn nest_rings(mut rings: Vec<Vec<Point>>) -> Vec<Contour> {
    if rings.is_empty() {
        return Vec::new();
    }

    // Largest first, so parents precede their children.
    rings.sort_by(|a, b| {
        signed_area(b)
            .abs()
            .partial_cmp(&signed_area(a).abs())
            .unwrap()
    });

    let n = rings.len();
    let mut parent = vec![usize::MAX; n];
    let mut depth = vec![0usize; n];
    for i in 0..n {
        // The smallest ring containing this one is its immediate parent;
        // loop vertices of distinct mask boundaries never touch, so testing
        // a single vertex is enough.
        for j in (0..i).rev() {
            if point_in_ring(rings[i][0], &rings[j]) {
                parent[i] = j;
                depth[i] = depth[j] + 1;
                break;
            }
        }
    }

    let mut contours = Vec::new();
    let mut contour_of = vec![usize::MAX; n];
    for (i, mut ring) in rings.into_iter().enumerate() {
        let owner = if depth[i] % 2 == 1 {
            contour_of[parent[i]]
        } else {
            usize::MAX
        };

        if owner == usize::MAX {
            // An outer boundary. Odd-depth rings with no resolvable parent
            // (crossing loops from an inconsistent mask) are promoted too,
            // which keeps them solid instead of punching a stray hole.
            orient(&mut ring, true);
            contour_of[i] = contours.len();
            contours.push(Contour {
                outer: ring,
                holes: Vec::new(),
            });
        } else {
            orient(&mut ring, false);
            contours[owner].holes.push(ring);
        }
    }

    contours
}

/// Ray-casting point-in-polygon test.
fn point_in_ring(p: Point, ring: &[Point]) -> bool {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if x > p.x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Runs marching squares over the mask and chains the emitted segments into
/// closed loops. Mask samples sit on integer grid positions; the emitted
/// vertices sit on edge midpoints, i.e. the half-integer grid.
fn trace_mask(mask: &[u8], w: usize, h: usize) -> Vec<Vec<Point>> {
    let mut segments: Vec<(GridPoint, GridPoint)> = Vec::new();

    for cy in 0..h - 1 {
        for cx in 0..w - 1 {
            let tl = mask[cy * w + cx];
            let tr = mask[cy * w + cx + 1];
            let br = mask[(cy + 1) * w + cx + 1];
            let bl = mask[(cy + 1) * w + cx];
            let case = tl | (tr << 1) | (br << 2) | (bl << 3);

            // Edge midpoints of the cell, at doubled coordinates.
            let x2 = cx as i32 * 2;
            let y2 = cy as i32 * 2;
            let top = (x2 + 1, y2);
            let right = (x2 + 2, y2 + 1);
            let bottom = (x2 + 1, y2 + 2);
            let left = (x2, y2 + 1);

            let mut emit: ArrayVec<(GridPoint, GridPoint), 2> = ArrayVec::new();
            match case {
                0 | 15 => {}
                1 | 14 => emit.push((left, top)),
                2 | 13 => emit.push((top, right)),
                3 | 12 => emit.push((left, right)),
                4 | 11 => emit.push((right, bottom)),
                6 | 9 => emit.push((top, bottom)),
                7 | 8 => emit.push((left, bottom)),
                5 => {
                    // Saddle: top-left and bottom-right are set. The denser
                    // the neighborhood, the more likely the two blobs are
                    // actually connected across this cell.
                    if saddle_connects(mask, w, h, cx, cy) {
                        emit.push((top, right));
                        emit.push((bottom, left));
                    } else {
                        emit.push((left, top));
                        emit.push((right, bottom));
                    }
                }
                10 => {
                    // Saddle: top-right and bottom-left are set.
                    if saddle_connects(mask, w, h, cx, cy) {
                        emit.push((left, top));
                        emit.push((right, bottom));
                    } else {
                        emit.push((top, right));
                        emit.push((bottom, left));
                    }
                }
                _ => unreachable!(),
            }

            segments.extend(emit);
        }
    }

    chain_segments(segments)
}

/// The saddle rule: connect the set corners when the surrounding 4x4 sample
/// window is at least half set. One consistent rule for both saddle cases
/// keeps outer and hole contours from crossing.
fn saddle_connects(mask: &[u8], w: usize, h: usize, cx: usize, cy: usize) -> bool {
    let mut set = 0u32;
    let mut count = 0u32;
    for sy in cy.saturating_sub(1)..(cy + 3).min(h) {
        for sx in cx.saturating_sub(1)..(cx + 3).min(w) {
            set += mask[sy * w + sx] as u32;
            count += 1;
        }
    }
    set * 2 >= count
}

/// Chains unordered segments into closed loops by walking shared endpoints.
fn chain_segments(segments: Vec<(GridPoint, GridPoint)>) -> Vec<Vec<Point>> {
    let mut incident: HashMap<GridPoint, ArrayVec<u32, 4>> = HashMap::new();
    for (i, &(a, b)) in segments.iter().enumerate() {
        incident.entry(a).or_default().push(i as u32);
        incident.entry(b).or_default().push(i as u32);
    }

    let mut used = vec![false; segments.len()];
    let mut loops = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }

        used[start] = true;
        let (first, mut current) = segments[start];
        let mut ring = vec![grid_to_point(first)];

        while current != first {
            ring.push(grid_to_point(current));

            let next = incident
                .get(&current)
                .and_then(|ids| ids.iter().find(|&&i| !used[i as usize]).copied());

            let next = match next {
                Some(i) => i,
                // An open chain; the mask was inconsistent. Drop it.
                None => return chain_drop_open(segments, used, loops, start),
            };

            used[next as usize] = true;
            let (a, b) = segments[next as usize];
            current = if a == current { b } else { a };
        }

        loops.push(ring);
    }

    loops
}

// Cold path: an endpoint had no continuation, so the current chain cannot
// close. Finish the remaining chains and return whatever closed properly.
fn chain_drop_open(
    segments: Vec<(GridPoint, GridPoint)>,
    used: Vec<bool>,
    mut loops: Vec<Vec<Point>>,
    _failed: usize,
) -> Vec<Vec<Point>> {
    log::warn!("contour: open segment chain dropped");
    let remaining: Vec<_> = segments
        .iter()
        .enumerate()
        .filter(|(i, _)| !used[*i])
        .map(|(_, &s)| s)
        .collect();
    if !remaining.is_empty() {
        loops.extend(chain_segments(remaining));
    }
    loops
}

fn grid_to_point(p: GridPoint) -> Point {
    Point::from_xy(p.0 as f32 / 2.0, p.1 as f32 / 2.0)
}

/// Shoelace formula. Positive for counter-clockwise rings in y-down image
/// space following our chaining order convention.
pub(crate) fn signed_area(ring: &[Point]) -> f32 {
    let mut area = 0.0;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        area += a.x * b.y - b.x * a.y;
    }
    area * 0.5
}

fn orient(ring: &mut Vec<Point>, positive: bool) {
    let area = signed_area(ring);
    if (area > 0.0) != positive {
        ring.reverse();
    }
}

/// Ramer-Douglas-Peucker on a closed ring.
///
/// The ring is split at its two mutually farthest anchor points and each half
/// is simplified with an explicit stack, so deep polylines cannot overflow.
fn simplify_ring(ring: &[Point], tolerance: f32) -> Vec<Point> {
    if ring.len() <= 4 || tolerance <= 0.0 {
        return ring.to_vec();
    }

    // Anchor 0 and the point farthest from it.
    let mut far = 1;
    let mut far_d = 0.0;
    for (i, p) in ring.iter().enumerate().skip(1) {
        let d = p.distance_sq(ring[0]);
        if d > far_d {
            far_d = d;
            far = i;
        }
    }

    let mut keep = vec![false; ring.len()];
    keep[0] = true;
    keep[far] = true;
    rdp_mark(ring, 0, far, tolerance, &mut keep);
    rdp_mark_wrapped(ring, far, tolerance, &mut keep);

    ring.iter()
        .zip(&keep)
        .filter(|(_, &k)| k)
        .map(|(p, _)| *p)
        .collect()
}

fn rdp_mark(ring: &[Point], from: usize, to: usize, tolerance: f32, keep: &mut [bool]) {
    let mut stack = vec![(from, to)];
    while let Some((a, b)) = stack.pop() {
        if b <= a + 1 {
            continue;
        }

        let mut worst = a;
        let mut worst_d = 0.0;
        for i in a + 1..b {
            let d = perpendicular_distance(ring[i], ring[a], ring[b]);
            if d > worst_d {
                worst_d = d;
                worst = i;
            }
        }

        if worst_d > tolerance {
            keep[worst] = true;
            stack.push((a, worst));
            stack.push((worst, b));
        }
    }
}

// The second half of the ring wraps around the end of the vertex array.
fn rdp_mark_wrapped(ring: &[Point], far: usize, tolerance: f32, keep: &mut [bool]) {
    let n = ring.len();
    let wrapped: Vec<Point> = (far..far + (n - far) + 1)
        .map(|i| ring[i % n])
        .collect();

    let mut wrapped_keep = vec![false; wrapped.len()];
    wrapped_keep[0] = true;
    *wrapped_keep.last_mut().unwrap() = true;
    rdp_mark(&wrapped, 0, wrapped.len() - 1, tolerance, &mut wrapped_keep);

    for (j, &k) in wrapped_keep.iter().enumerate() {
        if k {
            keep[(far + j) % n] = true;
        }
    }
}

fn perpendicular_distance(p: Point, a: Point, b: Point) -> f32 {
    let ab = b - a;
    let len = ab.length();
    if len <= f32::EPSILON {
        return p.distance(a);
    }
    ((p - a).cross(ab) / len).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithomark_geom::IntRect;

    fn component_from_mask(w: u32, h: u32, rows: &[&str]) -> Component {
        let mut pixels = Vec::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    pixels.push((x as u32, y as u32));
                }
            }
        }
        let area = pixels.len();
        Component {
            layer: 0,
            pixels,
            bounds: IntRect::from_xywh(0, 0, w, h).unwrap(),
            area,
        }
    }

    fn trace(component: &Component, tolerance: f32) -> Vec<Contour> {
        let mut pool = BufferPool::new();
        trace_component(component, tolerance, &mut pool)
    }

    #[test]
    fn single_pixel_is_a_diamond() {
        let comp = component_from_mask(1, 1, &["#"]);
        let contours = trace(&comp, 0.0);
        assert_eq!(contours.len(), 1);
        let contour = &contours[0];
        assert_eq!(contour.outer.len(), 4);
        assert!(contour.holes.is_empty());
        // CCW in image space: positive shoelace area.
        assert!(signed_area(&contour.outer) > 0.0);
        assert_eq!(signed_area(&contour.outer), 0.5);
    }

    #[test]
    fn square_block() {
        let comp = component_from_mask(3, 3, &["###", "###", "###"]);
        let contours = trace(&comp, 0.0);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].holes.is_empty());
        // A 3x3 block at half resolution covers roughly its pixel area.
        let area = signed_area(&contours[0].outer);
        assert!(area > 5.0 && area < 9.5, "area = {}", area);
    }

    #[test]
    fn ring_has_one_hole() {
        let comp = component_from_mask(
            5,
            5,
            &["#####", "#####", "##.##", "#####", "#####"],
        );
        let contours = trace(&comp, 0.0);
        assert_eq!(contours.len(), 1);
        let contour = &contours[0];
        assert_eq!(contour.holes.len(), 1);
        assert!(signed_area(&contour.outer) > 0.0);
        assert!(signed_area(&contour.holes[0]) < 0.0);
        // The hole is the single void pixel's diamond.
        assert_eq!(contour.holes[0].len(), 4);
    }

    #[test]
    fn disjoint_blobs_become_separate_contours() {
        // Two islands in one pixel set, as left behind by speck merging.
        let comp = component_from_mask(
            7,
            3,
            &["##...##", "##...##", "##...##"],
        );
        let contours = trace(&comp, 0.0);
        assert_eq!(contours.len(), 2);
        assert!(contours.iter().all(|c| c.holes.is_empty()));
        assert!(contours.iter().all(|c| signed_area(&c.outer) > 0.0));
    }

    #[test]
    fn simplification_straightens_edges() {
        let comp = component_from_mask(8, 3, &["########", "########", "########"]);
        let rough = trace(&comp, 0.0);
        let simplified = trace(&comp, 0.75);
        assert!(simplified[0].outer.len() < rough[0].outer.len());
        assert!(simplified[0].outer.len() >= 3);
    }

    #[test]
    fn empty_component_traces_nothing() {
        let comp = Component {
            layer: 0,
            pixels: Vec::new(),
            bounds: IntRect::from_xywh(0, 0, 1, 1).unwrap(),
            area: 0,
        };
        assert!(trace(&comp, 0.0).is_empty());
    }

    #[test]
    fn rdp_keeps_corners() {
        let square = vec![
            Point::from_xy(0.0, 0.0),
            Point::from_xy(5.0, 0.0),
            Point::from_xy(10.0, 0.0),
            Point::from_xy(10.0, 10.0),
            Point::from_xy(0.0, 10.0),
        ];
        let simplified = simplify_ring(&square, 0.5);
        assert_eq!(simplified.len(), 4);
        assert!(!simplified.contains(&Point::from_xy(5.0, 0.0)));
    }
}
