// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use lithomark_geom::Point3;

use crate::mesh::Layer;

/// Vertices closer than this are merged by the welding pass, in mm.
pub(crate) const WELD_EPSILON: f32 = 1e-4;

/// Merges vertices within [`WELD_EPSILON`] and drops collapsed triangles.
///
/// Returns the number of removed vertices.
pub(crate) fn weld_vertices(layer: &mut Layer) -> usize {
    let before = layer.vertices.len();
    if before == 0 {
        return 0;
    }

    // Spatial hash on an epsilon grid; the 27 neighboring cells cover every
    // representative within tolerance of the cell borders.
    let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    let mut remap = vec![0u32; before];
    let mut kept: Vec<Point3> = Vec::with_capacity(before);

    let cell_of = |p: Point3| -> (i64, i64, i64) {
        (
            (p.x / WELD_EPSILON).floor() as i64,
            (p.y / WELD_EPSILON).floor() as i64,
            (p.z / WELD_EPSILON).floor() as i64,
        )
    };

    for (i, &p) in layer.vertices.iter().enumerate() {
        let cell = cell_of(p);
        let mut found = None;

        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (cell.0 + dx, cell.1 + dy, cell.2 + dz);
                    if let Some(candidates) = grid.get(&key) {
                        for &c in candidates {
                            if kept[c as usize].distance(p) <= WELD_EPSILON {
                                found = Some(c);
                                break 'search;
                            }
                        }
                    }
                }
            }
        }

        remap[i] = match found {
            Some(c) => c,
            None => {
                let index = kept.len() as u32;
                kept.push(p);
                grid.entry(cell).or_default().push(index);
                index
            }
        };
    }

    layer.vertices = kept;
    layer.triangles.retain_mut(|tri| {
        for corner in tri.iter_mut() {
            *corner = remap[*corner as usize];
        }
        tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]
    });

    before - layer.vertices.len()
}

// An edge-collapse candidate. The cost is how far the endpoints move to the
// midpoint; candidates go stale when either endpoint is touched afterwards.
struct Candidate {
    cost: f32,
    a: u32,
    b: u32,
    version: (u32, u32),
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert for cheapest-first.
        other.cost.total_cmp(&self.cost)
    }
}

/// Edge-collapse decimation towards `max_remove` removed vertices.
///
/// Candidates are processed cheapest-first; a collapse is rejected when it
/// would flip a triangle, create a non-manifold edge or move geometry by more
/// than `min_feature`. Returns the number of removed vertices.
pub(crate) fn decimate(layer: &mut Layer, max_remove: usize, min_feature: f32) -> usize {
    if max_remove == 0 || layer.triangles.len() < 8 {
        return 0;
    }

    let mut positions = layer.vertices.clone();
    let mut triangles = layer.triangles.clone();
    let mut alive: Vec<bool> = vec![true; triangles.len()];
    let mut versions = vec![0u32; positions.len()];

    // vertex -> incident triangle ids
    let mut incident: Vec<Vec<u32>> = vec![Vec::new(); positions.len()];
    for (t, tri) in triangles.iter().enumerate() {
        for &v in tri {
            incident[v as usize].push(t as u32);
        }
    }

    let mut heap = BinaryHeap::new();
    for tri in &triangles {
        for k in 0..3 {
            let a = tri[k];
            let b = tri[(k + 1) % 3];
            if a < b {
                push_candidate(&mut heap, &positions, &versions, a, b);
            }
        }
    }

    let mut removed = 0usize;
    while removed < max_remove {
        let candidate = match heap.pop() {
            Some(c) => c,
            None => break,
        };

        let a = candidate.a as usize;
        let b = candidate.b as usize;
        if candidate.version != (versions[a], versions[b]) {
            continue; // stale
        }
        if candidate.cost > min_feature {
            break; // everything left is coarser than the feature floor
        }

        // The shared triangles of (a, b). Exactly two on a closed manifold.
        let shared: Vec<u32> = incident[a]
            .iter()
            .filter(|t| alive[**t as usize] && incident[b].contains(*t))
            .copied()
            .collect();
        if shared.len() != 2 {
            continue;
        }

        // Shared neighbor vertices beyond the two triangle apexes would
        // produce a non-manifold edge after the collapse.
        let neighbors_a = neighbor_set(&triangles, &alive, &incident[a], candidate.a);
        let neighbors_b = neighbor_set(&triangles, &alive, &incident[b], candidate.b);
        let common = neighbors_a.intersection(&neighbors_b).count();
        if common != 2 {
            continue;
        }

        let midpoint = (positions[a] + positions[b]) * 0.5;
        if would_flip(&triangles, &alive, &incident[a], &positions, candidate.a, a, b, midpoint)
            || would_flip(&triangles, &alive, &incident[b], &positions, candidate.b, a, b, midpoint)
        {
            continue;
        }

        // Commit: a absorbs b at the midpoint.
        positions[a] = midpoint;
        versions[a] += 1;
        versions[b] += 1;
        for &t in &shared {
            alive[t as usize] = false;
        }

        let moved: Vec<u32> = incident[b]
            .iter()
            .filter(|t| alive[**t as usize])
            .copied()
            .collect();
        for &t in &moved {
            for corner in triangles[t as usize].iter_mut() {
                if *corner == candidate.b {
                    *corner = candidate.a;
                }
            }
            incident[a].push(t);
        }
        incident[b].clear();
        removed += 1;

        // Refresh candidates around the merged vertex.
        let around = neighbor_set(&triangles, &alive, &incident[a], candidate.a);
        for &v in &around {
            let (lo, hi) = if v < candidate.a {
                (v, candidate.a)
            } else {
                (candidate.a, v)
            };
            push_candidate(&mut heap, &positions, &versions, lo, hi);
        }
    }

    if removed == 0 {
        return 0;
    }

    // Compact the arenas.
    let mut new_index = vec![u32::MAX; positions.len()];
    let mut vertices = Vec::with_capacity(positions.len() - removed);
    let mut compacted = Vec::with_capacity(triangles.len());
    for (t, tri) in triangles.iter().enumerate() {
        if !alive[t] {
            continue;
        }
        let mut mapped = [0u32; 3];
        for (k, &v) in tri.iter().enumerate() {
            if new_index[v as usize] == u32::MAX {
                new_index[v as usize] = vertices.len() as u32;
                vertices.push(positions[v as usize]);
            }
            mapped[k] = new_index[v as usize];
        }
        compacted.push(mapped);
    }

    layer.vertices = vertices;
    layer.triangles = compacted;
    removed
}

fn push_candidate(
    heap: &mut BinaryHeap<Candidate>,
    positions: &[Point3],
    versions: &[u32],
    a: u32,
    b: u32,
) {
    let cost = positions[a as usize].distance(positions[b as usize]) * 0.5;
    heap.push(Candidate {
        cost,
        a,
        b,
        version: (versions[a as usize], versions[b as usize]),
    });
}

fn neighbor_set(
    triangles: &[[u32; 3]],
    alive: &[bool],
    incident: &[u32],
    vertex: u32,
) -> HashSet<u32> {
    let mut set = HashSet::new();
    for &t in incident {
        if !alive[t as usize] {
            continue;
        }
        for &v in &triangles[t as usize] {
            if v != vertex {
                set.insert(v);
            }
        }
    }
    set
}

// Checks whether moving `vertex` to `midpoint` flips or degenerates any of
// its surviving triangles.
#[allow(clippy::too_many_arguments)]
fn would_flip(
    triangles: &[[u32; 3]],
    alive: &[bool],
    incident: &[u32],
    positions: &[Point3],
    vertex: u32,
    a: usize,
    b: usize,
    midpoint: Point3,
) -> bool {
    for &t in incident {
        if !alive[t as usize] {
            continue;
        }
        let tri = &triangles[t as usize];
        // The two shared triangles collapse entirely; skip them.
        if tri.contains(&(a as u32)) && tri.contains(&(b as u32)) {
            continue;
        }

        let fetch = |v: u32| -> Point3 {
            if v == vertex {
                midpoint
            } else {
                positions[v as usize]
            }
        };

        let before = normal(
            positions[tri[0] as usize],
            positions[tri[1] as usize],
            positions[tri[2] as usize],
        );
        let after = normal(fetch(tri[0]), fetch(tri[1]), fetch(tri[2]));

        let after_len = after.length();
        if after_len <= 1e-12 {
            return true; // degenerates
        }
        if before.dot(after) < 0.0 {
            return true; // flips
        }
    }
    false
}

fn normal(a: Point3, b: Point3, c: Point3) -> Point3 {
    (b - a).cross(c - a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorU8;
    use crate::mesh::MeshBuilder;

    fn layer_from(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Layer {
        Layer {
            index: 0,
            color: ColorU8::BLACK,
            z_bottom: 0.0,
            z_top: 1.0,
            vertices,
            triangles,
        }
    }

    #[test]
    fn weld_merges_close_vertices() {
        let mut layer = layer_from(
            vec![
                Point3::from_xyz(0.0, 0.0, 0.0),
                Point3::from_xyz(1.0, 0.0, 0.0),
                Point3::from_xyz(0.0, 1.0, 0.0),
                // Within tolerance of vertex 1.
                Point3::from_xyz(1.0 + 4e-5, 0.0, 0.0),
                Point3::from_xyz(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 2]],
        );

        let removed = weld_vertices(&mut layer);
        assert_eq!(removed, 1);
        assert_eq!(layer.vertices.len(), 4);
        assert_eq!(layer.triangles.len(), 2);
        assert_eq!(layer.triangles[1][0], 1);
    }

    #[test]
    fn weld_drops_collapsed_triangles() {
        let mut layer = layer_from(
            vec![
                Point3::from_xyz(0.0, 0.0, 0.0),
                Point3::from_xyz(5e-5, 0.0, 0.0),
                Point3::from_xyz(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );

        weld_vertices(&mut layer);
        assert!(layer.triangles.is_empty());
    }

    fn box_layer() -> Layer {
        // A 10x10x1 box with densely split top and bottom caps would be
        // ideal; a plain extruded square from many collinear edge points is
        // enough to exercise collapses.
        let ring: Vec<_> = (0..8)
            .map(|i| lithomark_geom::Point::from_xy(i as f32 * 1.25, 0.0))
            .chain((0..8).map(|i| lithomark_geom::Point::from_xy(10.0, i as f32 * 1.25)))
            .chain((0..8).map(|i| lithomark_geom::Point::from_xy(10.0 - i as f32 * 1.25, 10.0)))
            .chain((0..8).map(|i| lithomark_geom::Point::from_xy(0.0, 10.0 - i as f32 * 1.25)))
            .collect();
        let contour = crate::extrude::MmContour {
            outer: ring,
            holes: Vec::new(),
        };
        let mut builder = MeshBuilder::new();
        crate::extrude::extrude_solid(&mut builder, &contour, 0.0, 1.0).unwrap();
        builder.into_layer(0, ColorU8::BLACK, 0.0, 1.0)
    }

    #[test]
    fn decimate_reduces_vertices() {
        let mut layer = box_layer();
        let before = layer.vertex_count();

        let removed = decimate(&mut layer, before / 4, 10.0);
        assert!(removed > 0);
        assert_eq!(layer.vertex_count(), before - removed);

        // The mesh must stay closed.
        let mut edges = HashMap::new();
        for tri in &layer.triangles {
            for k in 0..3 {
                let a = tri[k];
                let b = tri[(k + 1) % 3];
                *edges.entry((a.min(b), a.max(b))).or_insert(0u32) += 1;
            }
        }
        assert!(edges.values().all(|&c| c == 2));
    }

    #[test]
    fn decimate_respects_feature_floor() {
        let mut layer = box_layer();
        // Every collapse would move geometry by more than a micron floor.
        let removed = decimate(&mut layer, 1000, 1e-6);
        assert_eq!(removed, 0);
    }
}
