// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::HashMap;

use lithomark_geom::{Box3, Point3};

use crate::color::ColorU8;

/// A single extruded slab of one palette color.
///
/// Vertices and triangles are flat arenas; triangles hold `u32` indices into
/// the vertex list and carry counter-clockwise winding when viewed from
/// outside the solid. Layers never share vertices with each other or with the
/// base: shared boundary coordinates are coincident but not merged.
#[derive(Clone, Debug)]
pub struct Layer {
    /// The palette index this layer was built from.
    pub index: u8,
    /// The layer color.
    pub color: ColorU8,
    /// Bottom of the slab, mm.
    pub z_bottom: f32,
    /// Top of the slab, mm.
    pub z_top: f32,
    /// The vertex arena, mm.
    pub vertices: Vec<Point3>,
    /// Vertex index triples.
    pub triangles: Vec<[u32; 3]>,
}

impl Layer {
    /// Returns the number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Returns the number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Checks whether the layer carries any geometry.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Returns the bounding box, or `None` for an empty layer.
    pub fn bounds(&self) -> Option<Box3> {
        Box3::from_points(&self.vertices)
    }

    /// Returns the vertex arena as raw bytes, for zero-copy serialization.
    pub fn vertices_as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Aggregate mesh statistics.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Metrics {
    /// Total vertex count across all layers and the base.
    pub vertex_count: usize,
    /// Total triangle count across all layers and the base.
    pub triangle_count: usize,
    /// Number of color layers (the effective palette size).
    pub layer_count: usize,
    /// Mean squared RGB distance of the samples to their palette color.
    pub quantization_error: f32,
    /// Wall-clock duration of the whole job in milliseconds.
    pub generation_millis: u64,
}

/// The generated bookmark geometry.
///
/// Millimeter units; the bookmark is centered in XY and Z = 0 is the bottom
/// of the base slab.
#[derive(Clone, Debug)]
pub struct Geometry {
    /// One mesh per palette color, darkest first. Entries may be empty when
    /// a layer lost all of its components to filtering.
    pub layers: Vec<Layer>,
    /// The rounded-rectangle base slab.
    pub base: Layer,
    /// The overall bounding box, derived from the job parameters.
    pub bounds: Box3,
    /// Aggregate statistics.
    pub metrics: Metrics,
}

impl Geometry {
    /// Returns the total vertex count across all layers and the base.
    pub fn vertex_count(&self) -> usize {
        self.base.vertex_count() + self.layers.iter().map(Layer::vertex_count).sum::<usize>()
    }

    /// Returns the total triangle count across all layers and the base.
    pub fn triangle_count(&self) -> usize {
        self.base.triangle_count() + self.layers.iter().map(Layer::triangle_count).sum::<usize>()
    }
}

/// An append-only mesh arena that merges bit-identical vertices.
///
/// Caps and walls are emitted with exactly the same coordinates along their
/// shared boundary, so exact matching alone closes the solid; the welding
/// pass later catches anything within tolerance.
#[derive(Debug, Default)]
pub(crate) struct MeshBuilder {
    vertices: Vec<Point3>,
    triangles: Vec<[u32; 3]>,
    index: HashMap<[u32; 3], u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        MeshBuilder::default()
    }

    /// Interns a vertex, returning its index.
    pub fn vertex(&mut self, p: Point3) -> u32 {
        let key: [u32; 3] = bytemuck::cast([p.x, p.y, p.z]);
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.vertices.len() as u32;
        self.vertices.push(p);
        self.index.insert(key, i);
        i
    }

    /// Appends a triangle, dropping it when any two corners coincide.
    pub fn triangle(&mut self, a: u32, b: u32, c: u32) {
        if a == b || b == c || a == c {
            return;
        }
        self.triangles.push([a, b, c]);
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn into_layer(self, index: u8, color: ColorU8, z_bottom: f32, z_top: f32) -> Layer {
        Layer {
            index,
            color,
            z_bottom,
            z_top,
            vertices: self.vertices,
            triangles: self.triangles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_interns_vertices() {
        let mut builder = MeshBuilder::new();
        let a = builder.vertex(Point3::from_xyz(0.0, 0.0, 0.0));
        let b = builder.vertex(Point3::from_xyz(1.0, 0.0, 0.0));
        let a2 = builder.vertex(Point3::from_xyz(0.0, 0.0, 0.0));
        assert_eq!(a, a2);
        assert_ne!(a, b);

        builder.triangle(a, b, a2); // degenerate, dropped
        assert!(builder.is_empty());

        let c = builder.vertex(Point3::from_xyz(0.0, 1.0, 0.0));
        builder.triangle(a, b, c);
        let layer = builder.into_layer(0, ColorU8::BLACK, 0.0, 1.0);
        assert_eq!(layer.vertex_count(), 3);
        assert_eq!(layer.triangle_count(), 1);
        assert!(!layer.is_empty());
    }

    #[test]
    fn vertex_bytes() {
        let mut builder = MeshBuilder::new();
        builder.vertex(Point3::from_xyz(1.0, 2.0, 3.0));
        let layer = builder.into_layer(0, ColorU8::BLACK, 0.0, 1.0);
        assert_eq!(layer.vertices_as_bytes().len(), 12);
    }
}
