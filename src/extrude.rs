// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use lithomark_geom::{Point, Point3};

use crate::color::ColorU8;
use crate::contour::{signed_area, Contour};
use crate::error::Error;
use crate::mesh::{Layer, MeshBuilder};
use crate::params::Params;
use crate::triangulate::triangulate_polygon;

/// Maps image pixel coordinates into the bookmark's millimeter plane.
///
/// The bookmark is centered in XY; image row 0 maps to the top edge, i.e.
/// +Y in mesh space, so Y is flipped.
#[derive(Copy, Clone, Debug)]
pub(crate) struct MmMapper {
    scale_x: f32,
    scale_y: f32,
    half_width: f32,
    half_height: f32,
}

impl MmMapper {
    pub fn new(image_width: u32, image_height: u32, params: &Params) -> Self {
        MmMapper {
            scale_x: params.width / image_width as f32,
            scale_y: params.height / image_height as f32,
            half_width: params.width / 2.0,
            half_height: params.height / 2.0,
        }
    }

    pub fn map(&self, p: Point) -> Point {
        Point::from_xy(
            p.x * self.scale_x - self.half_width,
            self.half_height - p.y * self.scale_y,
        )
    }

    /// Millimeters per pixel along the finer axis; used to convert
    /// millimeter tolerances into pixel units.
    pub fn mm_per_pixel(&self) -> f32 {
        self.scale_x.min(self.scale_y)
    }

    /// Millimeters per pixel along each axis.
    pub fn pixel_scale(&self) -> (f32, f32) {
        (self.scale_x, self.scale_y)
    }
}

/// A contour converted into millimeter space with mesh-ready orientation:
/// outer counter-clockwise, holes clockwise.
#[derive(Clone, Debug)]
pub(crate) struct MmContour {
    pub outer: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
}

pub(crate) fn contour_to_mm(contour: &Contour, mapper: &MmMapper) -> MmContour {
    // The Y flip mirrors the plane, which reverses every ring's orientation;
    // reversing the vertex order restores it.
    let map_ring = |ring: &[Point]| -> Vec<Point> {
        let mut mapped: Vec<Point> = ring.iter().map(|&p| mapper.map(p)).collect();
        mapped.reverse();
        mapped
    };

    MmContour {
        outer: map_ring(&contour.outer),
        holes: contour.holes.iter().map(|h| map_ring(h)).collect(),
    }
}

/// A triangulated cap, shared between the bottom and top of a prism.
#[derive(Clone, Debug)]
pub(crate) struct CapMesh {
    pub vertices: Vec<Point>,
    pub triangles: Vec<[u32; 3]>,
}

/// Triangulates a contour into its cap mesh.
pub(crate) fn triangulate_contour(contour: &MmContour) -> Result<CapMesh, Error> {
    let (vertices, triangles) =
        triangulate_polygon(&contour.outer, &contour.holes).ok_or(Error::Geometry {
            stage: "triangulate",
        })?;
    Ok(CapMesh {
        vertices,
        triangles,
    })
}

/// Extrudes a triangulated contour into a prism between two Z planes.
///
/// Emits a downward-facing bottom cap, an upward-facing top cap and two
/// side-wall triangles per contour edge, with outward-facing normals on the
/// outer ring and inward-facing ones around holes.
pub(crate) fn extrude_prism(
    builder: &mut MeshBuilder,
    contour: &MmContour,
    cap: &CapMesh,
    z_bottom: f32,
    z_top: f32,
) {
    // Caps.
    for tri in &cap.triangles {
        let a = cap.vertices[tri[0] as usize];
        let b = cap.vertices[tri[1] as usize];
        let c = cap.vertices[tri[2] as usize];

        let bottom = [
            builder.vertex(at_z(a, z_bottom)),
            builder.vertex(at_z(b, z_bottom)),
            builder.vertex(at_z(c, z_bottom)),
        ];
        // Clockwise from above is counter-clockwise from below.
        builder.triangle(bottom[0], bottom[2], bottom[1]);

        let top = [
            builder.vertex(at_z(a, z_top)),
            builder.vertex(at_z(b, z_top)),
            builder.vertex(at_z(c, z_top)),
        ];
        builder.triangle(top[0], top[1], top[2]);
    }

    // Side walls along the original rings, not the bridged polygon, so every
    // bridge edge stays interior.
    extrude_ring(builder, &contour.outer, z_bottom, z_top);
    for hole in &contour.holes {
        extrude_ring(builder, hole, z_bottom, z_top);
    }
}

/// Triangulates and extrudes a contour in one go.
pub(crate) fn extrude_solid(
    builder: &mut MeshBuilder,
    contour: &MmContour,
    z_bottom: f32,
    z_top: f32,
) -> Result<(), Error> {
    let cap = triangulate_contour(contour)?;
    extrude_prism(builder, contour, &cap, z_bottom, z_top);
    Ok(())
}

fn extrude_ring(builder: &mut MeshBuilder, ring: &[Point], z_bottom: f32, z_top: f32) {
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];

        let a_bottom = builder.vertex(at_z(a, z_bottom));
        let b_bottom = builder.vertex(at_z(b, z_bottom));
        let b_top = builder.vertex(at_z(b, z_top));
        let a_top = builder.vertex(at_z(a, z_top));

        // For a CCW ring the outward side is to the right of travel; this
        // winding faces that way. CW hole rings come out facing the cavity.
        builder.triangle(a_bottom, b_bottom, b_top);
        builder.triangle(a_bottom, b_top, a_top);
    }
}

#[inline]
fn at_z(p: Point, z: f32) -> Point3 {
    Point3::from_xyz(p.x, p.y, z)
}

/// Builds the rounded-rectangle base outline, counter-clockwise, centered at
/// the origin.
///
/// Corners are approximated by arcs of `max(8, ceil(radius * 4))` segments;
/// a zero radius yields the four sharp corners.
pub(crate) fn rounded_rect_outline(width: f32, height: f32, radius: f32) -> Vec<Point> {
    let hw = width / 2.0;
    let hh = height / 2.0;

    if radius <= 0.0 {
        return vec![
            Point::from_xy(-hw, -hh),
            Point::from_xy(hw, -hh),
            Point::from_xy(hw, hh),
            Point::from_xy(-hw, hh),
        ];
    }

    let segments = 8usize.max((radius * 4.0).ceil() as usize);
    // Corner centers and their arc start angles, CCW starting bottom-right.
    let corners = [
        (hw - radius, -hh + radius, -90.0f32),
        (hw - radius, hh - radius, 0.0),
        (-hw + radius, hh - radius, 90.0),
        (-hw + radius, -hh + radius, 180.0),
    ];

    let mut outline = Vec::with_capacity(4 * (segments + 1));
    for &(cx, cy, start) in &corners {
        for i in 0..=segments {
            let angle = (start + 90.0 * i as f32 / segments as f32).to_radians();
            outline.push(Point::from_xy(
                cx + radius * angle.cos(),
                cy + radius * angle.sin(),
            ));
        }
    }

    outline
}

/// Extrudes the base slab from `z = 0` to the base thickness.
pub(crate) fn extrude_base(params: &Params, color: ColorU8) -> Result<Layer, Error> {
    let outline = rounded_rect_outline(params.width, params.height, params.corner_radius);
    debug_assert!(signed_area(&outline) > 0.0);

    let mut builder = MeshBuilder::new();
    let contour = MmContour {
        outer: outline,
        holes: Vec::new(),
    };
    extrude_solid(&mut builder, &contour, 0.0, params.base_thickness)?;

    Ok(builder.into_layer(0, color, 0.0, params.base_thickness))
}
