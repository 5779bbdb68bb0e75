// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::HashMap;

use crate::error::Error;
use crate::mesh::{Geometry, Layer};
use crate::params::Params;
use crate::progress::{JobCtx, Stage};
use crate::quantizer::{QuantizedImage, VOID_INDEX};

/// How bad an issue is.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Severity {
    /// Blocks a production pipeline.
    Fatal,
    /// Printable, but the result may lose detail.
    Warning,
    /// Informational only.
    Info,
}

/// A single validator finding.
#[derive(Clone, Debug)]
pub struct Issue {
    /// How bad it is.
    pub severity: Severity,
    /// Which check produced it.
    pub check: &'static str,
    /// Human-readable details.
    pub message: String,
}

/// The printability verdict for a generated geometry.
#[derive(Clone, Debug, Default)]
pub struct PrintabilityReport {
    /// Everything the validator found, fatal first.
    pub issues: Vec<Issue>,
}

impl PrintabilityReport {
    /// A report is printable when it carries no fatal issues.
    pub fn is_printable(&self) -> bool {
        self.fatal_count() == 0
    }

    /// Returns the number of fatal issues.
    pub fn fatal_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Fatal)
            .count()
    }

    pub(crate) fn push(&mut self, severity: Severity, check: &'static str, message: String) {
        self.issues.push(Issue {
            severity,
            check,
            message,
        });
    }
}

/// Per-component footprint statistics collected during mesh generation,
/// in millimeters.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ComponentStats {
    pub layer: u8,
    pub width_mm: f32,
    pub height_mm: f32,
    pub area_mm2: f32,
}

/// Runs every printability check and assembles the report.
///
/// `palette_truncated` records the quantizer's insufficient-colors outcome,
/// which is a warning here, never a failure.
pub(crate) fn validate(
    geometry: &Geometry,
    image: &QuantizedImage,
    stats: &[ComponentStats],
    params: &Params,
    palette_truncated: bool,
    ctx: &JobCtx,
) -> Result<PrintabilityReport, Error> {
    let mut report = PrintabilityReport::default();

    if palette_truncated {
        report.push(
            Severity::Warning,
            "insufficient-colors",
            format!(
                "input has fewer distinct colors than requested, palette reduced to {}",
                image.layer_count()
            ),
        );
    }

    ctx.emit(Stage::Validate, 0.0, "checking watertightness");
    check_watertight(&geometry.base, "base", &mut report);
    for layer in &geometry.layers {
        ctx.check()?;
        check_watertight(layer, "layer", &mut report);
    }

    ctx.emit(Stage::Validate, 0.4, "checking wall thickness");
    check_walls(stats, params, &mut report);

    ctx.emit(Stage::Validate, 0.6, "checking feature sizes");
    check_features(stats, params, &mut report);

    ctx.emit(Stage::Validate, 0.8, "checking overhangs");
    check_overhang(geometry, &mut report);
    check_monotonicity(image, &mut report);

    report
        .issues
        .sort_by_key(|issue| match issue.severity {
            Severity::Fatal => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
        });

    ctx.emit(
        Stage::Validate,
        1.0,
        format!("{} issue(s)", report.issues.len()),
    );

    Ok(report)
}

/// Every edge must be shared by exactly two triangles within its layer.
fn check_watertight(layer: &Layer, kind: &str, report: &mut PrintabilityReport) {
    if layer.is_empty() {
        return;
    }

    let mut edges: HashMap<(u32, u32), u32> = HashMap::new();
    for tri in &layer.triangles {
        for k in 0..3 {
            let a = tri[k];
            let b = tri[(k + 1) % 3];
            *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }

    let open = edges.values().filter(|&&c| c != 2).count();
    if open > 0 {
        report.push(
            Severity::Fatal,
            "watertight",
            format!(
                "{} {} has {} edge(s) not shared by exactly two triangles",
                kind, layer.index, open
            ),
        );
    }
}

/// The narrowest extent of every component must clear the wall minimum.
fn check_walls(stats: &[ComponentStats], params: &Params, report: &mut PrintabilityReport) {
    for s in stats {
        let min_extent = s.width_mm.min(s.height_mm);
        if min_extent < params.min_wall_thickness {
            report.push(
                Severity::Warning,
                "wall-thickness",
                format!(
                    "a layer {} region is only {:.3} mm across, minimum is {:.3} mm",
                    s.layer, min_extent, params.min_wall_thickness
                ),
            );
        }
    }
}

/// No island may be smaller than the minimum feature area.
fn check_features(stats: &[ComponentStats], params: &Params, report: &mut PrintabilityReport) {
    let floor = params.min_feature_size * params.min_feature_size;
    for s in stats {
        if s.area_mm2 < floor {
            report.push(
                Severity::Warning,
                "min-feature",
                format!(
                    "a layer {} island covers {:.4} mm^2, minimum is {:.4} mm^2",
                    s.layer, s.area_mm2, floor
                ),
            );
        }
    }
}

/// Side walls are vertical by construction; record the steepest wall angle
/// for completeness.
fn check_overhang(geometry: &Geometry, report: &mut PrintabilityReport) {
    let mut max_tilt = 0.0f32;

    let mut scan = |layer: &Layer| {
        for tri in &layer.triangles {
            let a = layer.vertices[tri[0] as usize];
            let b = layer.vertices[tri[1] as usize];
            let c = layer.vertices[tri[2] as usize];
            let mut n = (b - a).cross(c - a);
            if !n.normalize() {
                continue;
            }
            // Caps point straight up or down; everything else is a wall.
            if n.z.abs() > 0.999 {
                continue;
            }
            max_tilt = max_tilt.max(n.z.abs());
        }
    };

    scan(&geometry.base);
    for layer in &geometry.layers {
        scan(layer);
    }

    let angle = 90.0 - max_tilt.asin().to_degrees();
    report.push(
        Severity::Info,
        "overhang",
        format!("steepest wall angle is {:.1} degrees, no overhangs", angle),
    );
}

/// Re-checks what the region extractor enforces structurally: the height map
/// is exactly the layer index grid.
fn check_monotonicity(image: &QuantizedImage, report: &mut PrintabilityReport) {
    let scale = if image.layer_count() > 1 {
        1.0 / (image.layer_count() - 1) as f32
    } else {
        0.0
    };

    let mut bad = 0usize;
    for (i, &index) in image.indices.iter().enumerate() {
        let expected = if index == VOID_INDEX {
            0.0
        } else {
            index as f32 * scale
        };
        if (image.height_map[i] - expected).abs() > 1e-6 {
            bad += 1;
        }
    }

    if bad > 0 {
        report.push(
            Severity::Fatal,
            "monotonicity",
            format!("{} pixel(s) deviate from the layer height grid", bad),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorU8, Palette};
    use crate::extrude::{extrude_solid, MmContour};
    use crate::mesh::{MeshBuilder, Metrics};
    use lithomark_geom::{Box3, Point, Point3};

    fn square_layer(index: u8) -> Layer {
        let contour = MmContour {
            outer: vec![
                Point::from_xy(0.0, 0.0),
                Point::from_xy(10.0, 0.0),
                Point::from_xy(10.0, 10.0),
                Point::from_xy(0.0, 10.0),
            ],
            holes: Vec::new(),
        };
        let mut builder = MeshBuilder::new();
        extrude_solid(&mut builder, &contour, 0.0, 1.0).unwrap();
        builder.into_layer(index, ColorU8::BLACK, 0.0, 1.0)
    }

    fn geometry_with(layers: Vec<Layer>) -> Geometry {
        Geometry {
            layers,
            base: square_layer(0),
            bounds: Box3::from_min_max(
                Point3::from_xyz(-25.0, -75.0, 0.0),
                Point3::from_xyz(25.0, 75.0, 2.6),
            )
            .unwrap(),
            metrics: Metrics {
                vertex_count: 0,
                triangle_count: 0,
                layer_count: 1,
                quantization_error: 0.0,
                generation_millis: 0,
            },
        }
    }

    fn quantized_stub() -> QuantizedImage {
        let mut palette = Palette::new();
        palette.push(ColorU8::BLACK);
        palette.push(ColorU8::WHITE);
        QuantizedImage {
            width: 2,
            height: 1,
            indices: vec![0, 1],
            palette,
            height_map: vec![0.0, 1.0],
        }
    }

    fn run(geometry: &Geometry, image: &QuantizedImage, stats: &[ComponentStats]) -> PrintabilityReport {
        let sink = crate::progress::NullProgress;
        let cancel = crate::progress::CancelSignal::new();
        let ctx = JobCtx::new(&sink, &cancel, None);
        validate(geometry, image, stats, &Params::default(), false, &ctx).unwrap()
    }

    #[test]
    fn clean_geometry_is_printable() {
        let geometry = geometry_with(vec![square_layer(0)]);
        let report = run(&geometry, &quantized_stub(), &[]);
        assert!(report.is_printable());
        // The overhang info line is always present.
        assert!(report.issues.iter().any(|i| i.check == "overhang"));
    }

    #[test]
    fn missing_triangle_is_fatal() {
        let mut layer = square_layer(0);
        layer.triangles.pop();
        let geometry = geometry_with(vec![layer]);
        let report = run(&geometry, &quantized_stub(), &[]);
        assert!(!report.is_printable());
        assert!(report.issues.iter().any(|i| i.check == "watertight"));
        // Fatal issues sort first.
        assert_eq!(report.issues[0].severity, Severity::Fatal);
    }

    #[test]
    fn thin_wall_warns() {
        let stats = [ComponentStats {
            layer: 1,
            width_mm: 0.2,
            height_mm: 5.0,
            area_mm2: 1.0,
        }];
        let geometry = geometry_with(vec![square_layer(0)]);
        let report = run(&geometry, &quantized_stub(), &stats);
        assert!(report.is_printable());
        assert!(report.issues.iter().any(|i| i.check == "wall-thickness"));
    }

    #[test]
    fn tiny_island_warns() {
        let stats = [ComponentStats {
            layer: 0,
            width_mm: 5.0,
            height_mm: 5.0,
            area_mm2: 0.1,
        }];
        let geometry = geometry_with(vec![square_layer(0)]);
        let report = run(&geometry, &quantized_stub(), &stats);
        assert!(report
            .issues
            .iter()
            .any(|i| i.check == "min-feature" && i.severity == Severity::Warning));
    }

    #[test]
    fn broken_height_map_is_fatal() {
        let mut image = quantized_stub();
        image.height_map[1] = 0.3;
        let geometry = geometry_with(vec![square_layer(0)]);
        let report = run(&geometry, &image, &[]);
        assert!(report.issues.iter().any(|i| i.check == "monotonicity"));
        assert!(!report.is_printable());
    }
}
