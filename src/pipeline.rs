// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::time::Instant;

use lithomark_geom::{Box3, IntSize, Point3};

use crate::color::ColorU8;
use crate::error::Error;
use crate::extrude::{
    contour_to_mm, extrude_base, extrude_prism, triangulate_contour, CapMesh, MmContour, MmMapper,
};
use crate::mesh::{Geometry, Layer, MeshBuilder, Metrics};
use crate::params::Params;
use crate::pixmap::Pixmap;
use crate::pool::BufferPool;
use crate::progress::{CancelSignal, JobCtx, ProgressSink, Stage};
use crate::quantizer;
use crate::regions;
use crate::sampler;
use crate::simplify;
use crate::validate::{self, ComponentStats, PrintabilityReport};

// The smallest image the memory fitter is allowed to downscale to.
const MIN_FIT_PIXELS: u64 = 256;

/// The result of a successful pipeline run.
///
/// The geometry is returned even when the validator found fatal issues, so
/// hosts can still preview it; production pipelines should go through
/// [`PipelineOutput::into_printable`].
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// The generated mesh.
    pub geometry: Geometry,
    /// The printability verdict.
    pub report: PrintabilityReport,
}

impl PipelineOutput {
    /// Returns the geometry, or [`Error::Unprintable`] when the report
    /// carries fatal issues.
    pub fn into_printable(self) -> Result<Geometry, Error> {
        let fatal = self.report.fatal_count();
        if fatal > 0 {
            return Err(Error::Unprintable { fatal });
        }
        Ok(self.geometry)
    }
}

/// Runs the whole image-to-geometry pipeline.
///
/// This is the single entry point of the crate. The stages run in sequence on
/// the calling thread; `progress` receives monotone per-stage events and
/// `cancel` is observed at every suspension point. The output is
/// deterministic for a given `(pixmap, params, seed)`.
pub fn generate(
    pixmap: &Pixmap,
    params: &Params,
    seed: u64,
    progress: &dyn ProgressSink,
    cancel: &CancelSignal,
) -> Result<PipelineOutput, Error> {
    params.validate()?;

    let started = Instant::now();
    let deadline = params.time_budget.map(|budget| started + budget);
    let ctx = JobCtx::new(progress, cancel, deadline);

    let mut pool = BufferPool::new();
    let result = run_pipeline(pixmap, params, seed, &ctx, &mut pool, started);
    // Scratch buffers never outlive the job, successful or not.
    pool.drain();
    result
}

fn run_pipeline(
    pixmap: &Pixmap,
    params: &Params,
    seed: u64,
    ctx: &JobCtx,
    pool: &mut BufferPool,
    started: Instant,
) -> Result<PipelineOutput, Error> {
    ctx.check()?;

    // Fit the working set into the memory budget, downscaling if needed.
    let fitted;
    let source = match fit_to_memory(pixmap, params)? {
        Some(size) => {
            log::debug!(
                "pipeline: downscaling {}x{} to {}x{} to fit the memory budget",
                pixmap.width(),
                pixmap.height(),
                size.width(),
                size.height()
            );
            fitted = pixmap.scaled_to(size);
            &fitted
        }
        None => pixmap,
    };

    let mut rng = fastrand::Rng::with_seed(seed);

    // Sample and quantize.
    let samples = sampler::sample_pixels(source, &mut rng, ctx)?;
    let quantized = quantizer::quantize(source, &samples, params.color_count, &mut rng, pool, ctx)?;
    let truncated = quantized.truncated;
    let quantization_error = quantized.mean_error;
    let mut image = quantized.image;

    // Regions.
    let components = regions::extract_components(&mut image, pool, ctx)?;

    // Contours.
    let mapper = MmMapper::new(image.width, image.height, params);
    let tolerance_px = (params.min_feature_size / 4.0) / mapper.mm_per_pixel();

    let mut traced: Vec<(u8, MmContour)> = Vec::with_capacity(components.len());
    let mut stats: Vec<ComponentStats> = Vec::with_capacity(components.len());
    for (i, component) in components.iter().enumerate() {
        ctx.check()?;
        ctx.emit(
            Stage::Contours,
            i as f32 / components.len().max(1) as f32,
            format!("tracing component {}/{}", i + 1, components.len()),
        );

        let contours = crate::contour::trace_component(component, tolerance_px, pool);
        if contours.is_empty() {
            log::debug!(
                "pipeline: layer {} component degenerated during tracing",
                component.layer
            );
            continue;
        }

        stats.push(component_stats(component, &mapper));
        for contour in &contours {
            traced.push((component.layer, contour_to_mm(contour, &mapper)));
        }
    }
    ctx.emit(Stage::Contours, 1.0, format!("{} contours", traced.len()));

    // Triangulation.
    let mut caps: Vec<CapMesh> = Vec::with_capacity(traced.len());
    for (i, (_, contour)) in traced.iter().enumerate() {
        ctx.check()?;
        ctx.emit(
            Stage::Triangulate,
            i as f32 / traced.len().max(1) as f32,
            format!("triangulating component {}/{}", i + 1, traced.len()),
        );
        caps.push(triangulate_contour(contour)?);
    }
    ctx.emit(Stage::Triangulate, 1.0, "triangulation done");

    // Extrusion, one mesh arena per layer.
    let layer_count = image.layer_count();
    let mut builders: Vec<MeshBuilder> = (0..layer_count).map(|_| MeshBuilder::new()).collect();
    for (i, (layer, contour)) in traced.iter().enumerate() {
        ctx.check()?;
        ctx.emit(
            Stage::Extrude,
            i as f32 / traced.len().max(1) as f32,
            format!("extruding component {}/{}", i + 1, traced.len()),
        );
        extrude_prism(
            &mut builders[*layer as usize],
            contour,
            &caps[i],
            params.layer_z_bottom(*layer),
            params.layer_z_top(*layer),
        );
    }

    let base_color = image.palette.first().copied().unwrap_or(ColorU8::BLACK);
    let base = extrude_base(params, base_color)?;

    let mut layers: Vec<Layer> = Vec::with_capacity(layer_count);
    for (index, builder) in builders.into_iter().enumerate() {
        let color = image.palette[index];
        layers.push(builder.into_layer(
            index as u8,
            color,
            params.layer_z_bottom(index as u8),
            params.layer_z_top(index as u8),
        ));
    }
    ctx.emit(Stage::Extrude, 1.0, "extrusion done");

    // Simplification.
    let mut base = base;
    simplify_geometry(&mut layers, &mut base, params, ctx)?;

    // Bounding box comes from the parameters: void regions do not shrink it.
    let bounds = Box3::from_min_max(
        Point3::from_xyz(-params.width / 2.0, -params.height / 2.0, 0.0),
        Point3::from_xyz(
            params.width / 2.0,
            params.height / 2.0,
            params.total_height(layer_count),
        ),
    )
    .ok_or(Error::Geometry { stage: "extrude" })?;

    let mut geometry = Geometry {
        layers,
        base,
        bounds,
        metrics: Metrics {
            vertex_count: 0,
            triangle_count: 0,
            layer_count,
            quantization_error,
            generation_millis: 0,
        },
    };
    geometry.metrics.vertex_count = geometry.vertex_count();
    geometry.metrics.triangle_count = geometry.triangle_count();

    // Validation.
    let report = validate::validate(&geometry, &image, &stats, params, truncated, ctx)?;

    geometry.metrics.generation_millis = started.elapsed().as_millis() as u64;
    log::debug!(
        "pipeline: {} vertices, {} triangles in {} ms",
        geometry.metrics.vertex_count,
        geometry.metrics.triangle_count,
        geometry.metrics.generation_millis
    );

    Ok(PipelineOutput { geometry, report })
}

/// Estimates the working-set size and picks a smaller input size when the
/// budget would be exceeded. Returns `None` when the image already fits.
fn fit_to_memory(pixmap: &Pixmap, params: &Params) -> Result<Option<IntSize>, Error> {
    let budget = params.memory_budget as u64;
    let size = pixmap.size();

    if estimate_bytes(size.area() as u64) <= budget {
        return Ok(None);
    }

    let floor = estimate_bytes(MIN_FIT_PIXELS);
    if floor > budget {
        return Err(Error::MemoryExceeded {
            required: floor,
            budget,
        });
    }

    let max_pixels = (budget - WORKING_BYTES_FIXED) / WORKING_BYTES_PER_PIXEL;
    let mut scale = ((max_pixels as f64 / size.area() as f64).sqrt()) as f32;

    // Rounding can push the scaled size just over the budget; back off.
    for _ in 0..16 {
        if let Some(fitted) = size.scale_by(scale) {
            if estimate_bytes(fitted.area() as u64) <= budget {
                return Ok(Some(fitted));
            }
        }
        scale *= 0.95;
    }

    Err(Error::MemoryExceeded {
        required: estimate_bytes(size.area() as u64),
        budget,
    })
}

// pixels * 4 (RGBA) + indices + height map * 4 + one layer mask.
const WORKING_BYTES_PER_PIXEL: u64 = 10;

// Sample storage is independent of the image size.
const WORKING_BYTES_FIXED: u64 = (sampler::MAX_SAMPLES * 16) as u64;

fn estimate_bytes(pixels: u64) -> u64 {
    pixels * WORKING_BYTES_PER_PIXEL + WORKING_BYTES_FIXED
}

fn component_stats(component: &regions::Component, mapper: &MmMapper) -> ComponentStats {
    let scale = mapper.pixel_scale();
    ComponentStats {
        layer: component.layer,
        width_mm: component.bounds.width() as f32 * scale.0,
        height_mm: component.bounds.height() as f32 * scale.1,
        area_mm2: component.area as f32 * scale.0 * scale.1,
    }
}

fn simplify_geometry(
    layers: &mut [Layer],
    base: &mut Layer,
    params: &Params,
    ctx: &JobCtx,
) -> Result<(), Error> {
    ctx.emit(Stage::Simplify, 0.0, "welding vertices");

    let mut welded = simplify::weld_vertices(base);
    for layer in layers.iter_mut() {
        ctx.check()?;
        welded += simplify::weld_vertices(layer);
    }

    let total: usize = base.vertex_count() + layers.iter().map(Layer::vertex_count).sum::<usize>();
    if total <= params.max_vertices {
        ctx.emit(
            Stage::Simplify,
            1.0,
            format!("{} vertices welded, decimation skipped", welded),
        );
        return Ok(());
    }

    ctx.emit(Stage::Simplify, 0.5, "decimating");
    let mut removed = 0usize;
    for layer in layers.iter_mut() {
        ctx.check()?;
        let target = (layer.vertex_count() as f32 * params.simplification_ratio) as usize;
        removed += simplify::decimate(layer, target, params.min_feature_size);
    }

    log::debug!(
        "simplify: welded {}, decimated {} vertices",
        welded,
        removed
    );
    ctx.emit(
        Stage::Simplify,
        1.0,
        format!("{} vertices removed", welded + removed),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_estimate_grows_with_pixels() {
        assert!(estimate_bytes(1000) < estimate_bytes(2000));
    }

    #[test]
    fn fit_is_identity_for_small_images() {
        let pixmap = Pixmap::new(64, 64).unwrap();
        let params = Params::default();
        assert!(fit_to_memory(&pixmap, &params).unwrap().is_none());
    }

    #[test]
    fn fit_downscales_when_budget_is_tight() {
        let pixmap = Pixmap::new(512, 256).unwrap();
        let mut params = Params::default();
        // Enough for roughly a quarter of the pixels.
        params.memory_budget = estimate_bytes((512 * 256 / 4) as u64) as usize;

        let fitted = fit_to_memory(&pixmap, &params).unwrap().unwrap();
        assert!(fitted.width() < 512);
        assert!(fitted.height() < 256);
        // Aspect ratio is preserved.
        let ratio = fitted.width() as f32 / fitted.height() as f32;
        assert!((ratio - 2.0).abs() < 0.1);
        assert!(estimate_bytes(fitted.area() as u64) <= params.memory_budget as u64);
    }

    #[test]
    fn fit_fails_below_floor() {
        let pixmap = Pixmap::new(512, 512).unwrap();
        let mut params = Params::default();
        params.memory_budget = 1024;
        assert!(matches!(
            fit_to_memory(&pixmap, &params),
            Err(Error::MemoryExceeded { .. })
        ));
    }
}
