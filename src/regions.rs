// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use lithomark_geom::IntRect;

use crate::error::Error;
use crate::pool::BufferPool;
use crate::progress::{JobCtx, Stage};
use crate::quantizer::{QuantizedImage, VOID_INDEX};

/// Components smaller than this many pixels are treated as noise.
pub const MIN_COMPONENT_AREA: usize = 10;

// Cancellation is observed every this many processed pixels.
const CHECK_INTERVAL: usize = 100_000;

/// A 4-connected pixel region of a single layer.
#[derive(Clone, Debug)]
pub struct Component {
    /// The layer this component belongs to.
    pub layer: u8,
    /// The component pixels in image coordinates.
    pub pixels: Vec<(u32, u32)>,
    /// The tight bounding box.
    pub bounds: IntRect,
    /// The component area in pixels.
    pub area: usize,
}

impl Component {
    fn centroid(&self) -> (i64, i64) {
        let mut cx = 0i64;
        let mut cy = 0i64;
        for &(x, y) in &self.pixels {
            cx += x as i64;
            cy += y as i64;
        }
        let n = self.pixels.len().max(1) as i64;
        (cx / n, cy / n)
    }
}

/// Extracts components for every layer.
///
/// Layer masks are accumulated downward: the effective mask of layer `L` is
/// the union of all masks with index >= `L`, which keeps every layer solid
/// beneath the lighter layers stacked on top of it. Noise components below
/// [`MIN_COMPONENT_AREA`] are dissolved into their surroundings, mutating the
/// quantized image so the height map stays consistent.
pub(crate) fn extract_components(
    image: &mut QuantizedImage,
    pool: &mut BufferPool,
    ctx: &JobCtx,
) -> Result<Vec<Component>, Error> {
    let layer_count = image.layer_count() as u8;
    let mut components = Vec::new();

    // Lightest layer first, so pixels demoted from layer L are picked up
    // again when the darker layers below it are extracted.
    for layer in (0..layer_count).rev() {
        ctx.check()?;
        ctx.emit(
            Stage::Regions,
            (layer_count - 1 - layer) as f32 / layer_count as f32,
            format!("extracting layer {}", layer),
        );

        let mut found = extract_layer(image, layer, pool, ctx)?;
        resolve_small_components(image, layer, &mut found);
        components.extend(found);
    }

    ctx.emit(
        Stage::Regions,
        1.0,
        format!("{} components", components.len()),
    );
    log::debug!(
        "regions: {} components across {} layers",
        components.len(),
        layer_count
    );

    // Back to darkest-first order for the downstream stages.
    components.sort_by_key(|c| c.layer);
    Ok(components)
}

fn extract_layer(
    image: &QuantizedImage,
    layer: u8,
    pool: &mut BufferPool,
    ctx: &JobCtx,
) -> Result<Vec<Component>, Error> {
    let w = image.width as usize;
    let h = image.height as usize;
    let total = w * h;

    // The accumulated binary mask for this layer.
    let mut mask = pool.acquire_u8(total);
    for i in 0..total {
        let index = image.indices[i];
        mask[i] = (index != VOID_INDEX && index >= layer) as u8;
    }

    let mut stack = pool.acquire_u32(256);
    let mut components = Vec::new();
    let mut processed = 0usize;

    let result = (|| -> Result<(), Error> {
        for start in 0..total {
            if mask[start] == 0 {
                continue;
            }

            // Iterative flood fill; recursion would overflow on large blobs.
            let mut pixels = Vec::new();
            let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
            let (mut max_x, mut max_y) = (0u32, 0u32);

            mask[start] = 0;
            stack.push(start as u32);
            while let Some(i) = stack.pop() {
                processed += 1;
                if processed % CHECK_INTERVAL == 0 {
                    ctx.check()?;
                }

                let x = i % w as u32;
                let y = i / w as u32;
                pixels.push((x, y));
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                // 4-connectivity.
                if x > 0 && mask[i as usize - 1] != 0 {
                    mask[i as usize - 1] = 0;
                    stack.push(i - 1);
                }
                if (x as usize) + 1 < w && mask[i as usize + 1] != 0 {
                    mask[i as usize + 1] = 0;
                    stack.push(i + 1);
                }
                if y > 0 && mask[i as usize - w] != 0 {
                    mask[i as usize - w] = 0;
                    stack.push(i - w as u32);
                }
                if (y as usize) + 1 < h && mask[i as usize + w] != 0 {
                    mask[i as usize + w] = 0;
                    stack.push(i + w as u32);
                }
            }

            let bounds = IntRect::from_ltrb(
                min_x as i32,
                min_y as i32,
                max_x as i32 + 1,
                max_y as i32 + 1,
            )
            .expect("component bounds are always non-empty");

            let area = pixels.len();
            components.push(Component {
                layer,
                pixels,
                bounds,
                area,
            });
        }
        Ok(())
    })();

    pool.release_u32(stack);
    pool.release_u8(mask);
    result?;

    Ok(components)
}

/// Dissolves components below [`MIN_COMPONENT_AREA`].
///
/// Their pixels go to the nearest larger component of the same layer,
/// measured by centroid Manhattan distance. The partition below splits at the
/// same area threshold, so every kept component is larger than every dropped
/// one. When the layer has no surviving component the pixels are demoted to
/// the next darker layer (or to void for the darkest one), which keeps the
/// accumulated stack monotone.
fn resolve_small_components(
    image: &mut QuantizedImage,
    layer: u8,
    components: &mut Vec<Component>,
) {
    let (small, mut kept): (Vec<Component>, Vec<Component>) = std::mem::take(components)
        .into_iter()
        .partition(|c| c.area < MIN_COMPONENT_AREA);

    let w = image.width as usize;
    let height_scale = if image.layer_count() > 1 {
        1.0 / (image.layer_count() - 1) as f32
    } else {
        0.0
    };

    for comp in small {
        if kept.is_empty() {
            // No home in this layer; demote the pixels one layer down.
            for &(x, y) in &comp.pixels {
                let i = y as usize * w + x as usize;
                if image.indices[i] != layer {
                    // Already owned by a lighter layer; the accumulated mask
                    // merely included it, nothing to demote.
                    continue;
                }
                if layer > 0 {
                    image.indices[i] = layer - 1;
                    image.height_map[i] = (layer - 1) as f32 * height_scale;
                } else {
                    image.indices[i] = VOID_INDEX;
                    image.height_map[i] = 0.0;
                }
            }
            continue;
        }

        let (cx, cy) = comp.centroid();
        let nearest = kept
            .iter_mut()
            .min_by_key(|c| {
                let (ox, oy) = c.centroid();
                (ox - cx).abs() + (oy - cy).abs()
            })
            .expect("kept is not empty");

        nearest.bounds = nearest.bounds.join(&comp.bounds);
        nearest.area += comp.area;
        nearest.pixels.extend(comp.pixels);
    }

    *components = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorU8, Palette};

    fn ctx_run(image: &mut QuantizedImage) -> Vec<Component> {
        let sink = crate::progress::NullProgress;
        let cancel = crate::progress::CancelSignal::new();
        let ctx = JobCtx::new(&sink, &cancel, None);
        let mut pool = BufferPool::new();
        extract_components(image, &mut pool, &ctx).unwrap()
    }

    fn image_from_indices(width: u32, height: u32, indices: Vec<u8>, layers: usize) -> QuantizedImage {
        let mut palette = Palette::new();
        for i in 0..layers {
            let v = (i * 60) as u8;
            palette.push(ColorU8::from_rgba(v, v, v, 255));
        }
        let scale = if layers > 1 {
            1.0 / (layers - 1) as f32
        } else {
            0.0
        };
        let height_map = indices
            .iter()
            .map(|&i| {
                if i == VOID_INDEX {
                    0.0
                } else {
                    i as f32 * scale
                }
            })
            .collect();
        QuantizedImage {
            width,
            height,
            indices,
            palette,
            height_map,
        }
    }

    #[test]
    fn accumulates_downward() {
        // A 6x6 image: a 3x3 block of layer 1 inside layer 0 background.
        let mut indices = vec![0u8; 36];
        for y in 1..4usize {
            for x in 1..4usize {
                indices[y * 6 + x] = 1;
            }
        }
        let mut image = image_from_indices(6, 6, indices, 2);
        let components = ctx_run(&mut image);

        // Layer 0: whole image (accumulated). Layer 1: the block.
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].layer, 0);
        assert_eq!(components[0].area, 36);
        assert_eq!(components[1].layer, 1);
        assert_eq!(components[1].area, 9);
        assert_eq!(
            components[1].bounds,
            IntRect::from_xywh(1, 1, 3, 3).unwrap()
        );
    }

    #[test]
    fn separates_disconnected_blobs() {
        // Two separated 16-pixel squares of layer 1.
        let mut indices = vec![0u8; 12 * 12];
        for y in 0..4usize {
            for x in 0..4usize {
                indices[y * 12 + x] = 1;
                indices[(y + 8) * 12 + (x + 8)] = 1;
            }
        }
        let mut image = image_from_indices(12, 12, indices, 2);
        let components = ctx_run(&mut image);

        let layer1: Vec<_> = components.iter().filter(|c| c.layer == 1).collect();
        assert_eq!(layer1.len(), 2);
        assert!(layer1.iter().all(|c| c.area == 16));
    }

    #[test]
    fn small_component_merges_into_neighbor() {
        // A big layer-1 square plus a 2x2 speck of layer 1 far away.
        let mut indices = vec![0u8; 16 * 16];
        for y in 0..8usize {
            for x in 0..8usize {
                indices[y * 16 + x] = 1;
            }
        }
        indices[15 * 16 + 14] = 1;
        indices[15 * 16 + 15] = 1;
        indices[14 * 16 + 14] = 1;
        indices[14 * 16 + 15] = 1;

        let mut image = image_from_indices(16, 16, indices, 2);
        let components = ctx_run(&mut image);

        let layer1: Vec<_> = components.iter().filter(|c| c.layer == 1).collect();
        assert_eq!(layer1.len(), 1);
        assert_eq!(layer1[0].area, 64 + 4);
    }

    #[test]
    fn orphan_speck_demotes_to_darker_layer() {
        // Layer 1 exists only as a sub-threshold speck; its pixels must fall
        // back to layer 0 and the indices must reflect that.
        let mut indices = vec![0u8; 8 * 8];
        indices[0] = 1;
        indices[1] = 1;

        let mut image = image_from_indices(8, 8, indices, 2);
        let components = ctx_run(&mut image);

        assert!(components.iter().all(|c| c.layer == 0));
        assert_eq!(image.indices[0], 0);
        assert_eq!(image.indices[1], 0);
        assert_eq!(image.height_map[0], 0.0);

        // Layer 0 absorbed the whole image.
        let layer0: Vec<_> = components.iter().filter(|c| c.layer == 0).collect();
        assert_eq!(layer0.len(), 1);
        assert_eq!(layer0[0].area, 64);
    }

    #[test]
    fn void_pixels_form_holes() {
        // A ring of layer 0 around a void center.
        let mut indices = vec![0u8; 5 * 5];
        indices[2 * 5 + 2] = VOID_INDEX;
        let mut image = image_from_indices(5, 5, indices, 1);
        let components = ctx_run(&mut image);

        assert_eq!(components.len(), 1);
        assert_eq!(components[0].area, 24);
        assert_eq!(components[0].bounds, IntRect::from_xywh(0, 0, 5, 5).unwrap());
    }
}
