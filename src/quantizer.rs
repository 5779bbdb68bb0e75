// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::HashSet;

use arrayvec::ArrayVec;

use crate::color::{self, ColorU8, Palette, MAX_COLORS};
use crate::error::Error;
use crate::pixmap::Pixmap;
use crate::pool::BufferPool;
use crate::progress::{JobCtx, Stage};

/// The `indices` value of a void pixel.
pub const VOID_INDEX: u8 = 255;

/// Mean centroid displacement below which k-means is considered converged,
/// in 8-bit RGB channel units.
pub const CONVERGENCE_THRESHOLD: f32 = 0.1;

/// Hard cap on k-means iterations.
pub const MAX_ITERATIONS: u32 = 50;

// Cancellation is observed every this many pixels during full-image assignment.
const ASSIGN_CHUNK: usize = 10_000;

/// The image after color quantization.
#[derive(Clone, Debug)]
pub struct QuantizedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Per-pixel palette index, or [`VOID_INDEX`] for void pixels.
    pub indices: Vec<u8>,
    /// The palette, sorted darkest first.
    pub palette: Palette,
    /// Per-pixel normalized layer height in the 0..=1 range.
    pub height_map: Vec<f32>,
}

impl QuantizedImage {
    /// Returns the number of layers, i.e. the effective palette size.
    pub fn layer_count(&self) -> usize {
        self.palette.len()
    }
}

pub(crate) struct QuantizeResult {
    pub image: QuantizedImage,
    /// Mean squared RGB distance of the samples to their final centroid.
    pub mean_error: f32,
    /// Whether the palette was truncated because the input had fewer
    /// distinct colors than requested.
    pub truncated: bool,
}

/// Clusters the samples with k-means and assigns every image pixel
/// to its nearest centroid.
pub(crate) fn quantize(
    pixmap: &Pixmap,
    samples: &[ColorU8],
    color_count: u8,
    rng: &mut fastrand::Rng,
    pool: &mut BufferPool,
    ctx: &JobCtx,
) -> Result<QuantizeResult, Error> {
    let k = color_count as usize;

    // Flat RGB triplets; keeps centroid math out of u8 space.
    let mut points = pool.acquire_f32(samples.len() * 3);
    for &c in samples {
        points.push(c.red() as f32);
        points.push(c.green() as f32);
        points.push(c.blue() as f32);
    }

    let result = quantize_inner(pixmap, samples, &points, k, rng, ctx);
    pool.release_f32(points);
    result
}

fn quantize_inner(
    pixmap: &Pixmap,
    samples: &[ColorU8],
    points: &[f32],
    k: usize,
    rng: &mut fastrand::Rng,
    ctx: &JobCtx,
) -> Result<QuantizeResult, Error> {
    let n = samples.len();

    if n == 0 {
        // Nothing but voids; the geometry degenerates to the bare base slab.
        log::warn!("quantizer: no non-void samples, producing an empty palette");
        let total = pixmap.width() as usize * pixmap.height() as usize;
        return Ok(QuantizeResult {
            image: QuantizedImage {
                width: pixmap.width(),
                height: pixmap.height(),
                indices: vec![VOID_INDEX; total],
                palette: Palette::new(),
                height_map: vec![0.0; total],
            },
            mean_error: 0.0,
            truncated: true,
        });
    }

    let distinct = distinct_rgb_count(samples, k + 1);
    let mut truncated = false;

    let mut centroids: Vec<[f32; 3]>;
    let mut mean_error = 0.0;
    if distinct <= k {
        // Monochrome-ish input: the distinct colors are the exact palette and
        // k-means would only churn. Truncate and report.
        centroids = distinct_centroids(samples, k);
        truncated = centroids.len() < k;
        if truncated {
            log::warn!(
                "quantizer: only {} distinct colors for {} requested",
                centroids.len(),
                k
            );
        }
    } else {
        centroids = seed_plus_plus(points, n, k, rng);
        mean_error = lloyd(points, n, &mut centroids, ctx)?;
    }

    // Luminance sort drives both the layer stacking and the height map.
    let mut palette = Palette::new();
    for c in &centroids {
        palette.push(ColorU8::from_rgba(
            (c[0] + 0.5) as u8,
            (c[1] + 0.5) as u8,
            (c[2] + 0.5) as u8,
            255,
        ));
    }
    truncated |= dedup_palette(&mut palette, &mut centroids);
    let remap = color::sort_by_luminance(&mut palette);

    let image = assign_pixels(pixmap, &centroids, &palette, &remap, ctx)?;

    Ok(QuantizeResult {
        image,
        mean_error,
        truncated,
    })
}

/// Counts distinct RGB values, stopping at `limit`.
fn distinct_rgb_count(samples: &[ColorU8], limit: usize) -> usize {
    let mut seen = HashSet::with_capacity(limit);
    for &c in samples {
        seen.insert(c.get() & 0x00FF_FFFF);
        if seen.len() >= limit {
            break;
        }
    }
    seen.len()
}

fn distinct_centroids(samples: &[ColorU8], k: usize) -> Vec<[f32; 3]> {
    let mut seen = HashSet::with_capacity(k);
    let mut centroids = Vec::with_capacity(k);
    for &c in samples {
        if seen.insert(c.get() & 0x00FF_FFFF) {
            centroids.push([c.red() as f32, c.green() as f32, c.blue() as f32]);
        }
    }
    centroids
}

/// k-means++ seeding: the first centroid is uniform, every following one is
/// picked with probability proportional to the squared distance to the
/// nearest already-chosen centroid.
fn seed_plus_plus(points: &[f32], n: usize, k: usize, rng: &mut fastrand::Rng) -> Vec<[f32; 3]> {
    let mut centroids: Vec<[f32; 3]> = Vec::with_capacity(k);
    centroids.push(point_at(points, rng.usize(0..n)));

    let mut dist = vec![f32::MAX; n];
    while centroids.len() < k {
        let last = centroids[centroids.len() - 1];
        let mut total = 0.0f64;
        for i in 0..n {
            let d = distance_sq(point_at(points, i), last);
            if d < dist[i] {
                dist[i] = d;
            }
            total += dist[i] as f64;
        }

        let next = if total > 0.0 {
            let mut r = rng.f64() * total;
            let mut chosen = n - 1;
            for (i, &d) in dist.iter().enumerate() {
                r -= d as f64;
                if r <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            // All samples coincide with a centroid already.
            rng.usize(0..n)
        };
        centroids.push(point_at(points, next));
    }

    centroids
}

/// Lloyd iterations: assignment plus centroid update until the mean centroid
/// displacement falls below [`CONVERGENCE_THRESHOLD`] or [`MAX_ITERATIONS`]
/// is reached. Returns the final mean squared error of the samples.
fn lloyd(
    points: &[f32],
    n: usize,
    centroids: &mut Vec<[f32; 3]>,
    ctx: &JobCtx,
) -> Result<f32, Error> {
    let k = centroids.len();
    let mut assignment = vec![0u8; n];

    for iteration in 0..MAX_ITERATIONS {
        ctx.check()?;

        let mut error = 0.0f64;
        for i in 0..n {
            let p = point_at(points, i);
            let (best, d) = nearest_centroid(p, centroids);
            assignment[i] = best as u8;
            error += d as f64;
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for i in 0..n {
            let p = point_at(points, i);
            let a = assignment[i] as usize;
            sums[a][0] += p[0] as f64;
            sums[a][1] += p[1] as f64;
            sums[a][2] += p[2] as f64;
            counts[a] += 1;
        }

        let mut displacement = 0.0f32;
        for c in 0..k {
            if counts[c] == 0 {
                // Reseed an empty cluster to the sample farthest
                // from its current centroid.
                let far = farthest_sample(points, n, &assignment, centroids);
                centroids[c] = far;
                displacement += f32::MAX / k as f32;
                continue;
            }

            let new = [
                (sums[c][0] / counts[c] as f64) as f32,
                (sums[c][1] / counts[c] as f64) as f32,
                (sums[c][2] / counts[c] as f64) as f32,
            ];
            displacement += distance_sq(centroids[c], new).sqrt();
            centroids[c] = new;
        }
        displacement /= k as f32;

        ctx.emit_iteration(
            Stage::Quantize,
            0.5 * (iteration + 1) as f32 / MAX_ITERATIONS as f32,
            format!("k-means iteration {}", iteration + 1),
            iteration + 1,
        );

        if displacement < CONVERGENCE_THRESHOLD {
            log::debug!("quantizer: converged after {} iterations", iteration + 1);
            return Ok((error / n as f64) as f32);
        }
    }

    // Not converged; compute the error of the final state.
    let mut error = 0.0f64;
    for i in 0..n {
        let (_, d) = nearest_centroid(point_at(points, i), centroids);
        error += d as f64;
    }
    Ok((error / n as f64) as f32)
}

fn farthest_sample(
    points: &[f32],
    n: usize,
    assignment: &[u8],
    centroids: &[[f32; 3]],
) -> [f32; 3] {
    let mut best = 0;
    let mut best_d = -1.0;
    for i in 0..n {
        let d = distance_sq(point_at(points, i), centroids[assignment[i] as usize]);
        if d > best_d {
            best_d = d;
            best = i;
        }
    }
    point_at(points, best)
}

/// Rounding to u8 can collapse close centroids into one palette entry;
/// drop the duplicates and their centroids so layer indices stay unique.
fn dedup_palette(palette: &mut Palette, centroids: &mut Vec<[f32; 3]>) -> bool {
    let mut unique = Palette::new();
    let mut kept: ArrayVec<[f32; 3], MAX_COLORS> = ArrayVec::new();
    for (i, &c) in palette.iter().enumerate() {
        if !unique.contains(&c) {
            unique.push(c);
            kept.push(centroids[i]);
        }
    }

    let deduped = unique.len() < palette.len();
    if deduped {
        log::debug!(
            "quantizer: {} centroids collapsed into {} palette entries",
            palette.len(),
            unique.len()
        );
        *palette = unique;
        *centroids = kept.to_vec();
    }
    deduped
}

/// Maps every image pixel to its nearest centroid and builds the height map.
fn assign_pixels(
    pixmap: &Pixmap,
    centroids: &[[f32; 3]],
    palette: &Palette,
    remap: &[u8],
    ctx: &JobCtx,
) -> Result<QuantizedImage, Error> {
    let w = pixmap.width();
    let h = pixmap.height();
    let total = w as usize * h as usize;

    let mut indices = vec![VOID_INDEX; total];
    let mut height_map = vec![0.0f32; total];

    let height_scale = if palette.len() > 1 {
        1.0 / (palette.len() - 1) as f32
    } else {
        0.0
    };

    let mut processed = 0usize;
    for y in 0..h {
        for x in 0..w {
            if processed % ASSIGN_CHUNK == 0 {
                ctx.check()?;
                ctx.emit(
                    Stage::Quantize,
                    0.5 + 0.5 * processed as f32 / total as f32,
                    "assigning pixels",
                );
            }
            processed += 1;

            let color = pixmap.pixel(x, y);
            if color.is_void() {
                continue;
            }

            let p = [color.red() as f32, color.green() as f32, color.blue() as f32];
            let (nearest, _) = nearest_centroid(p, centroids);
            let index = remap[nearest];
            let i = y as usize * w as usize + x as usize;
            indices[i] = index;
            height_map[i] = index as f32 * height_scale;
        }
    }

    ctx.emit(Stage::Quantize, 1.0, "quantization done");

    Ok(QuantizedImage {
        width: w,
        height: h,
        indices,
        palette: palette.clone(),
        height_map,
    })
}

fn nearest_centroid(p: [f32; 3], centroids: &[[f32; 3]]) -> (usize, f32) {
    let mut best = 0;
    let mut best_d = f32::MAX;
    for (i, &c) in centroids.iter().enumerate() {
        let d = distance_sq(p, c);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    (best, best_d)
}

#[inline]
fn point_at(points: &[f32], i: usize) -> [f32; 3] {
    [points[i * 3], points[i * 3 + 1], points[i * 3 + 2]]
}

#[inline]
fn distance_sq(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelSignal, NullProgress};

    fn run(pixmap: &Pixmap, samples: &[ColorU8], k: u8) -> QuantizeResult {
        let sink = NullProgress;
        let cancel = CancelSignal::new();
        let ctx = JobCtx::new(&sink, &cancel, None);
        let mut rng = fastrand::Rng::with_seed(42);
        let mut pool = BufferPool::new();
        quantize(pixmap, samples, k, &mut rng, &mut pool, &ctx).unwrap()
    }

    fn two_tone_pixmap() -> Pixmap {
        // Left half black, right half white.
        let mut data = Vec::new();
        for _y in 0..4 {
            for x in 0..4 {
                if x < 2 {
                    data.extend_from_slice(&[0, 0, 0, 255]);
                } else {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                }
            }
        }
        Pixmap::from_vec(data, 4, 4).unwrap()
    }

    #[test]
    fn monochrome_truncates() {
        let pixmap = two_tone_pixmap();
        let samples = vec![ColorU8::BLACK; 32];
        let result = run(&pixmap, &samples, 4);
        assert!(result.truncated);
        assert_eq!(result.image.palette.len(), 1);
        // With a single palette entry the height map is all zeros.
        assert!(result.image.height_map.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn two_tone_layers() {
        let pixmap = two_tone_pixmap();
        let mut samples = vec![ColorU8::BLACK; 16];
        samples.extend(vec![ColorU8::WHITE; 16]);
        let result = run(&pixmap, &samples, 2);

        // Exactly as many distinct colors as requested; nothing was dropped.
        assert!(!result.truncated);
        let image = &result.image;
        assert_eq!(image.palette.len(), 2);
        assert_eq!(image.palette[0], ColorU8::BLACK);
        assert_eq!(image.palette[1], ColorU8::WHITE);

        for y in 0..4usize {
            for x in 0..4usize {
                let i = y * 4 + x;
                if x < 2 {
                    assert_eq!(image.indices[i], 0);
                    assert_eq!(image.height_map[i], 0.0);
                } else {
                    assert_eq!(image.indices[i], 1);
                    assert_eq!(image.height_map[i], 1.0);
                }
            }
        }
    }

    #[test]
    fn kmeans_separates_clusters() {
        // Three well-separated color blobs, k = 3.
        let mut data = Vec::new();
        let colors: [[u8; 4]; 3] = [[250, 10, 10, 255], [10, 250, 10, 255], [10, 10, 250, 255]];
        for i in 0..96u32 {
            let c = colors[(i / 32) as usize];
            data.extend_from_slice(&c);
        }
        let pixmap = Pixmap::from_vec(data, 96, 1).unwrap();

        let mut samples = Vec::new();
        for c in &colors {
            for j in 0..40u8 {
                // Small deterministic jitter so k-means has real work.
                samples.push(ColorU8::from_rgba(
                    c[0].wrapping_add(j % 5),
                    c[1].wrapping_add(j % 3),
                    c[2],
                    255,
                ));
            }
        }

        let result = run(&pixmap, &samples, 3);
        assert!(!result.truncated);
        let image = &result.image;
        assert_eq!(image.palette.len(), 3);

        // Palette is luminance sorted: blue darkest, then red, green brightest.
        assert!(image.palette[0].blue() > 200);
        assert!(image.palette[1].red() > 200);
        assert!(image.palette[2].green() > 200);

        // Every pixel of a blob maps to one layer.
        assert_eq!(image.indices[0], image.indices[31]);
        assert_eq!(image.indices[32], image.indices[63]);
        assert_ne!(image.indices[0], image.indices[32]);
    }

    #[test]
    fn void_pixels_are_untouched() {
        let data = vec![
            0, 0, 0, 255, 255, 255, 255, 0, //
            255, 255, 255, 255, 0, 0, 0, 0,
        ];
        let pixmap = Pixmap::from_vec(data, 2, 2).unwrap();
        let samples = vec![ColorU8::BLACK, ColorU8::WHITE];
        let image = run(&pixmap, &samples, 2).image;

        assert_eq!(image.indices[0], 0);
        assert_eq!(image.indices[1], VOID_INDEX);
        assert_eq!(image.indices[2], 1);
        assert_eq!(image.indices[3], VOID_INDEX);
        assert_eq!(image.height_map[1], 0.0);
        assert_eq!(image.height_map[3], 0.0);
    }

    #[test]
    fn deterministic() {
        let pixmap = two_tone_pixmap();
        let mut samples = Vec::new();
        for i in 0..200u8 {
            samples.push(ColorU8::from_rgba(i, i.wrapping_mul(3), 255 - i, 255));
        }
        let a = run(&pixmap, &samples, 5);
        let b = run(&pixmap, &samples, 5);
        assert_eq!(a.image.indices, b.image.indices);
        assert_eq!(a.image.palette, b.image.palette);
        assert_eq!(a.mean_error, b.mean_error);
    }
}
