// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::HashSet;

use crate::color::ColorU8;
use crate::error::Error;
use crate::pixmap::Pixmap;
use crate::progress::{JobCtx, Stage};

/// The largest number of pixels drawn from the source image.
pub const MAX_SAMPLES: usize = 10_000;

// How many times a void pick is redrawn before the tile is abandoned.
const VOID_RETRIES: usize = 16;

/// Draws up to [`MAX_SAMPLES`] non-void pixels from the image.
///
/// Uses stratified sampling: the image is divided into a uniform tile grid and
/// one pixel is picked uniformly at random per tile. When the image has fewer
/// tiles than samples, the remainder is drawn uniformly without replacement.
///
/// Deterministic for a given RNG state.
pub(crate) fn sample_pixels(
    pixmap: &Pixmap,
    rng: &mut fastrand::Rng,
    ctx: &JobCtx,
) -> Result<Vec<ColorU8>, Error> {
    let w = pixmap.width();
    let h = pixmap.height();
    let total = w as usize * h as usize;
    let target = MAX_SAMPLES.min(total);

    // A tile grid of sqrt(N) x sqrt(N), shrunk to the image when it is smaller.
    let grid = (target as f32).sqrt().ceil() as u32;
    let tiles_x = grid.min(w);
    let tiles_y = grid.min(h);

    let mut samples = Vec::with_capacity(target);
    let mut picked = HashSet::with_capacity(target);

    for ty in 0..tiles_y {
        ctx.check()?;
        ctx.emit(
            Stage::Sample,
            ty as f32 / tiles_y as f32,
            format!("sampling tile row {}/{}", ty + 1, tiles_y),
        );

        let y0 = ty * h / tiles_y;
        let y1 = (ty + 1) * h / tiles_y;
        for tx in 0..tiles_x {
            let x0 = tx * w / tiles_x;
            let x1 = (tx + 1) * w / tiles_x;

            for _ in 0..VOID_RETRIES {
                let x = rng.u32(x0..x1.max(x0 + 1));
                let y = rng.u32(y0..y1.max(y0 + 1));
                let color = pixmap.pixel(x, y);
                if !color.is_void() {
                    picked.insert(y as u64 * w as u64 + x as u64);
                    samples.push(color);
                    break;
                }
            }
        }
    }

    // Fewer tiles than requested samples: top up uniformly, skipping pixels
    // that were already taken.
    let tiles = tiles_x as usize * tiles_y as usize;
    if tiles < target {
        let mut attempts = 0usize;
        let max_attempts = (target - samples.len()).saturating_mul(8) + 64;
        while samples.len() < target && attempts < max_attempts {
            attempts += 1;
            let index = rng.u64(0..total as u64);
            if !picked.insert(index) {
                continue;
            }

            let x = (index % w as u64) as u32;
            let y = (index / w as u64) as u32;
            let color = pixmap.pixel(x, y);
            if !color.is_void() {
                samples.push(color);
            }
        }
    }

    ctx.emit(
        Stage::Sample,
        1.0,
        format!("collected {} samples", samples.len()),
    );
    log::debug!("sampler: {} samples from {}x{}", samples.len(), w, h);

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelSignal, NullProgress};

    fn ctx_parts() -> (NullProgress, CancelSignal) {
        (NullProgress, CancelSignal::new())
    }

    fn solid_pixmap(w: u32, h: u32, rgba: [u8; 4]) -> Pixmap {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _ in 0..w * h {
            data.extend_from_slice(&rgba);
        }
        Pixmap::from_vec(data, w, h).unwrap()
    }

    #[test]
    fn samples_every_pixel_of_a_small_image() {
        let (sink, cancel) = ctx_parts();
        let ctx = JobCtx::new(&sink, &cancel, None);
        let pixmap = solid_pixmap(4, 4, [10, 20, 30, 255]);
        let mut rng = fastrand::Rng::with_seed(42);
        let samples = sample_pixels(&pixmap, &mut rng, &ctx).unwrap();
        // 16 tiles, one sample each.
        assert_eq!(samples.len(), 16);
        assert!(samples.iter().all(|&c| c == ColorU8::from_rgba(10, 20, 30, 255)));
    }

    #[test]
    fn skips_void_pixels() {
        let (sink, cancel) = ctx_parts();
        let ctx = JobCtx::new(&sink, &cancel, None);
        let pixmap = solid_pixmap(8, 8, [10, 20, 30, 0]);
        let mut rng = fastrand::Rng::with_seed(42);
        let samples = sample_pixels(&pixmap, &mut rng, &ctx).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn deterministic_for_a_seed() {
        let (sink, cancel) = ctx_parts();
        let ctx = JobCtx::new(&sink, &cancel, None);
        let mut data = Vec::new();
        for i in 0..64u32 * 64 {
            let v = (i % 251) as u8;
            data.extend_from_slice(&[v, v.wrapping_add(3), v.wrapping_mul(2), 255]);
        }
        let pixmap = Pixmap::from_vec(data, 64, 64).unwrap();

        let mut rng = fastrand::Rng::with_seed(7);
        let first = sample_pixels(&pixmap, &mut rng, &ctx).unwrap();
        let mut rng = fastrand::Rng::with_seed(7);
        let second = sample_pixels(&pixmap, &mut rng, &ctx).unwrap();
        assert_eq!(first, second);
    }
}
