// Copyright 2006 The Android Open Source Project
// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use arrayvec::ArrayVec;

/// The largest number of colors a palette can hold.
pub const MAX_COLORS: usize = 8;

/// Pixels with alpha below this value are treated as a void, not a color.
pub const VOID_ALPHA_THRESHOLD: u8 = 128;

/// A quantization palette.
///
/// Sorted by luminance ascending: index 0 is the darkest color and also the
/// bottom layer of the printed stack.
pub type Palette = ArrayVec<ColorU8, MAX_COLORS>;

/// A 32-bit RGBA color value.
///
/// Alpha is not premultiplied.
///
/// Byteorder: ABGR
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ColorU8(u32);

impl ColorU8 {
    /// An opaque black color.
    pub const BLACK: Self = ColorU8::from_rgba(0, 0, 0, 255);

    /// An opaque white color.
    pub const WHITE: Self = ColorU8::from_rgba(255, 255, 255, 255);

    /// Creates a new color.
    #[inline]
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        ColorU8(pack_rgba(r, g, b, a))
    }

    /// Returns color's red component.
    #[inline]
    pub const fn red(self) -> u8 {
        ((self.0 >> 0) & 0xFF) as u8
    }

    /// Returns color's green component.
    #[inline]
    pub const fn green(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Returns color's blue component.
    #[inline]
    pub const fn blue(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// Returns color's alpha component.
    #[inline]
    pub const fn alpha(self) -> u8 {
        ((self.0 >> 24) & 0xFF) as u8
    }

    /// Checks that the pixel is a void.
    ///
    /// Alpha < 0.5
    #[inline]
    pub fn is_void(self) -> bool {
        self.alpha() < VOID_ALPHA_THRESHOLD
    }

    /// Returns the value as a primitive type.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the relative luminance in the 0..=1 range.
    ///
    /// Rec. 709 weights applied to linearized sRGB channels.
    /// Alpha is ignored.
    pub fn luminance(self) -> f32 {
        0.2126 * srgb_to_linear(self.red())
            + 0.7152 * srgb_to_linear(self.green())
            + 0.0722 * srgb_to_linear(self.blue())
    }

    /// Returns the squared Euclidean RGB distance to `other`.
    ///
    /// Measured in 8-bit channel units, so the result is in 0..=195075.
    /// Alpha is ignored.
    #[inline]
    pub fn distance_sq(self, other: ColorU8) -> f32 {
        let dr = self.red() as f32 - other.red() as f32;
        let dg = self.green() as f32 - other.green() as f32;
        let db = self.blue() as f32 - other.blue() as f32;
        dr * dr + dg * dg + db * db
    }
}

impl std::fmt::Debug for ColorU8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorU8")
            .field("r", &self.red())
            .field("g", &self.green())
            .field("b", &self.blue())
            .field("a", &self.alpha())
            .finish()
    }
}

#[inline]
const fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((g as u32) << 8) | ((r as u32) << 0)
}

/// Converts a single 8-bit sRGB channel into its linear value.
fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Sorts the palette by luminance ascending, darkest first.
///
/// Returns the remap table: `remap[old_index] = new_index`.
/// The sort is stable, therefore idempotent.
pub(crate) fn sort_by_luminance(palette: &mut Palette) -> ArrayVec<u8, MAX_COLORS> {
    let mut order: ArrayVec<u8, MAX_COLORS> = (0..palette.len() as u8).collect();
    // Luminance is finite by construction, so `partial_cmp` cannot fail.
    order.sort_by(|&a, &b| {
        palette[a as usize]
            .luminance()
            .partial_cmp(&palette[b as usize].luminance())
            .unwrap()
    });

    let sorted: Palette = order.iter().map(|&i| palette[i as usize]).collect();
    *palette = sorted;

    let mut remap = ArrayVec::from([0u8; MAX_COLORS]);
    remap.truncate(order.len());
    for (new_index, &old_index) in order.iter().enumerate() {
        remap[old_index as usize] = new_index as u8;
    }

    remap
}
