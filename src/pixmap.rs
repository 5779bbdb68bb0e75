// Copyright 2006 The Android Open Source Project
// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use lithomark_geom::IntSize;

use crate::color::ColorU8;
use crate::error::Error;

/// Number of bytes per pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// The largest supported image dimension.
pub const MAX_DIMENSION: u32 = 4096;

/// A container that owns non-premultiplied RGBA pixels.
///
/// The data is not aligned, therefore width == stride.
#[derive(Clone, PartialEq)]
pub struct Pixmap {
    data: Vec<u8>,
    size: IntSize,
}

impl Pixmap {
    /// Allocates a new pixmap.
    ///
    /// A pixmap is filled with transparent black by default, aka (0, 0, 0, 0),
    /// which the pipeline treats as a void.
    pub fn new(width: u32, height: u32) -> Result<Self, Error> {
        let size = checked_size(width, height)?;
        Ok(Pixmap {
            data: vec![0; size.area() * BYTES_PER_PIXEL],
            size,
        })
    }

    /// Creates a pixmap from an existing pixel buffer.
    ///
    /// The buffer is row-major RGBA, four bytes per pixel, alpha not
    /// premultiplied. Its length must be exactly `width * height * 4`.
    pub fn from_vec(data: Vec<u8>, width: u32, height: u32) -> Result<Self, Error> {
        let size = checked_size(width, height)?;
        let expected = size.area() * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(Error::UnsupportedImage {
                reason: format!(
                    "pixel buffer length is {}, expected {}",
                    data.len(),
                    expected
                ),
            });
        }

        Ok(Pixmap { data, size })
    }

    /// Returns pixmap's width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.size.width()
    }

    /// Returns pixmap's height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.size.height()
    }

    /// Returns pixmap's size.
    #[inline]
    pub fn size(&self) -> IntSize {
        self.size
    }

    /// Returns the internal data.
    ///
    /// Byteorder: RGBA
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the color of the pixel at the provided position.
    ///
    /// The caller must guarantee that `x` and `y` are in bounds.
    #[inline]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> ColorU8 {
        debug_assert!(x < self.width() && y < self.height());
        let offset = (y as usize * self.width() as usize + x as usize) * BYTES_PER_PIXEL;
        let rgba = arrayref::array_ref![self.data, offset, BYTES_PER_PIXEL];
        ColorU8::from_rgba(rgba[0], rgba[1], rgba[2], rgba[3])
    }

    /// Scales the pixmap into a new one using bilinear sampling.
    ///
    /// Alpha is interpolated like any other channel; the void threshold is
    /// applied afterwards by the quantizer.
    pub fn scaled_to(&self, size: IntSize) -> Pixmap {
        let src_w = self.width() as f32;
        let src_h = self.height() as f32;
        let dst_w = size.width();
        let dst_h = size.height();
        let scale_x = src_w / dst_w as f32;
        let scale_y = src_h / dst_h as f32;

        let mut data = Vec::with_capacity(size.area() * BYTES_PER_PIXEL);
        for dy in 0..dst_h {
            let fy = ((dy as f32 + 0.5) * scale_y - 0.5).max(0.0);
            let y0 = (fy as u32).min(self.height() - 1);
            let y1 = (y0 + 1).min(self.height() - 1);
            let ty = fy - y0 as f32;

            for dx in 0..dst_w {
                let fx = ((dx as f32 + 0.5) * scale_x - 0.5).max(0.0);
                let x0 = (fx as u32).min(self.width() - 1);
                let x1 = (x0 + 1).min(self.width() - 1);
                let tx = fx - x0 as f32;

                let p00 = self.pixel(x0, y0);
                let p10 = self.pixel(x1, y0);
                let p01 = self.pixel(x0, y1);
                let p11 = self.pixel(x1, y1);

                data.push(lerp2(p00.red(), p10.red(), p01.red(), p11.red(), tx, ty));
                data.push(lerp2(
                    p00.green(),
                    p10.green(),
                    p01.green(),
                    p11.green(),
                    tx,
                    ty,
                ));
                data.push(lerp2(p00.blue(), p10.blue(), p01.blue(), p11.blue(), tx, ty));
                data.push(lerp2(
                    p00.alpha(),
                    p10.alpha(),
                    p01.alpha(),
                    p11.alpha(),
                    tx,
                    ty,
                ));
            }
        }

        Pixmap { data, size }
    }

    /// Decodes a PNG data into a `Pixmap`.
    ///
    /// Only 8-bit images are supported.
    /// Index PNGs are not supported.
    #[cfg(feature = "png-format")]
    pub fn decode_png(data: &[u8]) -> Result<Self, Error> {
        let decoder = png::Decoder::new(data);
        let mut reader = decoder.read_info().map_err(png_error)?;

        let mut img_data = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut img_data).map_err(png_error)?;
        img_data.truncate(info.buffer_size());

        if info.bit_depth != png::BitDepth::Eight {
            return Err(Error::UnsupportedImage {
                reason: "unsupported PNG bit depth".to_string(),
            });
        }

        let img_data = match info.color_type {
            png::ColorType::Rgb => {
                let mut rgba_data = Vec::with_capacity(img_data.len() / 3 * 4);
                for rgb in img_data.chunks(3) {
                    rgba_data.push(rgb[0]);
                    rgba_data.push(rgb[1]);
                    rgba_data.push(rgb[2]);
                    rgba_data.push(255);
                }
                rgba_data
            }
            png::ColorType::Rgba => img_data,
            png::ColorType::Grayscale => {
                let mut rgba_data = Vec::with_capacity(img_data.len() * 4);
                for gray in img_data {
                    rgba_data.push(gray);
                    rgba_data.push(gray);
                    rgba_data.push(gray);
                    rgba_data.push(255);
                }
                rgba_data
            }
            png::ColorType::GrayscaleAlpha => {
                let mut rgba_data = Vec::with_capacity(img_data.len() * 2);
                for slice in img_data.chunks(2) {
                    let gray = slice[0];
                    let alpha = slice[1];
                    rgba_data.push(gray);
                    rgba_data.push(gray);
                    rgba_data.push(gray);
                    rgba_data.push(alpha);
                }
                rgba_data
            }
            png::ColorType::Indexed => {
                return Err(Error::UnsupportedImage {
                    reason: "indexed PNG is not supported".to_string(),
                });
            }
        };

        Pixmap::from_vec(img_data, info.width, info.height)
    }

    /// Loads a PNG file into a `Pixmap`.
    ///
    /// Only 8-bit images are supported.
    /// Index PNGs are not supported.
    #[cfg(feature = "png-format")]
    pub fn load_png<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let data = std::fs::read(path).map_err(|e| Error::UnsupportedImage {
            reason: e.to_string(),
        })?;
        Self::decode_png(&data)
    }
}

impl std::fmt::Debug for Pixmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pixmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("data_len", &self.data.len())
            .finish()
    }
}

fn checked_size(width: u32, height: u32) -> Result<IntSize, Error> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::UnsupportedImage {
            reason: format!(
                "{}x{} exceeds the maximum dimension of {}",
                width, height, MAX_DIMENSION
            ),
        });
    }

    IntSize::from_wh(width, height).ok_or_else(|| Error::UnsupportedImage {
        reason: "zero width or height".to_string(),
    })
}

#[inline]
fn lerp2(c00: u8, c10: u8, c01: u8, c11: u8, tx: f32, ty: f32) -> u8 {
    let top = c00 as f32 + (c10 as f32 - c00 as f32) * tx;
    let bottom = c01 as f32 + (c11 as f32 - c01 as f32) * tx;
    (top + (bottom - top) * ty + 0.5) as u8
}

#[cfg(feature = "png-format")]
fn png_error(e: png::DecodingError) -> Error {
    Error::UnsupportedImage {
        reason: e.to_string(),
    }
}
