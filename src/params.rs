// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::time::Duration;

use crate::color::MAX_COLORS;
use crate::error::Error;

/// The tallest printable bookmark, base included.
pub const MAX_TOTAL_HEIGHT: f32 = 10.0;

/// Print job parameters.
///
/// All linear dimensions are in millimeters.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Params {
    /// Number of palette colors, 2..=8.
    pub color_count: u8,
    /// Thickness of a single color layer, 0.1..=0.5 mm.
    pub layer_thickness: f32,
    /// Thickness of the base slab, 1.0..=3.0 mm.
    pub base_thickness: f32,
    /// Bookmark width, 20..=200 mm.
    pub width: f32,
    /// Bookmark height, 30..=300 mm.
    pub height: f32,
    /// Base corner radius, 0..=10 mm, at most `min(width, height) / 2`.
    pub corner_radius: f32,

    /// Smallest printable detail.
    ///
    /// Controls contour simplification and component filtering.
    pub min_feature_size: f32,
    /// Minimal acceptable wall thickness, checked by the validator.
    pub min_wall_thickness: f32,
    /// Upper bound on the output vertex count; decimation kicks in above it.
    pub max_vertices: usize,
    /// Fraction of vertices the decimation pass tries to remove, 0..=0.9.
    pub simplification_ratio: f32,

    /// Upper bound on the working memory, in bytes.
    ///
    /// The input is downscaled until the estimated working set fits.
    pub memory_budget: usize,
    /// Optional wall-clock budget for the whole job.
    pub time_budget: Option<Duration>,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            color_count: 4,
            layer_thickness: 0.2,
            base_thickness: 2.0,
            width: 50.0,
            height: 150.0,
            corner_radius: 3.0,
            min_feature_size: 0.5,
            min_wall_thickness: 0.4,
            max_vertices: 50_000,
            simplification_ratio: 0.5,
            memory_budget: 500 * 1024 * 1024,
            time_budget: Some(Duration::from_secs(30)),
        }
    }
}

impl Params {
    /// Checks every field against its documented range.
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), Error> {
        check_range(
            "color_count",
            self.color_count as f32,
            2.0,
            MAX_COLORS as f32,
            "2..=8",
        )?;
        check_range(
            "layer_thickness",
            self.layer_thickness,
            0.1,
            0.5,
            "0.1..=0.5 mm",
        )?;
        check_range(
            "base_thickness",
            self.base_thickness,
            1.0,
            3.0,
            "1.0..=3.0 mm",
        )?;
        check_range("width", self.width, 20.0, 200.0, "20..=200 mm")?;
        check_range("height", self.height, 30.0, 300.0, "30..=300 mm")?;
        check_range("corner_radius", self.corner_radius, 0.0, 10.0, "0..=10 mm")?;

        let max_radius = self.width.min(self.height) / 2.0;
        if self.corner_radius > max_radius {
            return Err(Error::InvalidParameter {
                name: "corner_radius",
                value: self.corner_radius,
                range: "0..=min(width, height)/2 mm",
            });
        }

        let total = self.base_thickness + (self.color_count as f32 - 1.0) * self.layer_thickness;
        if total > MAX_TOTAL_HEIGHT {
            return Err(Error::InvalidParameter {
                name: "base_thickness",
                value: total,
                range: "base_thickness + (color_count - 1) * layer_thickness <= 10 mm",
            });
        }

        check_range(
            "min_feature_size",
            self.min_feature_size,
            0.05,
            10.0,
            "0.05..=10 mm",
        )?;
        check_range(
            "min_wall_thickness",
            self.min_wall_thickness,
            0.05,
            10.0,
            "0.05..=10 mm",
        )?;
        check_range(
            "simplification_ratio",
            self.simplification_ratio,
            0.0,
            0.9,
            "0..=0.9",
        )?;
        if self.max_vertices == 0 {
            return Err(Error::InvalidParameter {
                name: "max_vertices",
                value: 0.0,
                range: "1..",
            });
        }
        if self.memory_budget == 0 {
            return Err(Error::InvalidParameter {
                name: "memory_budget",
                value: 0.0,
                range: "1..",
            });
        }

        Ok(())
    }

    /// Returns the bottom Z of the given layer.
    ///
    /// The darkest layer is co-extruded with the base slab and starts at zero;
    /// every following layer stacks one `layer_thickness` on top.
    pub fn layer_z_bottom(&self, layer: u8) -> f32 {
        if layer == 0 {
            0.0
        } else {
            self.base_thickness + (layer as f32 - 1.0) * self.layer_thickness
        }
    }

    /// Returns the top Z of the given layer.
    pub fn layer_z_top(&self, layer: u8) -> f32 {
        if layer == 0 {
            self.base_thickness
        } else {
            self.layer_z_bottom(layer) + self.layer_thickness
        }
    }

    /// Returns the total stack height for the given effective layer count.
    pub fn total_height(&self, layer_count: usize) -> f32 {
        if layer_count > 1 {
            self.base_thickness + (layer_count as f32 - 1.0) * self.layer_thickness
        } else {
            self.base_thickness
        }
    }
}

fn check_range(
    name: &'static str,
    value: f32,
    min: f32,
    max: f32,
    range: &'static str,
) -> Result<(), Error> {
    if !value.is_finite() || value < min || value > max {
        return Err(Error::InvalidParameter { name, value, range });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range() {
        let mut params = Params::default();
        params.color_count = 1;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.color_count = 9;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.layer_thickness = 0.6;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.width = f32::NAN;
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_oversized_radius() {
        let mut params = Params::default();
        params.width = 20.0;
        params.corner_radius = 10.5;
        assert!(params.validate().is_err());

        params.corner_radius = 10.0;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn z_stacking() {
        let params = Params::default();
        assert_eq!(params.layer_z_bottom(0), 0.0);
        assert_eq!(params.layer_z_top(0), 2.0);
        assert_eq!(params.layer_z_bottom(1), 2.0);
        assert!((params.layer_z_top(1) - 2.2).abs() < 1e-6);
        assert!((params.layer_z_bottom(3) - 2.4).abs() < 1e-6);
        assert!((params.total_height(4) - 2.6).abs() < 1e-6);
        assert_eq!(params.total_height(1), 2.0);
    }
}
