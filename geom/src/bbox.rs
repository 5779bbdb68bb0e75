// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::Point3;

/// An axis-aligned 3D bounding box.
///
/// # Guarantees
///
/// - All components are finite.
/// - `min` is component-wise less than or equal to `max`.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Box3 {
    min: Point3,
    max: Point3,
}

impl Box3 {
    /// Creates a new `Box3`.
    ///
    /// Returns `None` when a component is not finite or `min` > `max`.
    pub fn from_min_max(min: Point3, max: Point3) -> Option<Self> {
        if !min.is_finite() || !max.is_finite() {
            return None;
        }

        if min.x > max.x || min.y > max.y || min.z > max.z {
            return None;
        }

        Some(Box3 { min, max })
    }

    /// Computes the bounding box of a point set.
    ///
    /// Returns `None` for an empty set or when a point is not finite.
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        let first = *points.first()?;
        let mut min = first;
        let mut max = first;
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Box3::from_min_max(min, max)
    }

    /// Returns the minimum corner.
    pub fn min(&self) -> Point3 {
        self.min
    }

    /// Returns the maximum corner.
    pub fn max(&self) -> Point3 {
        self.max
    }

    /// Returns the smallest box enclosing both boxes.
    pub fn join(&self, other: &Self) -> Self {
        Box3 {
            min: Point3::from_xyz(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::from_xyz(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Returns the box extents, i.e. `max - min`.
    pub fn extents(&self) -> Point3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points() {
        assert_eq!(Box3::from_points(&[]), None);

        let b = Box3::from_points(&[
            Point3::from_xyz(1.0, 5.0, -1.0),
            Point3::from_xyz(-2.0, 0.0, 3.0),
        ])
        .unwrap();
        assert_eq!(b.min(), Point3::from_xyz(-2.0, 0.0, -1.0));
        assert_eq!(b.max(), Point3::from_xyz(1.0, 5.0, 3.0));
        assert_eq!(b.extents(), Point3::from_xyz(3.0, 5.0, 4.0));
    }

    #[test]
    fn invalid() {
        assert_eq!(
            Box3::from_min_max(Point3::from_xyz(1.0, 0.0, 0.0), Point3::zero()),
            None
        );
        assert_eq!(
            Box3::from_min_max(Point3::from_xyz(f32::NAN, 0.0, 0.0), Point3::zero()),
            None
        );
    }
}
