use nalgebra::{ClosedSub, Point3, Scalar, Vector3};

/// 3D axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB<T: Scalar + PartialOrd> {
    min: Point3<T>,
    max: Point3<T>,
}

impl<T: Scalar + ClosedSub + PartialOrd + Copy> AABB<T> {
    /// Creates a new AABB from the given minimum and maximum coordinates. Panics if the minimum position is
    /// not less than or equal to the maximum position
    /// ```
    /// # use ptiles_core::math::AABB;
    /// let bounds = AABB::from_min_max(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(1.0, 1.0, 1.0));
    /// ```
    pub fn from_min_max(min: Point3<T>, max: Point3<T>) -> Self {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            panic!("AABB::from_min_max: Minimum position must be <= maximum position!");
        }
        Self { min, max }
    }

    /// Creates a new AABB from the given minimum and maximum coordinates without checking that min <= max
    pub fn from_min_max_unchecked(min: Point3<T>, max: Point3<T>) -> Self {
        Self { min, max }
    }

    /// Returns the minimum point of this AABB
    pub fn min(&self) -> &Point3<T> {
        &self.min
    }

    /// Returns the maximum point of this AABB
    pub fn max(&self) -> &Point3<T> {
        &self.max
    }

    /// Returns the extent of this AABB. The extent is the size between the minimum and maximum position of this AABB
    /// ```
    /// # use ptiles_core::math::AABB;
    /// let bounds = AABB::from_min_max_unchecked(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(2.0, 1.0, 0.0));
    /// assert_eq!(bounds.extent(), nalgebra::Vector3::new(2.0, 1.0, 0.0));
    /// ```
    pub fn extent(&self) -> Vector3<T> {
        self.max - self.min
    }

    /// Extends the given AABB so that it contains the given point.
    /// ```
    /// # use ptiles_core::math::AABB;
    /// let bounds = AABB::from_min_max_unchecked(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(1.0, 1.0, 1.0));
    /// let extended_bounds = AABB::extend_with_point(&bounds, &nalgebra::Point3::new(2.0, -1.0, 0.5));
    /// assert_eq!(*extended_bounds.min(), nalgebra::Point3::new(0.0, -1.0, 0.0));
    /// assert_eq!(*extended_bounds.max(), nalgebra::Point3::new(2.0, 1.0, 1.0));
    /// ```
    pub fn extend_with_point(bounds: &AABB<T>, point: &Point3<T>) -> AABB<T> {
        let pick_min = |a: T, b: T| if a < b { a } else { b };
        let pick_max = |a: T, b: T| if a > b { a } else { b };
        Self {
            min: Point3::new(
                pick_min(bounds.min.x, point.x),
                pick_min(bounds.min.y, point.y),
                pick_min(bounds.min.z, point.z),
            ),
            max: Point3::new(
                pick_max(bounds.max.x, point.x),
                pick_max(bounds.max.y, point.y),
                pick_max(bounds.max.z, point.z),
            ),
        }
    }
}

impl AABB<f64> {
    /// Calculates the bounding box of the given positions. Returns `None` if `positions` is empty
    /// ```
    /// # use ptiles_core::math::AABB;
    /// # use nalgebra::Vector3;
    /// let positions = [Vector3::new(1.0, 5.0, 0.0), Vector3::new(-1.0, 2.0, 3.0)];
    /// let bounds = AABB::from_positions(positions.iter()).unwrap();
    /// assert_eq!(*bounds.min(), nalgebra::Point3::new(-1.0, 2.0, 0.0));
    /// assert_eq!(*bounds.max(), nalgebra::Point3::new(1.0, 5.0, 3.0));
    /// ```
    pub fn from_positions<'a, I: IntoIterator<Item = &'a Vector3<f64>>>(
        positions: I,
    ) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = Point3::from(*iter.next()?);
        let bounds = iter.fold(Self::from_min_max_unchecked(first, first), |bounds, pos| {
            Self::extend_with_point(&bounds, &Point3::from(*pos))
        });
        Some(bounds)
    }

    /// Returns the center of this AABB
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}
