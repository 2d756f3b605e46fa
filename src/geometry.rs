/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements axis aligned bounding boxes and the theta admissibility condition.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::RowRef;

/// An axis aligned box in d dimensions, stored as per-dimension minimum and
/// maximum coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl BoundingBox {
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Self {
        assert_eq!(min.len(), max.len(), "bounding box min/max dimension mismatch");
        Self { min, max }
    }

    /// Builds a box from a flat extents vector arranged as
    /// `[min_0, ..., min_{d-1}, max_0, ..., max_{d-1}]`.
    pub fn from_extents(extents: &[f64]) -> Self {
        assert!(extents.len() % 2 == 0, "extents vector must have even length");
        let dimensions = extents.len() / 2;
        Self {
            min: extents[..dimensions].to_vec(),
            max: extents[dimensions..].to_vec(),
        }
    }

    #[inline(always)]
    pub fn dimensions(&self) -> usize {
        self.min.len()
    }

    pub fn center(&self) -> Vec<f64> {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(lo, hi)| 0.5 * (lo + hi))
            .collect()
    }

    /// Per-dimension half widths.
    pub fn half_widths(&self) -> Vec<f64> {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(lo, hi)| 0.5 * (hi - lo))
            .collect()
    }

    /// Squared half-diagonal, i.e. the squared circumscribing radius.
    pub fn radius_squared(&self) -> f64 {
        self.half_widths().iter().map(|w| w * w).sum()
    }

    /// Whether the point lies inside the box (boundaries inclusive).
    pub fn contains(&self, point: RowRef<f64>) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(d, &x)| x >= self.min[d] && x <= self.max[d])
    }

    /// Squared distance between the centers of two boxes.
    fn center_distance_squared(&self, other: &BoundingBox) -> f64 {
        (0..self.dimensions())
            .map(|d| {
                let diff = 0.5 * ((other.min[d] + other.max[d]) - (self.min[d] + self.max[d]));
                diff * diff
            })
            .sum()
    }
}

/// The admissibility test used to classify bucket pairs as near (strong) or
/// far (weak).
///
/// A pair is far when the larger of the two circumscribing radii satisfies
/// `r_large <= theta * (d - r_small)`, with `d` the distance between box
/// centers. Smaller values of `theta` classify more pairs as near, trading
/// work for accuracy; `theta` must lie in `(0, 1)`.
pub struct ThetaCondition {
    center: Vec<f64>,
    radius: f64,
    radius_squared: f64,
    theta_squared: f64,
}

impl ThetaCondition {
    pub fn new(bounds: &BoundingBox, theta: f64) -> Self {
        let radius_squared = bounds.radius_squared();
        Self {
            center: bounds.center(),
            radius: radius_squared.sqrt(),
            radius_squared,
            theta_squared: theta * theta,
        }
    }

    /// Returns true when `other` is near (strong) with respect to the box this
    /// condition was built from.
    pub fn check(&self, other: &BoundingBox) -> bool {
        let other_radius_squared = other.radius_squared();
        let other_center = other.center();

        let distance_squared: f64 = self
            .center
            .iter()
            .zip(other_center.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        let distance = distance_squared.sqrt();

        // The test always subtracts the smaller radius from the center
        // distance and compares against the larger.
        if other_radius_squared < self.radius_squared {
            let gap = distance - other_radius_squared.sqrt();
            self.radius_squared > self.theta_squared * gap * gap
        } else {
            let gap = distance - self.radius;
            other_radius_squared > self.theta_squared * gap * gap
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box_at(origin: f64) -> BoundingBox {
        BoundingBox::new(vec![origin, 0.0], vec![origin + 1.0, 1.0])
    }

    #[test]
    fn extents_round_trip() {
        let bounds = BoundingBox::from_extents(&[0.0, -1.0, 2.0, 3.0]);
        assert_eq!(bounds.min, vec![0.0, -1.0]);
        assert_eq!(bounds.max, vec![2.0, 3.0]);
        assert_eq!(bounds.center(), vec![1.0, 1.0]);
        assert_eq!(bounds.half_widths(), vec![1.0, 2.0]);
    }

    #[test]
    fn contains_is_boundary_inclusive() {
        let bounds = unit_box_at(0.0);
        let points = faer::mat![[0.0, 0.0], [1.0, 1.0], [0.5, 0.5], [1.5, 0.5]];
        assert!(bounds.contains(points.row(0)));
        assert!(bounds.contains(points.row(1)));
        assert!(bounds.contains(points.row(2)));
        assert!(!bounds.contains(points.row(3)));
    }

    #[test]
    fn identical_boxes_are_near() {
        let bounds = unit_box_at(0.0);
        let condition = ThetaCondition::new(&bounds, 0.5);
        assert!(condition.check(&bounds));
    }

    #[test]
    fn adjacent_boxes_are_near() {
        let bounds = unit_box_at(0.0);
        let condition = ThetaCondition::new(&bounds, 0.5);
        assert!(condition.check(&unit_box_at(1.0)));
    }

    #[test]
    fn distant_boxes_are_far() {
        let bounds = unit_box_at(0.0);
        let condition = ThetaCondition::new(&bounds, 0.5);
        assert!(!condition.check(&unit_box_at(10.0)));
    }

    #[test]
    fn smaller_theta_classifies_more_pairs_as_near() {
        let bounds = unit_box_at(0.0);
        let other = unit_box_at(3.0);

        // Far at the default separation ratio, near when the ratio is tightened.
        assert!(!ThetaCondition::new(&bounds, 0.5).check(&other));
        assert!(ThetaCondition::new(&bounds, 0.2).check(&other));
    }
}
