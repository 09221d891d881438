//! Axis-aligned world-space rectangles

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in world meters (inclusive on both ends)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Square bounds enclosing a disk
    pub fn from_circle(center: Vec2, radius: f32) -> Self {
        let r = Vec2::splat(radius.abs());
        Self::new(center - r, center + r)
    }

    /// Smallest bounds containing every point (None for an empty slice)
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self { min, max })
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// True when `other` lies entirely inside `self`
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        if !self.intersects(other) {
            return None;
        }
        Some(Bounds {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expand(&self, margin: f32) -> Bounds {
        Bounds::new(self.min - Vec2::splat(margin), self.max + Vec2::splat(margin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let b = Bounds::new(Vec2::new(4.0, 1.0), Vec2::new(2.0, 3.0));
        assert_eq!(b.min, Vec2::new(2.0, 1.0));
        assert_eq!(b.max, Vec2::new(4.0, 3.0));
        assert_eq!(b.area(), 4.0);
    }

    #[test]
    fn test_intersection_and_union() {
        let a = Bounds::new(Vec2::ZERO, Vec2::new(2.0, 2.0));
        let b = Bounds::new(Vec2::new(1.0, 1.0), Vec2::new(3.0, 3.0));
        let c = Bounds::new(Vec2::new(5.0, 5.0), Vec2::new(6.0, 6.0));

        let i = a.intersection(&b).unwrap();
        assert_eq!(i, Bounds::new(Vec2::ONE, Vec2::new(2.0, 2.0)));
        assert!(a.intersection(&c).is_none());
        assert_eq!(a.union(&c), Bounds::new(Vec2::ZERO, Vec2::new(6.0, 6.0)));
    }

    #[test]
    fn test_from_points() {
        let pts = [Vec2::new(1.0, 5.0), Vec2::new(-2.0, 0.5), Vec2::new(3.0, 2.0)];
        let b = Bounds::from_points(&pts).unwrap();
        assert_eq!(b.min, Vec2::new(-2.0, 0.5));
        assert_eq!(b.max, Vec2::new(3.0, 5.0));
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b = Bounds::from_circle(Vec2::new(1.0, 1.0), 1.0);
        assert!(b.contains(Vec2::ZERO));
        assert!(b.contains(Vec2::new(2.0, 2.0)));
        assert!(!b.contains(Vec2::new(2.01, 1.0)));
    }
}
