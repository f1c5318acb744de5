//! Point-of-interest obstacles
//!
//! Circles agents steer around. The field is built once at scene load with the
//! same counting sort as the agent grid and then shared read-only between
//! simulators through an `Arc`.

use serde::{Deserialize, Serialize};

use crate::swarm::error::{GridError, SimulationError};
use crate::swarm::grid::{GridLayout, Positioned, SpatialGrid};
use crate::util::vec2::Vec2;

/// Default POI grid cell size (world units)
pub const DEFAULT_POI_CELL_SIZE: f32 = 4.0;

/// A circular obstacle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub center: Vec2,
    pub radius_sq: f32,
}

impl Poi {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self {
            center,
            radius_sq: radius * radius,
        }
    }

    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.distance_sq_to(self.center) < self.radius_sq
    }
}

impl Positioned for Poi {
    #[inline]
    fn position(&self) -> Vec2 {
        self.center
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoiError {
    #[error("invalid POI grid: {0}")]
    Grid(#[from] GridError),
    #[error("failed to bucket POIs: {0}")]
    Build(#[from] SimulationError),
    #[error("POI radius must be finite, got squared radius {0}")]
    InvalidRadius(f32),
}

/// POIs bucketed into a uniform grid
#[derive(Debug)]
pub struct PoiField {
    /// `None` when there are no POIs at all
    grid: Option<SpatialGrid>,
    /// POIs in cell order
    sorted: Vec<Poi>,
}

impl PoiField {
    /// A field with no obstacles
    pub fn empty() -> Self {
        Self {
            grid: None,
            sorted: Vec::new(),
        }
    }

    /// Bucket `pois` into a grid over `[-x_bound, x_bound] × [-y_bound, y_bound]`.
    ///
    /// The cell size is raised to the largest radius so every circle that
    /// contains a point has its centre within the point's 3×3 block of cells.
    pub fn build(pois: Vec<Poi>, x_bound: f32, y_bound: f32, cell_size: f32) -> Result<Self, PoiError> {
        if pois.is_empty() {
            return Ok(Self::empty());
        }
        if let Some(bad) = pois.iter().find(|p| !(p.radius_sq.is_finite() && p.radius_sq >= 0.0)) {
            return Err(PoiError::InvalidRadius(bad.radius_sq));
        }

        let max_radius = pois.iter().map(|p| p.radius_sq.sqrt()).fold(0.0f32, f32::max);
        let layout = GridLayout::new(x_bound, y_bound, cell_size.max(max_radius))?;
        let mut grid = SpatialGrid::new(layout);
        let mut sorted = Vec::with_capacity(pois.len());
        grid.rebuild(&pois, &mut sorted, pois.len())?;

        tracing::debug!(
            pois = sorted.len(),
            cell_size = layout.cell_size(),
            "POI field built"
        );

        Ok(Self {
            grid: Some(grid),
            sorted,
        })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// POIs whose cells neighbour `point`
    fn nearby(&self, point: Vec2) -> impl Iterator<Item = &Poi> + '_ {
        self.grid
            .iter()
            .flat_map(move |grid| grid.block_ranges(point, 1))
            .flat_map(move |range| self.sorted[range].iter())
    }

    /// Whether `point` lies inside any POI
    pub fn contains(&self, point: Vec2) -> bool {
        self.nearby(point).any(|poi| poi.contains(point))
    }

    /// Summed outward push from every POI containing `point`.
    ///
    /// Each contribution points away from the circle's centre with strength
    /// falling from 1 at the centre to 0 at the rim.
    pub fn push_from(&self, point: Vec2) -> Vec2 {
        let mut push = Vec2::ZERO;
        for poi in self.nearby(point) {
            let diff = point - poi.center;
            let dist_sq = diff.length_sq();
            if dist_sq >= poi.radius_sq || dist_sq <= 0.0 {
                continue;
            }
            let depth = 1.0 - (dist_sq / poi.radius_sq).sqrt();
            push += diff.normalize() * depth;
        }
        push
    }
}

impl Default for PoiField {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_field() {
        let field = PoiField::empty();
        assert!(field.is_empty());
        assert_eq!(field.push_from(Vec2::new(1.0, 1.0)), Vec2::ZERO);
        assert!(!field.contains(Vec2::ZERO));
    }

    #[test]
    fn test_push_points_outward() {
        let field = PoiField::build(vec![Poi::new(Vec2::new(10.0, 0.0), 2.0)], 32.0, 32.0, 1.0).unwrap();

        let push = field.push_from(Vec2::new(11.0, 0.0));
        assert!(push.x > 0.4 && push.x < 0.6, "push was {:?}", push);
        assert!(push.y.abs() < 1e-5);

        // Outside the radius nothing happens
        assert_eq!(field.push_from(Vec2::new(13.0, 0.0)), Vec2::ZERO);
    }

    #[test]
    fn test_large_radius_found_from_far_cell() {
        // Radius far larger than the requested cell size
        let field = PoiField::build(vec![Poi::new(Vec2::ZERO, 9.0)], 32.0, 32.0, 1.0).unwrap();

        assert!(field.contains(Vec2::new(8.5, 0.0)));
        assert!(field.push_from(Vec2::new(0.0, -8.0)).y < 0.0);
        assert!(!field.contains(Vec2::new(9.5, 0.0)));
    }

    #[test]
    fn test_overlapping_pois_sum() {
        let pois = vec![Poi::new(Vec2::new(-1.0, 0.0), 2.0), Poi::new(Vec2::new(1.0, 0.0), 2.0)];
        let field = PoiField::build(pois, 16.0, 16.0, 4.0).unwrap();

        // Equidistant between both centres: horizontal pushes cancel
        let push = field.push_from(Vec2::new(0.0, 0.5));
        assert!(push.x.abs() < 1e-5);
        assert!(push.y > 0.0);
        assert_eq!(field.len(), 2);
    }

    #[test]
    fn test_invalid_radius_rejected() {
        let bad = Poi {
            center: Vec2::ZERO,
            radius_sq: f32::NAN,
        };
        assert!(matches!(
            PoiField::build(vec![bad], 8.0, 8.0, 1.0),
            Err(PoiError::InvalidRadius(_))
        ));
    }
}
