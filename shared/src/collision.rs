//! Collision detection between moving shots and static world geometry.
//!
//! The broad phase ([`ObstacleGrid`]) narrows the world down to obstacles
//! near a region; the narrow phase ([`find_nearest_collision`]) runs a
//! separating-axis test between oriented rectangles over that candidate set.

use crate::math::{Aabb, Vector2};
use std::collections::HashMap;

/// Oriented rectangle. `position` is the centre; `rotation` is in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    pub position: Vector2,
    pub size: Vector2,
    pub rotation: f32,
}

impl Obb {
    pub fn new(position: Vector2, size: Vector2, rotation: f32) -> Self {
        Self {
            position,
            size,
            rotation,
        }
    }

    pub fn corners(&self) -> [Vector2; 4] {
        let half = self.size * 0.5;
        [
            Vector2::new(-half.x, -half.y),
            Vector2::new(half.x, -half.y),
            Vector2::new(half.x, half.y),
            Vector2::new(-half.x, half.y),
        ]
        .map(|corner| self.position + corner.rotate(self.rotation))
    }

    /// Edge normals; a rectangle only has two distinct ones.
    fn axes(&self) -> [Vector2; 2] {
        [
            Vector2::new(1.0, 0.0).rotate(self.rotation),
            Vector2::new(0.0, 1.0).rotate(self.rotation),
        ]
    }

    fn project(&self, axis: Vector2) -> (f32, f32) {
        self.corners()
            .iter()
            .map(|corner| corner.dot(axis))
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p), hi.max(p))
            })
    }

    pub fn bounds(&self) -> Aabb {
        let corners = self.corners();
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(min, max), c| {
                (min.min(*c), max.max(*c))
            });
        Aabb::new(min, max)
    }

    /// Minimum translation that separates `self` from `other`, if they overlap.
    ///
    /// Returns the overlap depth and a unit direction pointing away from `other`.
    /// Rectangles that only touch do not overlap.
    pub fn penetration(&self, other: &Obb) -> Option<(f32, Vector2)> {
        let mut best: Option<(f32, Vector2)> = None;

        for axis in self.axes().into_iter().chain(other.axes()) {
            let (a_min, a_max) = self.project(axis);
            let (b_min, b_max) = other.project(axis);
            let overlap = a_max.min(b_max) - a_min.max(b_min);
            if overlap <= 0.0 {
                return None;
            }
            if best.map_or(true, |(depth, _)| overlap < depth) {
                best = Some((overlap, axis));
            }
        }

        best.map(|(depth, axis)| {
            let away = self.position - other.position;
            if away.dot(axis) < 0.0 {
                (depth, -axis)
            } else {
                (depth, axis)
            }
        })
    }
}

/// A static piece of world geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub shape: Obb,
}

impl Obstacle {
    pub fn new(position: Vector2, size: Vector2, rotation: f32) -> Self {
        Self {
            shape: Obb::new(position, size, rotation),
        }
    }
}

/// Result of a narrow-phase hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub overlap: f32,
    /// Unit vector pointing out of the obstacle.
    pub pushback: Vector2,
}

/// Finds the candidate `shape` penetrates least deeply.
///
/// Ties keep the earliest candidate. Returns `None` when nothing truly
/// intersects.
pub fn find_nearest_collision<'a, I>(shape: &Obb, candidates: I) -> Option<Collision>
where
    I: IntoIterator<Item = &'a Obstacle>,
{
    let mut nearest: Option<Collision> = None;

    for obstacle in candidates {
        if let Some((overlap, pushback)) = shape.penetration(&obstacle.shape) {
            if nearest.map_or(true, |hit| overlap < hit.overlap) {
                nearest = Some(Collision { overlap, pushback });
            }
        }
    }

    nearest
}

/// Uniform grid over the world's obstacles.
#[derive(Debug, Clone)]
pub struct ObstacleGrid {
    cell_size: f32,
    obstacles: Vec<Obstacle>,
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl ObstacleGrid {
    pub const DEFAULT_CELL_SIZE: f32 = 50.0;

    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            obstacles: Vec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn from_obstacles(cell_size: f32, obstacles: impl IntoIterator<Item = Obstacle>) -> Self {
        let mut grid = Self::new(cell_size);
        for obstacle in obstacles {
            grid.insert(obstacle);
        }
        grid
    }

    fn cell_range(&self, region: &Aabb) -> ((i32, i32), (i32, i32)) {
        let to_cell = |v: f32| (v / self.cell_size).floor() as i32;
        (
            (to_cell(region.min.x), to_cell(region.min.y)),
            (to_cell(region.max.x), to_cell(region.max.y)),
        )
    }

    pub fn insert(&mut self, obstacle: Obstacle) {
        let index = self.obstacles.len();
        let ((x0, y0), (x1, y1)) = self.cell_range(&obstacle.shape.bounds());
        for x in x0..=x1 {
            for y in y0..=y1 {
                self.cells.entry((x, y)).or_default().push(index);
            }
        }
        self.obstacles.push(obstacle);
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    /// Obstacles sharing a cell with `region` whose bounds overlap it, in insertion order.
    pub fn potential_intersects(&self, region: &Aabb) -> Vec<&Obstacle> {
        let ((x0, y0), (x1, y1)) = self.cell_range(region);
        let mut indices: Vec<usize> = Vec::new();
        for x in x0..=x1 {
            for y in y0..=y1 {
                if let Some(cell) = self.cells.get(&(x, y)) {
                    indices.extend_from_slice(cell);
                }
            }
        }
        indices.sort_unstable();
        indices.dedup();
        indices
            .into_iter()
            .map(|i| &self.obstacles[i])
            .filter(|obstacle| obstacle.shape.bounds().intersects(region))
            .collect()
    }
}

impl Default for ObstacleGrid {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CELL_SIZE)
    }
}
