//! Collision Detection
//!
//! Static obstacle tests for player movement. Buildings are axis-aligned
//! footprints, trees are circles; a player is a square box around its position.

use crate::config::WorldConfig;
use crate::core::vec2::Vec2;

/// Check if two circles overlap.
#[inline]
pub fn circles_overlap(pos_a: Vec2, radius_a: f32, pos_b: Vec2, radius_b: f32) -> bool {
    pos_a.within(pos_b, radius_a + radius_b)
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    /// Top-left corner
    pub min: Vec2,
    /// Bottom-right corner
    pub max: Vec2,
}

impl Rect {
    /// Rectangle from its corner and size.
    pub fn from_origin_size(origin: Vec2, width: f32, height: f32) -> Self {
        Self {
            min: origin,
            max: Vec2::new(origin.x + width, origin.y + height),
        }
    }

    /// Square box centered on a point.
    pub fn around(center: Vec2, half_extent: f32) -> Self {
        let h = Vec2::new(half_extent, half_extent);
        Self { min: center - h, max: center + h }
    }

    /// Interiors overlap. Touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Circle overlaps the rectangle interior.
    pub fn intersects_circle(&self, center: Vec2, radius: f32) -> bool {
        let nearest = center.clamp(self.min, self.max);
        center.distance_squared(nearest) < radius * radius
    }
}

/// Something a player cannot walk through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Obstacle {
    /// Building footprint.
    Building(Rect),
    /// Tree trunk.
    Tree {
        /// Trunk center
        center: Vec2,
        /// Collision radius
        radius: f32,
    },
}

impl Obstacle {
    /// Whether a player box overlaps this obstacle.
    pub fn blocks(&self, player_box: &Rect) -> bool {
        match *self {
            Obstacle::Building(rect) => rect.intersects(player_box),
            Obstacle::Tree { center, radius } => player_box.intersects_circle(center, radius),
        }
    }
}

/// All static obstacles on the map.
#[derive(Clone, Debug, Default)]
pub struct ObstacleSet {
    obstacles: Vec<Obstacle>,
}

impl ObstacleSet {
    /// Create from an explicit list.
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }

    /// Property footprints and tree trunks from the world config.
    pub fn from_config(config: &WorldConfig) -> Self {
        let buildings = config
            .market
            .properties
            .iter()
            .map(|p| Obstacle::Building(Rect::from_origin_size(p.position, p.width, p.height)));
        let trees = config.growth.trees.iter().map(|&center| Obstacle::Tree {
            center,
            radius: config.growth.tree_radius,
        });
        Self {
            obstacles: buildings.chain(trees).collect(),
        }
    }

    /// Whether a player box centered at `position` hits anything.
    pub fn blocks(&self, position: Vec2, half_extent: f32) -> bool {
        let player_box = Rect::around(position, half_extent);
        self.obstacles.iter().any(|o| o.blocks(&player_box))
    }

    /// Number of obstacles.
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    /// No obstacles at all.
    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}
