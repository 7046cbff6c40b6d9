//! Zone Index
//!
//! Maps a world coordinate to the zone it lies in. Regions are tested in
//! configured priority order (bands and corridors before the rectangles they
//! cross) and anything unclaimed falls back to the default zone, so every
//! in-bounds point resolves to exactly one zone.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::config::{MapConfig, ZoneConfig};
use crate::core::vec2::Vec2;

/// Zone identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ZoneId(pub u8);

impl ZoneId {
    /// Fallback zone.
    pub const WILDERNESS: Self = Self(0);
    /// Town center.
    pub const DOWNTOWN: Self = Self(1);
    /// Residential west side.
    pub const SUBURBS: Self = Self(2);
    /// North-east woods.
    pub const FOREST: Self = Self(3);
    /// Warehouses and yards.
    pub const INDUSTRIAL: Self = Self(4);
    /// Planks along the beach.
    pub const BOARDWALK: Self = Self(5);
    /// Sand between boardwalk and water.
    pub const BEACH: Self = Self(6);
    /// Open water past the shoreline.
    pub const HARBOR: Self = Self(7);
    /// Fast road across the north.
    pub const HIGHWAY: Self = Self(8);
    /// Plaza in the middle of downtown.
    pub const TOWN_SQUARE: Self = Self(9);
}

/// Ground look of a zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneTheme {
    /// Open grass.
    Grass,
    /// Paved city blocks.
    Urban,
    /// Lawns and driveways.
    Residential,
    /// Dense trees.
    Woodland,
    /// Concrete lots.
    Industrial,
    /// Wooden planks.
    Boardwalk,
    /// Beach sand.
    Sand,
    /// Sea.
    Water,
    /// Highway tarmac.
    Asphalt,
    /// Cobbled square.
    Plaza,
}

/// Static zone description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Identifier.
    pub id: ZoneId,
    /// Display name.
    pub name: String,
    /// Movement speed factor while inside.
    pub speed_multiplier: f32,
    /// Whether roads are drawn.
    pub has_roads: bool,
    /// Ground look.
    pub theme: ZoneTheme,
}

/// Region outline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    /// Axis-aligned rectangle, edges inclusive.
    Rect { min: Vec2, max: Vec2 },
    /// Full-width horizontal strip, edges inclusive.
    Band { top: f32, bottom: f32 },
    /// Road segment with a half width.
    Corridor { start: Vec2, end: Vec2, half_width: f32 },
    /// Round plaza.
    Circle { center: Vec2, radius: f32 },
}

impl Shape {
    /// Whether the point lies inside the shape.
    pub fn contains(&self, p: Vec2) -> bool {
        match *self {
            Shape::Rect { min, max } => {
                p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
            }
            Shape::Band { top, bottom } => p.y >= top && p.y <= bottom,
            Shape::Corridor { start, end, half_width } => {
                p.distance_squared_to_segment(start, end) <= half_width * half_width
            }
            Shape::Circle { center, radius } => p.within(center, radius),
        }
    }
}

/// A shape claimed by a zone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneRegion {
    /// Owning zone.
    pub zone: ZoneId,
    /// Outline.
    pub shape: Shape,
}

/// Point-to-zone lookup. Pure and cheap to share.
#[derive(Clone, Debug)]
pub struct ZoneIndex {
    zones: BTreeMap<ZoneId, Zone>,
    regions: Vec<ZoneRegion>,
    default_zone: Zone,
    map_min: Vec2,
    map_max: Vec2,
}

impl ZoneIndex {
    /// Build from the zone table and map bounds.
    pub fn new(config: &ZoneConfig, map: &MapConfig) -> Self {
        let zones: BTreeMap<ZoneId, Zone> = config
            .zones
            .iter()
            .map(|z| (z.id, z.clone()))
            .collect();

        let default_zone = zones.get(&config.default_zone).cloned().unwrap_or(Zone {
            id: config.default_zone,
            name: "Wilderness".to_string(),
            speed_multiplier: 1.0,
            has_roads: false,
            theme: ZoneTheme::Grass,
        });

        // Regions whose zone is missing would resolve to nothing
        let regions = config
            .regions
            .iter()
            .filter(|r| zones.contains_key(&r.zone))
            .cloned()
            .collect();

        Self {
            zones,
            regions,
            default_zone,
            map_min: map.min(),
            map_max: map.max(),
        }
    }

    /// Zone id at a world coordinate. Out-of-bounds input is clamped first.
    pub fn resolve(&self, x: f32, y: f32) -> ZoneId {
        self.zone_at(Vec2::new(x, y)).id
    }

    /// Zone at a world coordinate.
    pub fn zone_at(&self, p: Vec2) -> &Zone {
        let p = self.clamp(p);
        self.regions
            .iter()
            .find(|r| r.shape.contains(p))
            .and_then(|r| self.zones.get(&r.zone))
            .unwrap_or(&self.default_zone)
    }

    /// Speed factor at a world coordinate.
    pub fn speed_multiplier(&self, p: Vec2) -> f32 {
        self.zone_at(p).speed_multiplier
    }

    /// Zone by id.
    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        if id == self.default_zone.id {
            return Some(&self.default_zone);
        }
        self.zones.get(&id)
    }

    /// All configured zones in id order.
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    fn clamp(&self, p: Vec2) -> Vec2 {
        // NaN would fail every containment test
        let x = if p.x.is_nan() { self.map_min.x } else { p.x };
        let y = if p.y.is_nan() { self.map_min.y } else { p.y };
        Vec2::new(x, y).clamp(self.map_min, self.map_max)
    }
}
