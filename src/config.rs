//! World Configuration
//!
//! Every static table the world consults (zones, growth stages, job locations,
//! property templates, item prices) lives in one immutable [`WorldConfig`]
//! injected at construction. Each section has a `Default` matching the shipped
//! Harbortown map, and the whole thing can be loaded from JSON.

use std::collections::BTreeSet;
use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::position::TrustPolicy;
use crate::game::state::{EquipSlot, GrowthStage, ItemKind, PropertyCategory};
use crate::game::zone::{Shape, Zone, ZoneId, ZoneRegion, ZoneTheme};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Structurally valid but semantically wrong.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

// =============================================================================
// MAP & ZONES
// =============================================================================

/// Map extents. Origin is the top-left corner, +Y runs south toward the sea.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map width in world units.
    pub width: f32,
    /// Map height in world units.
    pub height: f32,
    /// Players may not move south of this Y (the shoreline).
    pub water_line_y: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 4000.0,
            height: 3000.0,
            water_line_y: 2700.0,
        }
    }
}

impl MapConfig {
    /// Top-left corner.
    pub fn min(&self) -> Vec2 {
        Vec2::ZERO
    }

    /// Bottom-right corner.
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Clamp a point into map bounds.
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        p.clamp(self.min(), self.max())
    }
}

/// Zone table and resolution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// All zones, including the default.
    pub zones: Vec<Zone>,
    /// Shapes checked in order; first hit wins.
    pub regions: Vec<ZoneRegion>,
    /// Zone for any point no region claims.
    pub default_zone: ZoneId,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        let zone = |id, name: &str, speed_multiplier, has_roads, theme| Zone {
            id,
            name: name.to_string(),
            speed_multiplier,
            has_roads,
            theme,
        };

        let zones = vec![
            zone(ZoneId::WILDERNESS, "Wilderness", 0.9, false, ZoneTheme::Grass),
            zone(ZoneId::DOWNTOWN, "Downtown", 1.0, true, ZoneTheme::Urban),
            zone(ZoneId::SUBURBS, "Suburbs", 1.0, true, ZoneTheme::Residential),
            zone(ZoneId::FOREST, "Pine Forest", 0.75, false, ZoneTheme::Woodland),
            zone(ZoneId::INDUSTRIAL, "Industrial Park", 0.95, true, ZoneTheme::Industrial),
            zone(ZoneId::BOARDWALK, "Boardwalk", 1.1, false, ZoneTheme::Boardwalk),
            zone(ZoneId::BEACH, "Beach", 0.6, false, ZoneTheme::Sand),
            zone(ZoneId::HARBOR, "Harbor", 0.5, false, ZoneTheme::Water),
            zone(ZoneId::HIGHWAY, "Coast Highway", 1.2, true, ZoneTheme::Asphalt),
            zone(ZoneId::TOWN_SQUARE, "Town Square", 1.0, false, ZoneTheme::Plaza),
        ];

        let region = |zone, shape| ZoneRegion { zone, shape };
        let rect = |x0, y0, x1, y1| Shape::Rect {
            min: Vec2::new(x0, y0),
            max: Vec2::new(x1, y1),
        };

        // Bands and corridors come before the rectangles they cut through
        let regions = vec![
            region(ZoneId::HARBOR, Shape::Band { top: 2700.0, bottom: 3000.0 }),
            region(ZoneId::BEACH, Shape::Band { top: 2550.0, bottom: 2700.0 }),
            region(ZoneId::BOARDWALK, rect(600.0, 2480.0, 3400.0, 2550.0)),
            region(
                ZoneId::HIGHWAY,
                Shape::Corridor {
                    start: Vec2::new(0.0, 700.0),
                    end: Vec2::new(4000.0, 700.0),
                    half_width: 40.0,
                },
            ),
            region(
                ZoneId::TOWN_SQUARE,
                Shape::Circle {
                    center: Vec2::new(2000.0, 1300.0),
                    radius: 120.0,
                },
            ),
            region(ZoneId::DOWNTOWN, rect(1200.0, 800.0, 2800.0, 1800.0)),
            region(ZoneId::SUBURBS, rect(0.0, 800.0, 1200.0, 2400.0)),
            region(ZoneId::FOREST, rect(2800.0, 0.0, 4000.0, 1600.0)),
            region(ZoneId::INDUSTRIAL, rect(2800.0, 1600.0, 4000.0, 2480.0)),
        ];

        Self {
            zones,
            regions,
            default_zone: ZoneId::WILDERNESS,
        }
    }
}

// =============================================================================
// MOVEMENT
// =============================================================================

/// Client movement tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Units per tick at full hunger in a 1.0 zone.
    pub base_speed: f32,
    /// Floor applied after all multipliers.
    pub min_speed: f32,
    /// Hunger at and above which no slowdown applies.
    pub hunger_slow_threshold: u8,
    /// Multiplier at hunger 0.
    pub starving_multiplier: f32,
    /// Half the side of the player's square collision box.
    pub player_half_extent: f32,
    /// Minimum gap between position reports (ms).
    pub report_interval_ms: u64,
    /// Fraction of the residual closed per frame when smoothing remote players.
    pub smoothing_factor: f32,
    /// Residual below which smoothing snaps to the target.
    pub snap_epsilon: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            base_speed: 3.0,
            min_speed: 1.0,
            hunger_slow_threshold: 30,
            starving_multiplier: 0.5,
            player_half_extent: 12.0,
            report_interval_ms: 100,
            smoothing_factor: 0.2,
            snap_epsilon: 0.5,
        }
    }
}

// =============================================================================
// TREES
// =============================================================================

/// Stats for one growth stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDef {
    /// Which stage.
    pub stage: GrowthStage,
    /// Seconds since planting at which the stage is reached.
    pub min_age_secs: i64,
    /// Wood granted by a completed harvest.
    pub wood_yield: u32,
    /// Time a harvest takes at this stage (ms).
    pub harvest_ms: u64,
}

/// Tree growth and harvest tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Stages in growth order, one per [`GrowthStage`].
    pub stages: Vec<StageDef>,
    /// Tree collision circle radius.
    pub tree_radius: f32,
    /// Client harvest progress poll period (ms).
    pub poll_interval_ms: u64,
    /// Slack allowed when checking a completion arrived after the harvest duration.
    pub harvest_tolerance_ms: u64,
    /// Inventory key credited by harvests.
    pub wood_item: String,
    /// Plant the initial trees already mature.
    pub start_mature: bool,
    /// Where trees stand.
    pub trees: Vec<Vec2>,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        let stage = |stage, min_age_secs, wood_yield, harvest_ms| StageDef {
            stage,
            min_age_secs,
            wood_yield,
            harvest_ms,
        };

        let mut trees = Vec::new();
        // Forest grid, staggered every other row
        for row in 0..4 {
            for col in 0..5 {
                let stagger = if row % 2 == 0 { 0.0 } else { 90.0 };
                trees.push(Vec2::new(2950.0 + col as f32 * 200.0 + stagger, 200.0 + row as f32 * 320.0));
            }
        }
        trees.extend([
            Vec2::new(300.0, 300.0),
            Vec2::new(520.0, 420.0),
            Vec2::new(900.0, 1100.0),
            Vec2::new(450.0, 1900.0),
        ]);

        Self {
            stages: vec![
                stage(GrowthStage::Seedling, 0, 0, 0),
                stage(GrowthStage::Sapling, 120, 1, 1500),
                stage(GrowthStage::Young, 300, 3, 2500),
                stage(GrowthStage::Mature, 600, 6, 4000),
            ],
            tree_radius: 14.0,
            poll_interval_ms: 50,
            harvest_tolerance_ms: 250,
            wood_item: "wood".to_string(),
            start_mature: true,
            trees,
        }
    }
}

impl GrowthConfig {
    /// Stats for a stage.
    pub fn stage(&self, stage: GrowthStage) -> Option<&StageDef> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Latest stage reached by a tree of the given age.
    pub fn stage_for_age(&self, age_secs: i64) -> GrowthStage {
        self.stages
            .iter()
            .filter(|s| age_secs >= s.min_age_secs)
            .map(|s| s.stage)
            .max()
            .unwrap_or(GrowthStage::Seedling)
    }

    /// Age of the oldest stage, used to plant trees already grown.
    pub fn mature_age_secs(&self) -> i64 {
        self.stages.iter().map(|s| s.min_age_secs).max().unwrap_or(0)
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// A named place deliveries start or end at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLocation {
    /// Shown on the job board.
    pub name: String,
    /// World position.
    pub position: Vec2,
}

/// Job board tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Refill triggers when fewer than this many jobs are available.
    pub min_available: usize,
    /// Refill tops the board up to this many available jobs.
    pub refill_target: usize,
    /// Minimum gap between refills from the same trigger source (ms).
    pub refill_cooldown_ms: i64,
    /// Accepted or picked-up jobs older than this are reclaimed (seconds).
    pub active_timeout_secs: i64,
    /// Completed jobs are removed after this long (seconds).
    pub retention_secs: i64,
    /// Flat part of every reward.
    pub base_reward: u64,
    /// Reward per world unit between pickup and dropoff.
    pub reward_per_unit: f32,
    /// Extra reward, in percent, when pickup and dropoff zones differ.
    pub cross_zone_bonus_percent: u64,
    /// Pickup and dropoff candidates.
    pub locations: Vec<JobLocation>,
}

impl Default for JobConfig {
    fn default() -> Self {
        let loc = |name: &str, x, y| JobLocation {
            name: name.to_string(),
            position: Vec2::new(x, y),
        };

        Self {
            min_available: 3,
            refill_target: 5,
            refill_cooldown_ms: 10_000,
            active_timeout_secs: 600,
            retention_secs: 300,
            base_reward: 25,
            reward_per_unit: 0.02,
            cross_zone_bonus_percent: 25,
            locations: vec![
                loc("Harbor Docks", 1800.0, 2520.0),
                loc("Corner Diner", 1700.0, 1100.0),
                loc("Maple Street", 500.0, 1300.0),
                loc("Sawmill Gate", 3100.0, 1500.0),
                loc("Depot 7", 3400.0, 2000.0),
                loc("Lifeguard Tower", 2600.0, 2600.0),
                loc("Ranger Cabin", 3600.0, 400.0),
                loc("Old Barn", 600.0, 400.0),
            ],
        }
    }
}

// =============================================================================
// PROPERTIES & MARKET
// =============================================================================

/// Static description of a property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyTemplate {
    /// Property id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Broad category.
    pub category: PropertyCategory,
    /// Finer kind within the category ("apartment", "diner").
    pub subtype: String,
    /// Purchase price.
    pub price: u64,
    /// Income per collection cycle.
    pub income: u64,
    /// Maximum simultaneous owners. Zero means public service.
    pub max_owners: u32,
    /// Footprint top-left corner.
    pub position: Vec2,
    /// Footprint width.
    pub width: f32,
    /// Footprint height.
    pub height: f32,
}

impl PropertyTemplate {
    /// Center of the footprint.
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.position.x + self.width / 2.0, self.position.y + self.height / 2.0)
    }

    /// Public services can never be bought.
    pub fn is_public_service(&self) -> bool {
        self.max_owners == 0
    }
}

fn default_properties() -> Vec<PropertyTemplate> {
    #[allow(clippy::too_many_arguments)]
    fn prop(
        id: u32,
        name: &str,
        category: PropertyCategory,
        subtype: &str,
        price: u64,
        income: u64,
        max_owners: u32,
        (x, y, w, h): (f32, f32, f32, f32),
    ) -> PropertyTemplate {
        PropertyTemplate {
            id,
            name: name.to_string(),
            category,
            subtype: subtype.to_string(),
            price,
            income,
            max_owners,
            position: Vec2::new(x, y),
            width: w,
            height: h,
        }
    }

    use PropertyCategory::*;
    vec![
        prop(1, "Harbor Apartments", Residential, "apartment", 1000, 40, 4, (1300.0, 900.0, 160.0, 120.0)),
        prop(2, "Corner Diner", Commercial, "diner", 2500, 120, 2, (1600.0, 1000.0, 120.0, 80.0)),
        prop(3, "Fish Stall", Commercial, "market_stall", 100, 5, 1, (1500.0, 2420.0, 60.0, 40.0)),
        prop(4, "Town Hall", Service, "town_hall", 0, 0, 0, (2300.0, 900.0, 200.0, 160.0)),
        prop(5, "Maple Cottage", Residential, "house", 600, 20, 3, (400.0, 1000.0, 100.0, 80.0)),
        prop(6, "Sawmill", Industrial, "sawmill", 4000, 200, 1, (3000.0, 1350.0, 180.0, 120.0)),
        prop(7, "Warehouse 7", Industrial, "warehouse", 3000, 150, 2, (3300.0, 1900.0, 200.0, 140.0)),
        prop(8, "Police Station", Service, "police", 0, 0, 0, (2450.0, 1550.0, 160.0, 120.0)),
    ]
}

/// Property trading tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Percentage of the price refunded on sale.
    pub sell_rate_percent: u64,
    /// Minimum gap between income credits for one ownership (seconds).
    pub income_cooldown_secs: i64,
    /// When set, buyers must stand within this distance of the property.
    pub purchase_radius: Option<f32>,
    /// Properties on the map.
    pub properties: Vec<PropertyTemplate>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            sell_rate_percent: 60,
            income_cooldown_secs: 300,
            purchase_radius: None,
            properties: default_properties(),
        }
    }
}

// =============================================================================
// ITEMS & PLAYERS
// =============================================================================

/// Shop definition of an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    /// Inventory key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// What the item does.
    pub kind: ItemKind,
    /// Shop price, None if the shop does not sell it.
    pub buy_price: Option<u64>,
    /// Price the shop pays, None if it does not buy it.
    pub sell_price: Option<u64>,
}

fn default_items() -> Vec<ItemDef> {
    let item = |key: &str, name: &str, kind, buy_price, sell_price| ItemDef {
        key: key.to_string(),
        name: name.to_string(),
        kind,
        buy_price,
        sell_price,
    };

    vec![
        item("wood", "Wood", ItemKind::Material, None, Some(5)),
        item("apple", "Apple", ItemKind::Food { hunger_restore: 20 }, Some(10), Some(3)),
        item("fish_taco", "Fish Taco", ItemKind::Food { hunger_restore: 35 }, Some(18), Some(6)),
        item("sandwich", "Sandwich", ItemKind::Food { hunger_restore: 45 }, Some(25), Some(8)),
        item("straw_hat", "Straw Hat", ItemKind::Clothing { slot: EquipSlot::Hat }, Some(40), Some(15)),
        item("tshirt", "T-Shirt", ItemKind::Clothing { slot: EquipSlot::Shirt }, Some(30), Some(10)),
        item("jeans", "Jeans", ItemKind::Clothing { slot: EquipSlot::Pants }, Some(45), Some(15)),
        item("sneakers", "Sneakers", ItemKind::Clothing { slot: EquipSlot::Shoes }, Some(60), Some(20)),
    ]
}

/// Shop catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    /// Every item the world knows about.
    pub items: Vec<ItemDef>,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self { items: default_items() }
    }
}

impl ItemConfig {
    /// Look up an item by key.
    pub fn get(&self, key: &str) -> Option<&ItemDef> {
        self.items.iter().find(|i| i.key == key)
    }
}

/// New player defaults and upkeep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Cash granted on first join.
    pub starting_cash: u64,
    /// Hunger on first join.
    pub starting_hunger: u8,
    /// Hunger lost per full minute.
    pub hunger_decay_per_minute: u8,
    /// Where new players appear.
    pub spawn_point: Vec2,
    /// Players silent for longer than this are inactive (seconds).
    pub inactive_after_secs: i64,
    /// Distance at which harvests, pickups and dropoffs are allowed.
    pub interact_radius: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            starting_cash: 500,
            starting_hunger: 100,
            hunger_decay_per_minute: 1,
            spawn_point: Vec2::new(2000.0, 1450.0),
            inactive_after_secs: 180,
            interact_radius: 60.0,
        }
    }
}

// =============================================================================
// WORLD CONFIG
// =============================================================================

/// Everything the world needs to know that never changes at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Map extents.
    pub map: MapConfig,
    /// Zone table.
    pub zones: ZoneConfig,
    /// Client movement.
    pub movement: MovementConfig,
    /// Trees.
    pub growth: GrowthConfig,
    /// Job board.
    pub jobs: JobConfig,
    /// Properties and trading.
    pub market: MarketConfig,
    /// Item shop.
    pub items: ItemConfig,
    /// Player defaults.
    pub players: PlayerConfig,
    /// How reported positions are treated.
    pub trust: TrustPolicy,
    /// Job generation seed.
    pub seed: u64,
}

impl WorldConfig {
    /// Load and validate a JSON config file. Missing sections use defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-table consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let map = &self.map;
        if !(map.width > 0.0 && map.height > 0.0) {
            return Err(invalid("map must have positive size"));
        }
        if !(0.0..=map.height).contains(&map.water_line_y) {
            return Err(invalid("water line must lie inside the map"));
        }

        let mut zone_ids = BTreeSet::new();
        for zone in &self.zones.zones {
            if !zone_ids.insert(zone.id) {
                return Err(invalid(format!("duplicate zone id {}", zone.id.0)));
            }
            if !(zone.speed_multiplier.is_finite() && zone.speed_multiplier > 0.0) {
                return Err(invalid(format!("zone {} has a non-positive speed multiplier", zone.name)));
            }
        }
        if !zone_ids.contains(&self.zones.default_zone) {
            return Err(invalid("default zone is not defined"));
        }
        if let Some(r) = self.zones.regions.iter().find(|r| !zone_ids.contains(&r.zone)) {
            return Err(invalid(format!("region references unknown zone {}", r.zone.0)));
        }

        for (expected, def) in GrowthStage::ALL.iter().zip(&self.growth.stages) {
            if def.stage != *expected {
                return Err(invalid("growth stages must be listed seedling to mature"));
            }
        }
        if self.growth.stages.len() != GrowthStage::ALL.len() {
            return Err(invalid("every growth stage needs exactly one entry"));
        }
        if self.growth.stages[0].min_age_secs != 0 {
            return Err(invalid("seedling stage must start at age 0"));
        }
        if self.growth.stages.windows(2).any(|w| w[0].min_age_secs >= w[1].min_age_secs) {
            return Err(invalid("growth stage ages must increase"));
        }
        if self.growth.poll_interval_ms == 0 {
            return Err(invalid("harvest poll interval must be positive"));
        }

        if self.jobs.locations.len() < 2 {
            return Err(invalid("jobs need at least two locations"));
        }
        if self.jobs.refill_target < self.jobs.min_available {
            return Err(invalid("job refill target is below the minimum"));
        }

        if self.market.sell_rate_percent > 100 {
            return Err(invalid("sell rate cannot exceed 100%"));
        }
        let mut property_ids = BTreeSet::new();
        for p in &self.market.properties {
            if !property_ids.insert(p.id) {
                return Err(invalid(format!("duplicate property id {}", p.id)));
            }
        }

        let mut item_keys = BTreeSet::new();
        for item in &self.items.items {
            if !item_keys.insert(item.key.as_str()) {
                return Err(invalid(format!("duplicate item key {}", item.key)));
            }
        }
        if !item_keys.contains(self.growth.wood_item.as_str()) {
            return Err(invalid("wood item is missing from the catalog"));
        }

        if self.players.starting_hunger > 100 {
            return Err(invalid("starting hunger is out of range"));
        }
        if self.players.interact_radius <= 0.0 {
            return Err(invalid("interact radius must be positive"));
        }

        Ok(())
    }
}
