//! Property Market
//!
//! Players buy stakes in properties, sell them back at a fixed rate and
//! collect income on a per-ownership cooldown. Capacity is counted from the
//! ownership rows inside the same transaction that inserts one, so concurrent
//! buyers can never push a property past `max_owners`.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};

use crate::config::WorldConfig;
use crate::game::events::WorldEventData;
use crate::game::state::{Ownership, PlayerId, PropertyId, WorldState};

/// Property trade rejections.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    /// Unknown player.
    #[error("Player has not joined")]
    NotJoined,

    /// Unknown property.
    #[error("Property {0:?} not found")]
    PropertyNotFound(PropertyId),

    /// Public services are never for sale.
    #[error("Public services cannot be bought")]
    PublicService,

    /// Player already holds a stake.
    #[error("Already an owner of this property")]
    AlreadyOwned,

    /// Every stake is taken.
    #[error("Property already has {max_owners} owners")]
    CapacityReached {
        /// Owner limit
        max_owners: u32,
    },

    /// Not enough cash.
    #[error("Costs ${price}, you have ${cash}")]
    InsufficientFunds {
        /// Asking price
        price: u64,
        /// Cash on hand
        cash: u64,
    },

    /// Buyer outside the purchase radius.
    #[error("Too far from the property ({distance:.0} > {radius:.0})")]
    TooFar {
        /// Distance to the footprint center
        distance: f32,
        /// Allowed distance
        radius: f32,
    },

    /// Seller holds no stake.
    #[error("You do not own this property")]
    NotOwned,
}

/// Result of an income collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeReport {
    /// Cash credited
    pub total_income: u64,
    /// Ownerships that paid out
    pub properties_collected: u32,
}

/// Buy a stake in a property. Returns the price paid.
pub fn buy_property(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    property_id: PropertyId,
    now: DateTime<Utc>,
) -> Result<u64, MarketError> {
    let player = state.players.get(&player_id).ok_or(MarketError::NotJoined)?;
    let property = state
        .properties
        .get(&property_id)
        .ok_or(MarketError::PropertyNotFound(property_id))?;
    let template = &property.template;

    if template.is_public_service() {
        return Err(MarketError::PublicService);
    }
    if state.ownerships.contains_key(&(property_id, player_id)) {
        return Err(MarketError::AlreadyOwned);
    }
    if state.owner_count(property_id) >= template.max_owners as usize {
        return Err(MarketError::CapacityReached { max_owners: template.max_owners });
    }
    if player.cash < template.price {
        return Err(MarketError::InsufficientFunds { price: template.price, cash: player.cash });
    }
    if let Some(radius) = config.market.purchase_radius {
        let distance = player.position.distance(template.center());
        if distance > radius {
            return Err(MarketError::TooFar { distance, radius });
        }
    }

    let price = template.price;
    if let Some(player) = state.players.get_mut(&player_id) {
        player.cash -= price;
        player.touch(now);
    }
    state.ownerships.insert(
        (property_id, player_id),
        Ownership {
            player_id,
            property_id,
            purchased_at: now,
            last_collected_at: now,
            total_earned: 0,
        },
    );
    state.push_event(now, WorldEventData::PropertyBought { property_id, player_id, price });
    Ok(price)
}

/// Cash returned for selling a stake.
pub fn sale_credit(price: u64, sell_rate_percent: u64) -> u64 {
    price * sell_rate_percent / 100
}

/// Sell a stake back. Returns the cash credited.
pub fn sell_property(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    property_id: PropertyId,
    now: DateTime<Utc>,
) -> Result<u64, MarketError> {
    if !state.players.contains_key(&player_id) {
        return Err(MarketError::NotJoined);
    }
    let property = state
        .properties
        .get(&property_id)
        .ok_or(MarketError::PropertyNotFound(property_id))?;
    if !state.ownerships.contains_key(&(property_id, player_id)) {
        return Err(MarketError::NotOwned);
    }

    let credit = sale_credit(property.template.price, config.market.sell_rate_percent);
    state.ownerships.remove(&(property_id, player_id));
    if let Some(player) = state.players.get_mut(&player_id) {
        player.cash = player.cash.saturating_add(credit);
        player.touch(now);
    }
    state.push_event(now, WorldEventData::PropertySold { property_id, player_id, credit });
    Ok(credit)
}

/// Credit income for every ownership whose cooldown has passed.
pub fn collect_income(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    now: DateTime<Utc>,
) -> Result<IncomeReport, MarketError> {
    if !state.players.contains_key(&player_id) {
        return Err(MarketError::NotJoined);
    }
    let cooldown = Duration::seconds(config.market.income_cooldown_secs);

    let mut report = IncomeReport::default();
    let properties = &state.properties;
    for row in state.ownerships.values_mut().filter(|o| o.player_id == player_id) {
        if now - row.last_collected_at < cooldown {
            continue;
        }
        let income = properties.get(&row.property_id).map_or(0, |p| p.template.income);
        row.last_collected_at = now;
        row.total_earned = row.total_earned.saturating_add(income);
        report.total_income += income;
        report.properties_collected += 1;
    }

    if let Some(player) = state.players.get_mut(&player_id) {
        player.cash = player.cash.saturating_add(report.total_income);
        player.touch(now);
    }
    if report.properties_collected > 0 {
        state.push_event(
            now,
            WorldEventData::IncomeCollected {
                player_id,
                total: report.total_income,
                properties: report.properties_collected,
            },
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::state::Player;
    use crate::game::zone::ZoneIndex;

    const APARTMENTS: PropertyId = PropertyId(1);
    const FISH_STALL: PropertyId = PropertyId(3);
    const TOWN_HALL: PropertyId = PropertyId(4);

    fn setup(config: WorldConfig) -> (WorldConfig, WorldState, DateTime<Utc>) {
        let zones = ZoneIndex::new(&config.zones, &config.map);
        let now = Utc::now();
        let mut state = WorldState::new(&config, &zones, now);
        for byte in 1u8..=3 {
            let pid = PlayerId::new([byte; 16]);
            let mut player = Player::new(pid, format!("p{byte}"), &config, now);
            player.cash = 10_000;
            state.players.insert(pid, player);
        }
        (config, state, now)
    }

    fn p(byte: u8) -> PlayerId {
        PlayerId::new([byte; 16])
    }

    #[test]
    fn test_buy_then_sell_restores_cash_minus_spread() {
        let (config, mut state, now) = setup(WorldConfig::default());
        let start = state.players[&p(1)].cash;

        let price = buy_property(&mut state, &config, p(1), FISH_STALL, now).unwrap();
        assert_eq!(state.players[&p(1)].cash, start - price);
        assert_eq!(state.owner_count(FISH_STALL), 1);

        let credit = sell_property(&mut state, &config, p(1), FISH_STALL, now).unwrap();
        assert_eq!(credit, price * 60 / 100);
        assert_eq!(state.players[&p(1)].cash, start - price + credit);
        assert!(!state.ownerships.contains_key(&(FISH_STALL, p(1))));
    }

    #[test]
    fn test_broke_buyer_rejected_without_change() {
        let (config, mut state, now) = setup(WorldConfig::default());
        state.players.get_mut(&p(1)).unwrap().cash = 0;

        let err = buy_property(&mut state, &config, p(1), FISH_STALL, now).unwrap_err();
        assert_eq!(err, MarketError::InsufficientFunds { price: 100, cash: 0 });
        assert_eq!(state.players[&p(1)].cash, 0);
        assert_eq!(state.owner_count(FISH_STALL), 0);
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn test_public_service_and_duplicates() {
        let (config, mut state, now) = setup(WorldConfig::default());
        assert_eq!(
            buy_property(&mut state, &config, p(1), TOWN_HALL, now),
            Err(MarketError::PublicService)
        );
        buy_property(&mut state, &config, p(1), FISH_STALL, now).unwrap();
        assert_eq!(
            buy_property(&mut state, &config, p(1), FISH_STALL, now),
            Err(MarketError::AlreadyOwned)
        );
    }

    #[test]
    fn test_capacity() {
        let (config, mut state, now) = setup(WorldConfig::default());
        buy_property(&mut state, &config, p(1), FISH_STALL, now).unwrap();
        assert_eq!(
            buy_property(&mut state, &config, p(2), FISH_STALL, now),
            Err(MarketError::CapacityReached { max_owners: 1 })
        );

        // Selling frees the stake
        sell_property(&mut state, &config, p(1), FISH_STALL, now).unwrap();
        buy_property(&mut state, &config, p(2), FISH_STALL, now).unwrap();
    }

    #[test]
    fn test_sell_without_ownership() {
        let (config, mut state, now) = setup(WorldConfig::default());
        assert_eq!(
            sell_property(&mut state, &config, p(1), APARTMENTS, now),
            Err(MarketError::NotOwned)
        );
        assert_eq!(
            sell_property(&mut state, &config, p(1), PropertyId(99), now),
            Err(MarketError::PropertyNotFound(PropertyId(99)))
        );
    }

    #[test]
    fn test_purchase_radius() {
        let mut config = WorldConfig::default();
        config.market.purchase_radius = Some(100.0);
        let (config, mut state, now) = setup(config);

        let stall = state.properties[&FISH_STALL].template.center();
        state.players.get_mut(&p(1)).unwrap().position = stall + Vec2::new(500.0, 0.0);
        assert!(matches!(
            buy_property(&mut state, &config, p(1), FISH_STALL, now),
            Err(MarketError::TooFar { .. })
        ));
        state.players.get_mut(&p(1)).unwrap().position = stall;
        assert!(buy_property(&mut state, &config, p(1), FISH_STALL, now).is_ok());
    }

    #[test]
    fn test_income_respects_cooldown() {
        let (config, mut state, now) = setup(WorldConfig::default());
        buy_property(&mut state, &config, p(1), FISH_STALL, now).unwrap();
        buy_property(&mut state, &config, p(1), APARTMENTS, now).unwrap();
        let cash = state.players[&p(1)].cash;

        let early = collect_income(&mut state, &config, p(1), now + Duration::seconds(10)).unwrap();
        assert_eq!(early, IncomeReport::default());

        let due = now + Duration::seconds(config.market.income_cooldown_secs);
        let report = collect_income(&mut state, &config, p(1), due).unwrap();
        assert_eq!(report, IncomeReport { total_income: 45, properties_collected: 2 });
        assert_eq!(state.players[&p(1)].cash, cash + 45);
        assert_eq!(state.ownerships[&(APARTMENTS, p(1))].total_earned, 40);

        // Same window again pays nothing
        let again = collect_income(&mut state, &config, p(1), due + Duration::seconds(1)).unwrap();
        assert_eq!(again.total_income, 0);
    }

    #[test]
    fn test_income_is_per_player() {
        let (config, mut state, now) = setup(WorldConfig::default());
        buy_property(&mut state, &config, p(1), APARTMENTS, now).unwrap();
        buy_property(&mut state, &config, p(2), APARTMENTS, now).unwrap();

        let due = now + Duration::seconds(config.market.income_cooldown_secs);
        collect_income(&mut state, &config, p(1), due).unwrap();
        assert_eq!(state.ownerships[&(APARTMENTS, p(2))].total_earned, 0);
        assert_eq!(state.ownerships[&(APARTMENTS, p(2))].last_collected_at, now);
    }
}
