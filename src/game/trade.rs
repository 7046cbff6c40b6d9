//! Item Shop
//!
//! Buying and selling items for cash, eating food and wearing clothes.

use chrono::{DateTime, Utc};

use crate::config::{ItemDef, WorldConfig};
use crate::game::events::WorldEventData;
use crate::game::state::{EquipSlot, ItemKind, Player, PlayerId, WorldState, MAX_HUNGER};

/// Item trade rejections.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeError {
    /// Unknown player.
    #[error("Player has not joined")]
    NotJoined,

    /// Item key not in the catalog.
    #[error("Unknown item '{0}'")]
    UnknownItem(String),

    /// The shop does not sell this item.
    #[error("'{0}' is not for sale")]
    NotForSale(String),

    /// The shop does not buy this item.
    #[error("The shop does not buy '{0}'")]
    NotBuyable(String),

    /// Quantity must be at least one.
    #[error("Quantity must be positive")]
    InvalidQuantity,

    /// Not enough cash.
    #[error("Costs ${cost}, you have ${cash}")]
    InsufficientFunds {
        /// Total cost
        cost: u64,
        /// Cash on hand
        cash: u64,
    },

    /// Not enough of the item in the inventory.
    #[error("Only {held} of '{item}' in inventory")]
    NotEnoughItems {
        /// Item key
        item: String,
        /// Quantity held
        held: u32,
    },

    /// Item cannot be eaten.
    #[error("'{0}' is not food")]
    NotFood(String),

    /// Item cannot be worn.
    #[error("'{0}' cannot be worn")]
    NotClothing(String),
}

fn lookup<'a>(config: &'a WorldConfig, key: &str) -> Result<&'a ItemDef, TradeError> {
    config.items.get(key).ok_or_else(|| TradeError::UnknownItem(key.to_string()))
}

fn player_mut(state: &mut WorldState, player_id: PlayerId) -> Result<&mut Player, TradeError> {
    state.players.get_mut(&player_id).ok_or(TradeError::NotJoined)
}

fn require_held(player: &Player, key: &str, qty: u32) -> Result<(), TradeError> {
    let held = player.inventory.count(key);
    if held < qty {
        return Err(TradeError::NotEnoughItems { item: key.to_string(), held });
    }
    Ok(())
}

/// Buy `qty` of an item. Returns the total cost.
pub fn buy_item(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    key: &str,
    qty: u32,
    now: DateTime<Utc>,
) -> Result<u64, TradeError> {
    let item = lookup(config, key)?;
    let price = item.buy_price.ok_or_else(|| TradeError::NotForSale(key.to_string()))?;
    if qty == 0 {
        return Err(TradeError::InvalidQuantity);
    }
    let player = player_mut(state, player_id)?;
    let cost = price.saturating_mul(qty as u64);
    if player.cash < cost {
        return Err(TradeError::InsufficientFunds { cost, cash: player.cash });
    }

    player.cash -= cost;
    player.inventory.add(key, qty);
    player.touch(now);
    state.push_event(now, WorldEventData::ItemBought {
        player_id,
        item: key.to_string(),
        quantity: qty,
        cost,
    });
    Ok(cost)
}

/// Sell `qty` of an item. Returns the cash credited.
pub fn sell_item(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    key: &str,
    qty: u32,
    now: DateTime<Utc>,
) -> Result<u64, TradeError> {
    let item = lookup(config, key)?;
    let price = item.sell_price.ok_or_else(|| TradeError::NotBuyable(key.to_string()))?;
    if qty == 0 {
        return Err(TradeError::InvalidQuantity);
    }
    let player = player_mut(state, player_id)?;
    require_held(player, key, qty)?;

    let credit = price.saturating_mul(qty as u64);
    player.inventory.remove(key, qty);
    player.cash = player.cash.saturating_add(credit);
    player.touch(now);
    state.push_event(now, WorldEventData::ItemSold {
        player_id,
        item: key.to_string(),
        quantity: qty,
        credit,
    });
    Ok(credit)
}

/// Eat one food item. Returns the new hunger value.
pub fn consume_item(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    key: &str,
    now: DateTime<Utc>,
) -> Result<u8, TradeError> {
    let restore = match lookup(config, key)?.kind {
        ItemKind::Food { hunger_restore } => hunger_restore,
        _ => return Err(TradeError::NotFood(key.to_string())),
    };
    let player = player_mut(state, player_id)?;
    require_held(player, key, 1)?;

    player.inventory.remove(key, 1);
    player.hunger = player.hunger.saturating_add(restore).min(MAX_HUNGER);
    player.touch(now);
    let hunger = player.hunger;
    state.push_event(now, WorldEventData::ItemConsumed {
        player_id,
        item: key.to_string(),
        hunger,
    });
    Ok(hunger)
}

/// Wear a clothing item. The item it replaces goes back into the inventory.
pub fn equip_item(
    state: &mut WorldState,
    config: &WorldConfig,
    player_id: PlayerId,
    key: &str,
    now: DateTime<Utc>,
) -> Result<Option<String>, TradeError> {
    let slot: EquipSlot = match lookup(config, key)?.kind {
        ItemKind::Clothing { slot } => slot,
        _ => return Err(TradeError::NotClothing(key.to_string())),
    };
    let player = player_mut(state, player_id)?;
    require_held(player, key, 1)?;

    player.inventory.remove(key, 1);
    let previous = player.equipment.replace(slot, Some(key.to_string()));
    if let Some(old) = &previous {
        player.inventory.add(old, 1);
    }
    player.touch(now);
    state.push_event(now, WorldEventData::ItemEquipped {
        player_id,
        item: key.to_string(),
        replaced: previous.clone(),
    });
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::zone::ZoneIndex;

    fn setup() -> (WorldConfig, WorldState, PlayerId, DateTime<Utc>) {
        let config = WorldConfig::default();
        let zones = ZoneIndex::new(&config.zones, &config.map);
        let now = Utc::now();
        let mut state = WorldState::new(&config, &zones, now);
        let pid = PlayerId::new([1; 16]);
        state.players.insert(pid, Player::new(pid, "Ada".into(), &config, now));
        (config, state, pid, now)
    }

    #[test]
    fn test_buy_and_sell_items() {
        let (config, mut state, pid, now) = setup();
        let cost = buy_item(&mut state, &config, pid, "apple", 3, now).unwrap();
        assert_eq!(cost, 30);
        assert_eq!(state.players[&pid].cash, 470);
        assert_eq!(state.players[&pid].inventory.count("apple"), 3);

        let credit = sell_item(&mut state, &config, pid, "apple", 2, now).unwrap();
        assert_eq!(credit, 6);
        assert_eq!(state.players[&pid].inventory.count("apple"), 1);
        assert_eq!(state.players[&pid].cash, 476);
    }

    #[test]
    fn test_rejections_leave_state_unchanged() {
        let (config, mut state, pid, now) = setup();
        let before = state.players[&pid].clone();

        assert_eq!(
            buy_item(&mut state, &config, pid, "wood", 1, now),
            Err(TradeError::NotForSale("wood".into()))
        );
        assert_eq!(
            buy_item(&mut state, &config, pid, "sneakers", 100, now),
            Err(TradeError::InsufficientFunds { cost: 6000, cash: 500 })
        );
        assert_eq!(
            sell_item(&mut state, &config, pid, "wood", 1, now),
            Err(TradeError::NotEnoughItems { item: "wood".into(), held: 0 })
        );
        assert_eq!(
            buy_item(&mut state, &config, pid, "apple", 0, now),
            Err(TradeError::InvalidQuantity)
        );
        assert!(matches!(
            buy_item(&mut state, &config, pid, "caviar", 1, now),
            Err(TradeError::UnknownItem(_))
        ));

        let after = &state.players[&pid];
        assert_eq!(after.cash, before.cash);
        assert_eq!(after.inventory, before.inventory);
    }

    #[test]
    fn test_eating_caps_hunger() {
        let (config, mut state, pid, now) = setup();
        state.players.get_mut(&pid).unwrap().hunger = 90;
        buy_item(&mut state, &config, pid, "sandwich", 1, now).unwrap();

        assert_eq!(consume_item(&mut state, &config, pid, "sandwich", now), Ok(MAX_HUNGER));
        assert_eq!(state.players[&pid].inventory.count("sandwich"), 0);
        assert_eq!(
            consume_item(&mut state, &config, pid, "straw_hat", now),
            Err(TradeError::NotFood("straw_hat".into()))
        );
    }

    #[test]
    fn test_equip_swaps_into_inventory() {
        let (config, mut state, pid, now) = setup();
        state.players.get_mut(&pid).unwrap().inventory.add("straw_hat", 1);
        state.players.get_mut(&pid).unwrap().equipment.hat = Some("cap".into());

        let previous = equip_item(&mut state, &config, pid, "straw_hat", now).unwrap();
        assert_eq!(previous, Some("cap".into()));
        let player = &state.players[&pid];
        assert_eq!(player.equipment.get(EquipSlot::Hat), Some("straw_hat"));
        assert_eq!(player.inventory.count("straw_hat"), 0);
        assert_eq!(player.inventory.count("cap"), 1);

        assert_eq!(
            equip_item(&mut state, &config, pid, "apple", now),
            Err(TradeError::NotClothing("apple".into()))
        );
    }

    #[test]
    fn test_trades_emit_events() {
        let (config, mut state, pid, now) = setup();
        buy_item(&mut state, &config, pid, "apple", 2, now).unwrap();
        sell_item(&mut state, &config, pid, "apple", 1, now).unwrap();
        consume_item(&mut state, &config, pid, "apple", now).unwrap();
        state.players.get_mut(&pid).unwrap().inventory.add("straw_hat", 1);
        equip_item(&mut state, &config, pid, "straw_hat", now).unwrap();

        let events: Vec<_> = state.take_events().into_iter().map(|e| e.data).collect();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            WorldEventData::ItemBought { player_id: pid, item: "apple".into(), quantity: 2, cost: 20 }
        );
        assert!(matches!(&events[1], WorldEventData::ItemSold { credit: 3, .. }));
        assert!(matches!(&events[2], WorldEventData::ItemConsumed { item, .. } if item == "apple"));
        assert!(matches!(&events[3], WorldEventData::ItemEquipped { replaced: None, .. }));

        assert!(buy_item(&mut state, &config, pid, "wood", 1, now).is_err());
        assert!(state.take_events().is_empty());
    }
}
