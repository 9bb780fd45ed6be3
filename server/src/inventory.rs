//! Inventory snapshot and the diff engine that classifies slots as modified.

use crate::catalog::Catalog;
use crate::error::ProtocolError;
use shared::{ItemDeltas, ItemStack, INVENTORY_SIZE};

/// Server-held copy of a player's inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    slots: [ItemStack; INVENTORY_SIZE],
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: [ItemStack::EMPTY; INVENTORY_SIZE],
        }
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a slot index received from a client.
    pub fn check_slot(slot: u8) -> Result<usize, ProtocolError> {
        if (slot as usize) < INVENTORY_SIZE {
            Ok(slot as usize)
        } else {
            Err(ProtocolError::InventorySlotOutOfRange(slot))
        }
    }

    pub fn get(&self, slot: usize) -> ItemStack {
        assert!(slot < INVENTORY_SIZE, "inventory slot {slot} out of range");
        self.slots[slot]
    }

    pub fn set(&mut self, slot: usize, item: ItemStack) {
        assert!(slot < INVENTORY_SIZE, "inventory slot {slot} out of range");
        self.slots[slot] = item;
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ItemStack)> {
        self.slots.iter().enumerate()
    }
}

/// Classification of one inventory slot against the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotDiff {
    pub slot: usize,
    pub item: ItemStack,
    pub modified: bool,
    pub deltas: ItemDeltas,
}

/// Overrides the catalog applies to `kind` on top of its vanilla stats.
///
/// Damage, knockback and the not-ammo flag count only when they differ from the
/// vanilla baseline; every other field counts as soon as it is set. Coins never
/// carry overrides.
pub fn resolve_deltas(catalog: &Catalog, kind: i32) -> ItemDeltas {
    if shared::COIN_ITEMS.contains(&kind) {
        return ItemDeltas::default();
    }
    let Some(record) = catalog.item(kind) else {
        return ItemDeltas::default();
    };
    let vanilla = catalog.vanilla_item(kind);

    ItemDeltas {
        damage: record.damage.filter(|d| *d != vanilla.damage),
        knockback: record.knockback.filter(|k| *k != vanilla.knockback),
        use_animation: record.use_animation,
        use_time: record.use_time,
        shoot: record.shoot,
        shoot_speed: record.shoot_speed,
        ammo_identifier: record.ammo_identifier,
        use_ammo_identifier: record.use_ammo_identifier,
        not_ammo: record.not_ammo.filter(|n| *n != vanilla.not_ammo),
    }
}

pub fn is_modified_item(catalog: &Catalog, kind: i32) -> bool {
    !resolve_deltas(catalog, kind).is_empty()
}

/// Classifies every slot of `inventory`, in slot order.
pub fn diff_inventory(inventory: &Inventory, catalog: &Catalog) -> Vec<SlotDiff> {
    inventory
        .iter()
        .map(|(slot, item)| {
            let deltas = if item.is_empty() {
                ItemDeltas::default()
            } else {
                resolve_deltas(catalog, item.id)
            };
            SlotDiff {
                slot,
                item: *item,
                modified: !deltas.is_empty(),
                deltas,
            }
        })
        .collect()
}
