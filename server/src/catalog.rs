//! Read-only override catalog.
//!
//! The catalog file keeps the flat record shape of the weapon database, where
//! `-1` marks a field as unset. Records are converted to `Option` fields on
//! load so that an explicit zero stays distinguishable from "no override".

use crate::error::CatalogError;
use log::info;
use serde::Deserialize;
use shared::{MAX_ITEM_TYPES, MAX_PROJECTILE_TYPES};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const UNSET: i32 = -1;
const UNSET_F: f32 = -1.0;

fn unset_i32(value: i32) -> Option<i32> {
    (value != UNSET).then_some(value)
}

fn unset_f32(value: f32) -> Option<f32> {
    (value != UNSET_F).then_some(value)
}

/// Server-side overrides for one projectile type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileOverride {
    /// Type spawned instead of the requested one.
    pub substitute: Option<i32>,
    pub velocity_multiplier: f32,
    pub damage: Option<i32>,
    /// Homing radius in tiles; `None` disables homing.
    pub homing_radius: Option<f32>,
    /// Maximum heading change per tick, in radians.
    pub angular_velocity: f32,
}

impl Default for ProjectileOverride {
    fn default() -> Self {
        Self {
            substitute: None,
            velocity_multiplier: 1.0,
            damage: None,
            homing_radius: None,
            angular_velocity: 0.0,
        }
    }
}

impl ProjectileOverride {
    /// True unless the record is the no-op identity for `kind`:
    /// substitute equal to itself, multiplier 1, damage unset. An unset
    /// substitute differs from `kind` and so counts as an override.
    pub fn is_effective(&self, kind: i32) -> bool {
        self.substitute != Some(kind)
            || self.velocity_multiplier != 1.0
            || self.damage.is_some()
    }
}

/// Server-side overrides for one item type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ItemOverride {
    pub damage: Option<i32>,
    pub knockback: Option<f32>,
    pub use_animation: Option<i32>,
    pub use_time: Option<i32>,
    pub shoot: Option<i32>,
    pub shoot_speed: Option<f32>,
    pub ammo_identifier: Option<i32>,
    pub use_ammo_identifier: Option<i32>,
    pub not_ammo: Option<bool>,
}

/// Stats an unmodified client knows for an item type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ItemBaseline {
    #[serde(default)]
    pub damage: i32,
    #[serde(default)]
    pub knockback: f32,
    #[serde(default)]
    pub not_ammo: bool,
}

#[derive(Debug, Deserialize)]
struct RawProjectile {
    kind: i32,
    #[serde(default = "unset")]
    shoot: i32,
    #[serde(default = "one")]
    velocity_multiplier: f32,
    #[serde(default = "unset")]
    damage: i32,
    #[serde(default = "unset_f")]
    homing_radius: f32,
    #[serde(default)]
    angular_velocity: f32,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    kind: i32,
    #[serde(default = "unset")]
    damage: i32,
    #[serde(default = "unset_f")]
    knockback: f32,
    #[serde(default = "unset")]
    use_animation: i32,
    #[serde(default = "unset")]
    use_time: i32,
    #[serde(default = "unset")]
    shoot: i32,
    #[serde(default = "unset_f")]
    shoot_speed: f32,
    #[serde(default = "unset")]
    ammo_identifier: i32,
    #[serde(default = "unset")]
    use_ammo_identifier: i32,
    #[serde(default)]
    not_ammo: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawBaseline {
    kind: i32,
    #[serde(flatten)]
    stats: ItemBaseline,
}

#[derive(Debug, Deserialize, Default)]
struct CatalogFile {
    #[serde(default)]
    projectiles: Vec<RawProjectile>,
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    vanilla_items: Vec<RawBaseline>,
}

fn unset() -> i32 {
    UNSET
}

fn unset_f() -> f32 {
    UNSET_F
}

fn one() -> f32 {
    1.0
}

impl From<&RawProjectile> for ProjectileOverride {
    fn from(raw: &RawProjectile) -> Self {
        Self {
            substitute: unset_i32(raw.shoot),
            velocity_multiplier: raw.velocity_multiplier,
            damage: unset_i32(raw.damage),
            homing_radius: (raw.homing_radius >= 0.0).then_some(raw.homing_radius),
            angular_velocity: raw.angular_velocity,
        }
    }
}

impl From<&RawItem> for ItemOverride {
    fn from(raw: &RawItem) -> Self {
        Self {
            damage: unset_i32(raw.damage),
            knockback: unset_f32(raw.knockback),
            use_animation: unset_i32(raw.use_animation),
            use_time: unset_i32(raw.use_time),
            shoot: unset_i32(raw.shoot),
            shoot_speed: unset_f32(raw.shoot_speed),
            ammo_identifier: unset_i32(raw.ammo_identifier),
            use_ammo_identifier: unset_i32(raw.use_ammo_identifier),
            not_ammo: raw.not_ammo,
        }
    }
}

pub fn is_projectile_type(kind: i32) -> bool {
    (0..MAX_PROJECTILE_TYPES as i32).contains(&kind)
}

pub fn is_item_type(kind: i32) -> bool {
    (0..MAX_ITEM_TYPES as i32).contains(&kind)
}

/// Override lookup keyed by object type. A missing entry means "no override".
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    projectiles: HashMap<i32, ProjectileOverride>,
    items: HashMap<i32, ItemOverride>,
    vanilla: HashMap<i32, ItemBaseline>,
    modified_projectiles: HashSet<i32>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&text)?;
        info!(
            "Loaded catalog from {}: {} projectile overrides, {} item overrides, {} baselines",
            path.display(),
            catalog.projectiles.len(),
            catalog.items.len(),
            catalog.vanilla.len()
        );
        Ok(catalog)
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text)?;
        let mut catalog = Catalog::new();

        for raw in &file.projectiles {
            if !is_projectile_type(raw.kind) {
                return Err(CatalogError::ProjectileTypeOutOfRange(raw.kind));
            }
            if raw.shoot != UNSET && !is_projectile_type(raw.shoot) {
                return Err(CatalogError::ProjectileTypeOutOfRange(raw.shoot));
            }
            catalog.insert_projectile(raw.kind, raw.into());
        }
        for raw in &file.items {
            if !is_item_type(raw.kind) {
                return Err(CatalogError::ItemTypeOutOfRange(raw.kind));
            }
            catalog.insert_item(raw.kind, raw.into());
        }
        for raw in &file.vanilla_items {
            if !is_item_type(raw.kind) {
                return Err(CatalogError::ItemTypeOutOfRange(raw.kind));
            }
            catalog.insert_vanilla(raw.kind, raw.stats);
        }

        Ok(catalog)
    }

    pub fn insert_projectile(&mut self, kind: i32, record: ProjectileOverride) {
        if record.is_effective(kind) {
            self.modified_projectiles.insert(kind);
        } else {
            self.modified_projectiles.remove(&kind);
        }
        self.projectiles.insert(kind, record);
    }

    pub fn insert_item(&mut self, kind: i32, record: ItemOverride) {
        self.items.insert(kind, record);
    }

    pub fn insert_vanilla(&mut self, kind: i32, baseline: ItemBaseline) {
        self.vanilla.insert(kind, baseline);
    }

    pub fn projectile(&self, kind: i32) -> Option<&ProjectileOverride> {
        self.projectiles.get(&kind)
    }

    pub fn item(&self, kind: i32) -> Option<&ItemOverride> {
        self.items.get(&kind)
    }

    /// Vanilla stats for an item type; unknown types fall back to zeroed stats.
    pub fn vanilla_item(&self, kind: i32) -> ItemBaseline {
        self.vanilla.get(&kind).copied().unwrap_or_default()
    }

    pub fn is_modified_projectile(&self, kind: i32) -> bool {
        self.modified_projectiles.contains(&kind)
    }
}
