use serde::{Deserialize, Serialize};

pub const TICKS_PER_SECOND: u32 = 60;
pub const MAX_PROJECTILES: usize = 1000;
pub const MAX_PROJECTILE_TYPES: usize = 714;
pub const MAX_ITEM_TYPES: usize = 3930;
pub const MAX_WORLD_ITEMS: u16 = 400;
pub const INVENTORY_SIZE: usize = 58;

/// Terraria world units per tile; homing radii are configured in tiles.
pub const PIXEL_TO_WORLD: f32 = 16.0;
pub const PLAYER_WIDTH: f32 = 20.0;
pub const PLAYER_HEIGHT: f32 = 42.0;
pub const PROJECTILE_LIFETIME_TICKS: u32 = 3600;

pub const EMPTY_ITEM: i32 = 0;
/// Junk item used to pad empty inventory slots while masking.
pub const FILLER_ITEM: i32 = 3853;
pub const COIN_ITEMS: std::ops::RangeInclusive<i32> = 71..=74;

///Represents a vector in 2D world space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vec2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, as in world coordinates.
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns `self - other`.
    pub fn sub(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn dot(&self, other: &Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    ///Z component of the 3D cross product.
    pub fn cross(&self, other: &Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn distance(&self, other: &Vec2) -> f32 {
        self.sub(other).magnitude()
    }

    ///Heading of the vector in radians.
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    ///Signed angle in radians that rotates `self` onto `other`, in `[-PI, PI]`.
    pub fn angle_to(&self, other: &Vec2) -> f32 {
        self.cross(other).atan2(self.dot(other))
    }

    ///Returns the vector rotated by `radians`.
    pub fn rotate(&self, radians: f32) -> Vec2 {
        let (sin, cos) = radians.sin_cos();
        Vec2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

/// One inventory slot as seen on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ItemStack {
    pub id: i32,
    pub prefix: u8,
    pub stack: i16,
}

impl ItemStack {
    pub const EMPTY: ItemStack = ItemStack {
        id: EMPTY_ITEM,
        prefix: 0,
        stack: 0,
    };

    pub fn new(id: i32, prefix: u8, stack: i16) -> Self {
        Self { id, prefix, stack }
    }

    pub fn filler() -> Self {
        Self::new(FILLER_ITEM, 0, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.id == EMPTY_ITEM
    }

    pub fn is_coin(&self) -> bool {
        COIN_ITEMS.contains(&self.id)
    }
}

/// Server-side stat overrides stamped on a dropped item instance.
/// `None` fields keep the client's vanilla value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ItemDeltas {
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

impl ItemDeltas {
    pub fn is_empty(&self) -> bool {
        *self == ItemDeltas::default()
    }
}

/// Full projectile state as carried by a `ProjectileNew` packet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ProjectileState {
    pub identity: u16,
    pub kind: i32,
    pub owner: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub knockback: f32,
    pub damage: i32,
    pub ai0: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    PlayerUpdate {
        position: Vec2,
        velocity: Vec2,
        release_use_item: bool,
    },
    TogglePvp {
        hostile: bool,
    },
    InventorySlot {
        slot: u8,
        item: ItemStack,
    },
    ItemOwner {
        drop_index: u16,
        owner: u32,
    },
    Disconnect,

    // Both directions: a spawn request from a client, a full replace from the server.
    ProjectileNew {
        state: ProjectileState,
        source_item: i32,
    },
    KillProjectile {
        identity: u16,
    },

    // Server -> client
    Connected {
        client_id: u32,
    },
    SetInventorySlot {
        slot: u8,
        item: ItemStack,
    },
    ItemDrop {
        drop_index: u16,
        position: Vec2,
        width: i16,
        height: i16,
        item: ItemStack,
        overrides: ItemDeltas,
    },
    RemoveItemOwner {
        drop_index: u16,
    },
    Disconnected {
        reason: String,
    },
}
