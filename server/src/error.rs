//! Error types shared by the server modules.

use thiserror::Error;

/// Failures while loading the override catalog file.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("projectile type {0} is outside the catalog domain")]
    ProjectileTypeOutOfRange(i32),
    #[error("item type {0} is outside the catalog domain")]
    ItemTypeOutOfRange(i32),
}

/// Untrusted client input that cannot be applied to authoritative state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("projectile identity {0} exceeds the live table")]
    ProjectileIdentityOutOfRange(u16),
    #[error("projectile type {0} is outside the catalog domain")]
    ProjectileTypeOutOfRange(i32),
    #[error("inventory slot {0} exceeds the inventory size")]
    InventorySlotOutOfRange(u8),
    #[error("unknown client {0}")]
    UnknownClient(u32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}
