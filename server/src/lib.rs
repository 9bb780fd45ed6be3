//! # PvP Synchronization Server Library
//!
//! This library provides the authoritative server side of a custom-object
//! synchronization engine for player-versus-player combat. Unmodified clients
//! only know vanilla weapon and projectile stats; the server overrides those
//! stats from a catalog and keeps every client converged on its version.
//!
//! ## Core Responsibilities
//!
//! ### Projectile Synchronization
//! Every projectile spawn a client announces is intercepted. When the attacker
//! is in PvP and the catalog overrides the projectile type, the server rewrites
//! the authoritative record (substitute type, scaled velocity, damage) and
//! broadcasts a full replacement so that no client keeps its own prediction.
//!
//! ### Homing
//! Projectile types with a homing radius steer towards the nearest PvP target
//! each tick, turning by at most their angular rate, and are resynced to every
//! PvP participant.
//!
//! ### Inventory Masking
//! Items carried by a player only pick up server-side stats when they are
//! spawned into the world. When a player enters PvP, the server diffs their
//! inventory against the catalog, takes modified items out and drops them back
//! with the overrides stamped on the instance, retrying until the client has
//! picked everything up and answered a final ping.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All authoritative state lives in [`game::GameState`] and is mutated only on
//! the main loop. Network tasks and retry timers communicate with it through
//! channels; waits on client acknowledgements are polled once per tick and end
//! as soon as the connection's cancellation token fires.
//!
//! ### UDP-Based Communication
//! Packets are bincode-encoded [`shared::Packet`] values over UDP. Game logic
//! queues outgoing packets in an [`outbox::Outbox`]; the network layer flushes
//! it at the end of every tick, so corrections leave in the tick that produced
//! them.
//!
//! ## Module Organization
//!
//! - `catalog`: read-only override catalog and its JSON loader
//! - `inventory`: inventory snapshot and the diff engine
//! - `projectile`: live projectile table, provenance and the spawn synchronizer
//! - `homing`: per-tick homing controller
//! - `masking`: inventory masking state machine
//! - `probe`: shared polling primitive and cancellation token
//! - `scheduler`: retry timer abstraction (tokio and manual)
//! - `connection`: typed per-connection context
//! - `client_manager`: connected client roster and timeouts
//! - `game`: authoritative game state and tick
//! - `network`: UDP server and main loop
//! - `config`, `error`, `outbox`: ambient plumbing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::catalog::Catalog;
//! use server::config::Config;
//! use server::network::Server;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Catalog::load("catalog.json".as_ref())?;
//!     let mut server = Server::new(
//!         "127.0.0.1:7777",
//!         Duration::from_millis(16), // ~60Hz
//!         16,
//!         Arc::new(catalog),
//!         Config::default(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod client_manager;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod homing;
pub mod inventory;
pub mod masking;
pub mod network;
pub mod outbox;
pub mod probe;
pub mod projectile;
pub mod scheduler;
