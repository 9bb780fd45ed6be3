//! Scripted unmodified client for soak-testing a running server.
//!
//! It connects, uploads a loadout, turns PvP on, then wanders around firing
//! projectiles while behaving like a stock client: server inventory writes are
//! applied verbatim, world drops are picked up into the first free slot and
//! item-owner requests are answered.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use rand::Rng;
use shared::{ItemStack, Packet, ProjectileState, Vec2, INVENTORY_SIZE, MAX_PROJECTILES};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:7777")]
    server: SocketAddr,
    /// Item ids loaded into the first inventory slots
    #[clap(short, long = "item", default_values_t = vec![757, 3029, 71])]
    items: Vec<i32>,
    /// Projectile type fired by the client
    #[clap(long, default_value = "14")]
    projectile: i32,
    /// Chance (0..1) of picking up a world drop when it arrives
    #[clap(long, default_value = "1.0")]
    pickup_chance: f64,
    /// How long to stay connected, in seconds
    #[clap(short, long, default_value = "30")]
    duration: u64,
}

struct VanillaClient {
    socket: UdpSocket,
    server: SocketAddr,
    client_id: u32,
    inventory: [ItemStack; INVENTORY_SIZE],
    position: Vec2,
    next_identity: u16,
}

impl VanillaClient {
    async fn send(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.send_to(&serialize(packet)?, self.server).await?;
        Ok(())
    }

    async fn upload_inventory(&self) -> Result<(), Box<dyn std::error::Error>> {
        for (slot, item) in self.inventory.iter().enumerate() {
            self.send(&Packet::InventorySlot {
                slot: slot as u8,
                item: *item,
            })
            .await?;
        }
        Ok(())
    }

    async fn handle(
        &mut self,
        packet: Packet,
        pickup_chance: f64,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        match packet {
            Packet::SetInventorySlot { slot, item } => {
                if let Some(entry) = self.inventory.get_mut(slot as usize) {
                    *entry = item;
                }
            }
            Packet::ItemDrop {
                drop_index,
                item,
                overrides,
                ..
            } => {
                if !rand::thread_rng().gen_bool(pickup_chance.clamp(0.0, 1.0)) {
                    debug!("Ignoring drop {} of item {}", drop_index, item.id);
                    return Ok(true);
                }
                let Some(slot) = self.inventory.iter().position(|s| s.is_empty()) else {
                    warn!("Inventory full, leaving item {} on the ground", item.id);
                    return Ok(true);
                };
                self.inventory[slot] = item;
                info!(
                    "Picked up item {} into slot {} with overrides {:?}",
                    item.id, slot, overrides
                );
                self.send(&Packet::InventorySlot {
                    slot: slot as u8,
                    item,
                })
                .await?;
            }
            Packet::RemoveItemOwner { drop_index } => {
                self.send(&Packet::ItemOwner {
                    drop_index,
                    owner: self.client_id,
                })
                .await?;
            }
            Packet::ProjectileNew { state, .. } => {
                debug!(
                    "Projectile {} now type {} at {:?} moving {:?}",
                    state.identity, state.kind, state.position, state.velocity
                );
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected by server: {}", reason);
                return Ok(false);
            }
            other => debug!("Ignoring {:?}", other),
        }
        Ok(true)
    }

    fn next_shot(&mut self, kind: i32) -> ProjectileState {
        let mut rng = rand::thread_rng();
        let identity = self.next_identity;
        self.next_identity = (self.next_identity + 1) % MAX_PROJECTILES as u16;

        ProjectileState {
            identity,
            kind,
            owner: self.client_id,
            position: self.position,
            velocity: Vec2::new(8.0, 0.0).rotate(rng.gen_range(-0.5..0.5)),
            knockback: 2.0,
            damage: 20,
            ai0: 0.0,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    socket
        .send_to(&serialize(&Packet::Connect { client_version: 1 })?, args.server)
        .await?;

    let mut buf = [0u8; 2048];
    let client_id = loop {
        let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await??;
        match deserialize::<Packet>(&buf[..len]) {
            Ok(Packet::Connected { client_id }) => break client_id,
            Ok(Packet::Disconnected { reason }) => {
                warn!("Connection refused: {}", reason);
                return Ok(());
            }
            Ok(other) => debug!("Ignoring {:?} while connecting", other),
            Err(e) => warn!("Failed to deserialize packet: {}", e),
        }
    };
    info!("Connected as client {}", client_id);

    let mut inventory = [ItemStack::EMPTY; INVENTORY_SIZE];
    for (slot, id) in args.items.iter().take(INVENTORY_SIZE).enumerate() {
        inventory[slot] = ItemStack::new(*id, 0, 1);
    }

    let mut client = VanillaClient {
        socket,
        server: args.server,
        client_id,
        inventory,
        position: Vec2::new(400.0, 300.0),
        next_identity: 0,
    };
    client.upload_inventory().await?;
    client.send(&Packet::TogglePvp { hostile: true }).await?;

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut ticker = interval(Duration::from_millis(50));

    while Instant::now() < deadline {
        tokio::select! {
            _ = ticker.tick() => {
                let (jitter, fire) = {
                    let mut rng = rand::thread_rng();
                    (Vec2::new(rng.gen_range(-2.0..2.0), 0.0), rng.gen_bool(0.1))
                };
                client.position = client.position.add(&jitter);
                client.send(&Packet::PlayerUpdate {
                    position: client.position,
                    velocity: jitter,
                    release_use_item: !fire,
                }).await?;

                if fire {
                    let state = client.next_shot(args.projectile);
                    client.send(&Packet::ProjectileNew { state, source_item: client.inventory[0].id }).await?;
                }
            }
            received = client.socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[..len]) {
                    Ok(packet) => {
                        if !client.handle(packet, args.pickup_chance).await? {
                            return Ok(());
                        }
                    }
                    Err(e) => warn!("Failed to deserialize packet: {}", e),
                }
            }
        }
    }

    client.send(&Packet::Disconnect).await?;
    info!("Disconnected after {}s", args.duration);
    Ok(())
}
