//! # Arena Authority Server
//!
//! The single process whose writes are canonical. It owns every replicated
//! entity, executes observer requests and pushes field updates, spawns,
//! despawns and one-shot broadcasts back out over UDP.
//!
//! ## Architecture
//!
//! ### Session context
//! [`session::Session`] carries the process role, the authority clock, the
//! connected observers and an outbox. Gameplay code never touches sockets;
//! it writes fields and queues broadcasts, and the network loop drains the
//! outbox once per tick.
//!
//! ### Entity registry
//! [`world::World`] maps entity ids to a closed [`world::Entity`] enum and
//! drives one fixed simulation step per tick: gravity, projectiles, cabin
//! occupancy, the elevator, power-ups and light flicker, then a flush of
//! every changed field.
//!
//! ### Single-threaded event loop
//! [`network::Server`] runs one `tokio::select!` loop over incoming packets
//! and the tick timer. Requests are applied in arrival order; background
//! tasks only receive datagrams, send datagrams and watch for timeouts.
//!
//! ## Modules
//!
//! - `player`: player state machine, damage, death, melee, buffs
//! - `projectile`: flight, sub-stepped collision, single resolution
//! - `elevator`: two sliding doors and the cabin they guard
//! - `rotating_door`: hinged scene door
//! - `light`: scene lights and their flicker bursts
//! - `lobby`: mode picks, quorum and scene loading
//! - `powerup`: pickups and their spawner
//! - `client_manager`: observer addresses, capacity and timeouts
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use shared::SceneLayout;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         ServerConfig::default(),
//!         SceneLayout::default(),
//!     ).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod elevator;
pub mod light;
pub mod lobby;
pub mod network;
pub mod player;
pub mod powerup;
pub mod projectile;
pub mod rotating_door;
pub mod session;
pub mod world;
