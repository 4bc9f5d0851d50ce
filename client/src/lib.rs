//! # Arena Observer Client
//!
//! A process that mirrors the authority's entities and asks it to do things.
//! Nothing here is authoritative: every gameplay outcome arrives as a field
//! update, a spawn, a despawn or a broadcast.
//!
//! ## Architecture
//!
//! ### Observer state
//! [`game::ObserverState`] keeps one typed field mirror per entity and
//! installs delivered updates by revision, so a late or duplicated datagram
//! never rolls a field back. It also keeps the server-clock estimate, the
//! kill feed, and the local watchers that turn conditions into requests
//! (an expired buff, a handed-over power-up, the interactables in reach).
//!
//! ### Presentation
//! Rendering and audio live outside this crate and plug in through
//! [`presentation::Presentation`]. The binary logs instead of drawing.
//!
//! ### Input
//! [`input::InputManager`] turns per-frame [`input::InputFrame`]s into
//! requests. [`input::BotInput`] produces frames for headless runs.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(ClientOptions {
//!         bot: true,
//!         ..Default::default()
//!     })
//!     .await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod kill_feed;
pub mod network;
pub mod presentation;
