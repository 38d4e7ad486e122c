//! `realm_client`
//!
//! Client-side world sync:
//! - Zone activity tracking and culling
//! - Player and enemy tracking over pooled visuals
//! - Fixed-delay interpolation of remote positions
//! - Transient effects (damage numbers, flashes, ability circles)
//! - Session lifecycle, batch dispatch and the input cadence
//! - A tokio transport driver

pub mod client;
pub mod effects;
pub mod entity;
pub mod input;
pub mod interp;
pub mod session;
pub mod zones;

pub use client::GameClient;
pub use session::{SessionController, SessionError, SessionState};
