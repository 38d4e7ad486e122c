//! `realm_shared`
//!
//! Libraries shared by the client binary, its integration tests and tools.
//!
//! Design goals:
//! - Deterministic where practical; no clocks read inside these modules.
//! - Bounded memory: render pools are sized once and never grow.
//! - Clear separation of concerns (config, math, net, pools, events).
//! - No `unsafe`.

pub mod config;
pub mod event;
pub mod math;
pub mod net;
pub mod pool;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::pool::*;
}
