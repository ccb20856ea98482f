mod bus;
mod clock;
mod config;
mod constants;
mod engine;
mod errors;
mod events;
mod logging;
mod models;
mod pacer;
mod pubsub;
mod service;
mod stats;
mod traits;

pub use bus::*;
pub use clock::*;
pub use config::*;
pub use constants::*;
pub use engine::*;
pub use errors::*;
pub use events::*;
pub use logging::*;
pub use models::*;
pub use pacer::*;
pub use pubsub::*;
pub use service::*;
pub use stats::*;
pub use traits::*;

pub mod prelude {
    pub use crate::bus::*;
    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::constants::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::logging::*;
    pub use crate::models::*;
    pub use crate::pacer::*;
    pub use crate::pubsub::*;
    pub use crate::service::*;
    pub use crate::stats::*;
    pub use crate::traits::*;
}
