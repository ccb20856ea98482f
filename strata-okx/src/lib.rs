mod auth;
mod client;
mod http;
mod model;
mod ws;
mod ws_model;

pub use auth::*;
pub use client::*;
pub use http::*;
pub use model::*;
pub use ws::*;
pub use ws_model::*;
