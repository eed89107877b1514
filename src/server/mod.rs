pub mod config;
mod http_layers;
#[allow(clippy::module_inception)]
pub mod server;
mod song_routes;
pub mod state;
mod stream_song;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
