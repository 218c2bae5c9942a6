pub mod routes;
mod server;
pub use server::{app, app_state, serve};
pub mod public;
mod state;
pub use state::AppState;
