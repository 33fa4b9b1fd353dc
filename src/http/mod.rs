// HTTP server module

pub mod response;
pub mod routes;
pub mod server;

pub use routes::{AppState, IptvState};
pub use server::HttpServer;
