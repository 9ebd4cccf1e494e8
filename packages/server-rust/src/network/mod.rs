//! Client-facing network surface: configuration, HTTP/WebSocket handlers,
//! middleware, shutdown control, and the server lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::*;
