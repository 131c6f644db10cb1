// API module
//
// HTTP surface of the node: the WebSocket protocol endpoint and read-only
// REST views of the chain

pub mod handlers;
pub mod routes;
pub mod ws;

// Re-export main components for easier access
pub use routes::configure_routes;
