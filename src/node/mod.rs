// Node module
//
// The running node: the service owning ledger and mempool, and the JSON
// protocol wallets and miners speak to it.

pub mod protocol;
pub mod service;

pub use protocol::handle_message;
pub use service::{NodeService, NodeSnapshot, ServiceError};
