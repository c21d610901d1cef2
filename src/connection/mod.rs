//! WebSocket connection lifecycle: dialing, close classification and reconnects.

mod close;
mod manager;
mod transport;

pub use close::{
    DisconnectKind, DisconnectReason, ReconnectPolicy, CLOSE_ABNORMAL, CLOSE_NO_STATUS,
    CLOSE_POLICY_VIOLATION,
};
pub use manager::{ConnectionManager, ConnectionSettings, ConnectionState};
pub use transport::{build_endpoint, Connector, Frame, Socket, TungsteniteConnector};
