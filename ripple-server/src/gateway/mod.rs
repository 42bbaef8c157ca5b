mod connection;
mod protocol;
mod rate_limit;
mod state;

pub use connection::handle_connection;
pub use protocol::{ClientEvent, ServerEvent};
pub use rate_limit::RateLimiter;
pub use state::{chat_room, user_room, GatewayState};
