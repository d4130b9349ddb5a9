pub mod client_ip;
pub mod middleware;
pub mod routes;
pub mod state;

pub use client_ip::{ClientIpResolver, IpCidr};
pub use routes::create_router;
pub use state::AppState;
