pub mod certs;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod router;
pub mod rules;
pub mod service;
pub mod tls;

pub use error::PorticoError;
pub use router::{EdgeState, FrontendService};
pub use rules::{RouteTarget, RouterTable};
