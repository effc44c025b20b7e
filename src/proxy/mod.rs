pub mod client;

pub use client::{ClientAddr, UpstreamClient};
