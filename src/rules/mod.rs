pub mod matcher;
pub mod table;

pub use matcher::{HostMatcher, Rule, normalize_host};
pub use table::{Route, RouteTarget, RouterTable};
