pub mod dashboard_auth;
pub mod redirect;
