pub mod dashboard;
pub mod dispatch;
