pub mod health;
pub mod prestart;
