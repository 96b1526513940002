pub mod health;
pub mod ip;
