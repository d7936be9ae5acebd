pub mod health;
pub mod monitor;
pub mod safety;
pub mod session;
pub mod simulate;
