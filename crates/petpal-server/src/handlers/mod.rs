pub mod contracts;
pub mod health;
pub mod signing;
pub mod templates;
