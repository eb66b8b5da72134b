//! petpal-server: REST surface over the PetPal contract lifecycle.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod router;
pub mod state;
