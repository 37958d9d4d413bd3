//! deckvault library crate.
//!
//! Persistence core for a card collection manager: scoped credential
//! acquisition, the data-store client factory and the data access façade.

pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod logging;
pub mod services;

pub use error::{Error, Result};
