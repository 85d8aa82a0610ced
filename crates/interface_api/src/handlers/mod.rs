//! Request handlers

pub mod audit;
pub mod health;
