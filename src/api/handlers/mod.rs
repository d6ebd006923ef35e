//! API request handlers

pub mod alert;
pub mod health;
