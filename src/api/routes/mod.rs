//! Route handlers

pub mod config;
pub mod containers;
pub mod ha;
pub mod health;
pub mod hosts;
pub mod logs;
