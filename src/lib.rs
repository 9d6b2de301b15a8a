// Library exports for the plancake process manager

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logs;
pub mod process;
pub mod state;
