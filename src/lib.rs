// src/lib.rs

pub mod cli;
pub mod constants;
pub mod core;
pub mod system;
