// src/core/mod.rs

pub mod datetime;
pub mod mapper;
pub mod model;
pub mod partition;
pub mod preview;
pub mod script;
