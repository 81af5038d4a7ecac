//! Constants shared across the crate

pub mod defaults;
