//! Command handler implementations

pub mod remind;

pub use remind::RemindHandler;
