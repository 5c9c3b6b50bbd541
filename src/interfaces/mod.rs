//! Outer surfaces driving the application services.

pub mod csv;
