//! Lead directory types.

pub mod model;

pub use model::Lead;
