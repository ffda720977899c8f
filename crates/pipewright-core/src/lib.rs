#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate lazy_static;

pub use pipewright_kit as kit;

pub mod datasource;
pub mod errors;
pub mod manifest;
pub mod resolver;
pub mod templates;
pub mod types;
pub mod visibility;

#[cfg(test)]
mod tests;

pub use errors::ResolutionError;
pub use resolver::{InputResolver, ResolutionContext, ResolutionOutcome};
