#[macro_use]
extern crate serde_derive;

#[macro_use]
mod macros;

pub use indexmap;
pub use indoc::indoc;
pub use uuid;
pub extern crate crossbeam_channel as channel;
pub use futures;
pub use rand;
pub use reqwest;
pub use serde;
pub use serde_json;
pub use url;

pub mod cancellation;
pub mod transport;
pub mod types;
