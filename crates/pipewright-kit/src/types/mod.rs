pub mod diagnostics;
pub mod frontend;
pub mod stores;
pub mod types;

pub use diagnostics::Diagnostic;
pub use stores::ValueStore;
pub use types::Value;
