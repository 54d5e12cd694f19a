pub mod engine;
pub mod local;
pub mod volume;

pub use engine::*;
pub use local::LocalStorage;
