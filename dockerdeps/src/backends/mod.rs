mod json;
mod make;

pub use json::JsonBackend;
pub use make::{pull_marker, MakeBackend};
