pub mod collection;
pub mod point;

pub use collection::GridPointCollection;
pub use point::{GridPoint, GridPointKind};
