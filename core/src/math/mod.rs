pub mod interpolation;
pub mod rotation;
pub mod stats;

pub use interpolation::Table;
pub use rotation::Rotation;
pub use stats::StatsHelper;
