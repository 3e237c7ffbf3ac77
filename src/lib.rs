pub mod invalidation_stack;
pub mod packaging;
pub mod settings;

pub use invalidation_stack::{build, StackDefinition};
pub use settings::StackSettings;
