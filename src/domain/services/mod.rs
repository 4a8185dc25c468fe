mod hydration;
mod mode_store;
mod resolver;
mod resume;
mod scheduler;

pub use hydration::*;
pub use mode_store::*;
pub use resolver::*;
pub use resume::*;
pub use scheduler::*;
