pub mod project;
pub mod queue;
