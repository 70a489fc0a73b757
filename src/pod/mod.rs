pub mod lifecycle;
pub mod spec;
