pub mod logs;
pub mod tunnel;
