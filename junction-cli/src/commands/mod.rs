pub mod delta;
pub mod status;
