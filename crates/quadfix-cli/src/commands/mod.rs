pub mod analyze;
pub mod cleanup;
pub mod fix;
