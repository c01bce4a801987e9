pub mod conflict;
pub mod guideway;
