pub mod result;
pub mod skill;
pub mod types;
