pub mod alerts;
pub mod errors;
pub mod generate;
pub mod health;
pub mod segments;
pub mod usage;
