pub mod core;
pub mod results;
pub mod scores;
pub mod setup;
pub mod students;
