pub mod alerts;
pub mod health;
pub mod nodes;
pub mod scheduler;
