pub mod alerts;
pub mod scheduler;
pub mod store;
