//! Application services: the sync, purge and seed engines and their jobs.

pub mod clock;
pub mod error;
pub mod jobs;
pub mod purge;
pub mod repos;
pub mod seed;
pub mod sync;
