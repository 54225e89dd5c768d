//! Infrastructure: database and in-process eventing

pub mod database;
pub mod events;
