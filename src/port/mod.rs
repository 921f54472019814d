//! Ports: the seams between the workflow and its collaborators

pub mod directory;
pub mod notify;
pub mod store;
