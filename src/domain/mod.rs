//! Workflow domain: entities, state machines and error taxonomy

pub mod auth;
pub mod constant;
pub mod error;
pub mod event;
pub mod opinion;
pub mod position;
pub mod process;
pub mod tramitacao;
