//! Core library for `stackadm`.
//!
//! Contains the setup step definitions, the persisted setup state and its
//! transitions, the step runner, and the single-writer worker that owns all
//! state changes inside the server. Around that sit the maintenance services
//! the console exposes after setup: backups, container control, component
//! versions, and identity-provider users. Every piece of real work is an
//! external command behind the [`command::CommandRunner`] trait.

pub mod autostart;
pub mod backup;
pub mod command;
pub mod containers;
pub mod env;
pub mod error;
pub mod keycloak;
pub mod layout;
pub mod runner;
pub mod setup_log;
pub mod state;
pub mod step;
pub mod versions;
pub mod view;
pub mod worker;
