//! The admission orchestrator and its collaborators.
//!
//! - [`validator`] – decides whether a request is an acceptable upgrade.
//! - [`events`] – notifications delivered to consumers of the server.
//! - [`orchestrator`] – [`Server`], which wires validation, resolution,
//!   lifecycle handling and the registry together.

pub mod events;
pub mod orchestrator;
pub mod validator;

pub use events::{Notifier, ServerEvent};
pub use orchestrator::{Phase, Server, UpgradeOutcome};
pub use validator::RequestValidator;
