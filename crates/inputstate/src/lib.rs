//! # INPUTSTATE
//!
//! Device management on top of [`inputstate_core`]:
//! - Device registration and removal with state migration
//! - Per-update buffer flipping driven by update counters
//! - State events written into every play mode's current buffer
//! - Default-state and noise-mask initialisation
//!
//! ## Example
//!
//! ```rust,ignore
//! use inputstate::{StateConfig, StateManager};
//! use inputstate_core::UpdateMode;
//!
//! let config = StateConfig::load("inputstate.toml")?;
//! let mut manager = StateManager::new(config);
//! let pad = manager.add_device(gamepad)?;
//!
//! manager.begin_update(UpdateMode::Dynamic)?;
//! manager.apply_state_event(pad, 0, &report)?;
//! if manager.has_significant_change(pad)? {
//!     let x = manager.read_control_float(pad, "stick/x")?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod manager;

pub use config::StateConfig;
pub use error::{ManagerError, ManagerResult};
pub use manager::StateManager;
