// SPDX-License-Identifier: MPL-2.0

mod auth;
pub mod settings;
mod visited;

pub use auth::{AuthState, User};
pub use settings::{Backend, Settings, SettingsError};
pub use visited::{VisitedError, VisitedEvent, VisitedOverlay};
