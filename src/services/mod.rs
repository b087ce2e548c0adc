// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Business logic services.

pub mod credentials;
pub mod strava;
pub mod sync;

pub use credentials::{CredentialManager, CredentialStore, StravaSession};
pub use strava::StravaClient;
pub use sync::{SyncReport, SyncService};
