//! Launch-time decision of which screen the app opens on.
//!
//! Runs once per process start and hands the resulting route to the
//! navigation layer. It only checks whether a user profile is stored; full
//! validation is left to `SessionManager`.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::store::{SessionStore, StoreError, HAS_LAUNCHED_KEY, USER_SESSION_KEY};

const HAS_LAUNCHED_VALUE: &str = "true";

/// Initial screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Route {
    Welcome,
    Login,
    Dashboard,
}

impl Route {
    /// Route name as registered with the navigation layer
    pub fn name(&self) -> &'static str {
        match self {
            Route::Welcome => "Welcome",
            Route::Login => "Login",
            Route::Dashboard => "Dashboard",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flags persisted across launches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredFlags {
    pub has_launched: bool,
}

impl StoredFlags {
    pub async fn load(store: &dyn SessionStore) -> Result<Self, StoreError> {
        Ok(Self {
            has_launched: store.get(HAS_LAUNCHED_KEY).await?.is_some(),
        })
    }

    /// Record the first launch. The flag is never removed afterwards.
    pub async fn mark_launched(store: &dyn SessionStore) -> Result<(), StoreError> {
        store.set(HAS_LAUNCHED_KEY, HAS_LAUNCHED_VALUE).await
    }
}

/// Pick the initial route. Storage faults fall back to `Welcome`.
pub async fn resolve_initial_route(store: &dyn SessionStore) -> Route {
    match decide(store).await {
        Ok(route) => {
            info!(route = %route, "Initial route resolved");
            route
        }
        Err(e) => {
            error!(error = %e, "Storage error during launch, falling back to Welcome");
            Route::Welcome
        }
    }
}

async fn decide(store: &dyn SessionStore) -> Result<Route, StoreError> {
    let flags = StoredFlags::load(store).await?;
    if !flags.has_launched {
        debug!("First launch");
        StoredFlags::mark_launched(store).await?;
        return Ok(Route::Welcome);
    }

    if store.get(USER_SESSION_KEY).await?.is_some() {
        Ok(Route::Dashboard)
    } else {
        Ok(Route::Login)
    }
}
