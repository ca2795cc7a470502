//! Routes and the session gate in front of them

use std::fmt;

use serde::Serialize;

use crate::domain::SessionView;

/// A page of the site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", content = "user_id", rename_all = "snake_case")]
pub enum Route {
    Home,
    SignIn,
    SignUp,
    UserHome,
    CreatePet,
    /// Public profile page; writes allowed only for the owner
    Profile(String),
}

impl Route {
    /// Resolve a path; anything unrecognized lands on home
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [] => Route::Home,
            ["signin"] => Route::SignIn,
            ["signup"] => Route::SignUp,
            ["userhome"] => Route::UserHome,
            ["create-pet"] => Route::CreatePet,
            ["profile", user_id] => Route::Profile(user_id.to_string()),
            _ => Route::Home,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::SignIn => "/signin".to_string(),
            Route::SignUp => "/signup".to_string(),
            Route::UserHome => "/userhome".to_string(),
            Route::CreatePet => "/create-pet".to_string(),
            Route::Profile(user_id) => format!("/profile/{}", user_id),
        }
    }

    /// Routes that render only for a signed-in user
    pub fn requires_session(&self) -> bool {
        matches!(self, Route::UserHome | Route::CreatePet)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outcome of the session gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Session still resolving; render nothing user-specific yet
    Pending,
    Allow,
    Redirect(Route),
}

/// Decide whether `route` may render for `view`
pub fn guard(route: &Route, view: &SessionView) -> Access {
    if !route.requires_session() {
        return Access::Allow;
    }
    if view.loading {
        return Access::Pending;
    }
    if view.user.is_none() {
        return Access::Redirect(Route::SignIn);
    }
    Access::Allow
}

/// Whether the viewer may modify what `route` shows
pub fn can_write(route: &Route, view: &SessionView) -> bool {
    match route {
        Route::Profile(user_id) => !view.loading && view.uid() == Some(user_id.as_str()),
        other => guard(other, view) == Access::Allow && view.is_signed_in(),
    }
}
