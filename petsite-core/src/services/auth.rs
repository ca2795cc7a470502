//! Auth service - account flows on top of the identity provider
//!
//! Provider failures are turned into user-facing messages per flow; the same
//! provider code can read differently on the sign-up and sign-in forms.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::{Identity, NewProfile};
use crate::ports::{AuthError, IdentityProvider};
use crate::services::ProfileService;

/// Shown after a reset request whether or not the account exists
pub const PASSWORD_RESET_SENT: &str =
    "If your account is registered, a password reset link has been sent to your email.";

const NETWORK_MESSAGE: &str = "Network error. Please check your connection and try again.";

/// The form a provider error was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlow {
    SignUp,
    SignIn,
    SignOut,
    PasswordReset,
    EmailVerification,
}

/// User-facing message for a provider error raised during `flow`
///
/// Codes without a mapping for the flow keep the provider's own message.
pub fn user_message(flow: AuthFlow, err: &AuthError) -> String {
    let mapped = match (flow, err) {
        (_, AuthError::Network(_)) => Some(NETWORK_MESSAGE.to_string()),

        (AuthFlow::SignUp, AuthError::EmailAlreadyInUse) => {
            Some("This email is already in use.".to_string())
        }
        (AuthFlow::SignUp, AuthError::InvalidEmail) => {
            Some("Please enter a valid email address.".to_string())
        }
        (AuthFlow::SignUp, AuthError::OperationNotAllowed) => {
            Some("Email/password accounts are not enabled.".to_string())
        }
        (AuthFlow::SignUp, AuthError::WeakPassword { min_length }) => Some(format!(
            "Password is too weak. It should be at least {} characters.",
            min_length
        )),

        (AuthFlow::SignIn, AuthError::UserNotFound | AuthError::WrongPassword) => {
            Some("Invalid email or password.".to_string())
        }
        (AuthFlow::SignIn, AuthError::InvalidEmail) => {
            Some("Please enter a valid email address.".to_string())
        }
        (AuthFlow::SignIn, AuthError::UserDisabled) => {
            Some("Your account has been disabled.".to_string())
        }

        (AuthFlow::PasswordReset, AuthError::InvalidEmail) => {
            Some("The email address is not valid.".to_string())
        }
        (AuthFlow::PasswordReset, AuthError::UserNotFound) => {
            Some("No account found with that email address.".to_string())
        }

        _ => None,
    };
    mapped.unwrap_or_else(|| err.to_string())
}

fn auth_error(flow: AuthFlow, err: AuthError) -> Error {
    Error::Auth {
        code: err.code().to_string(),
        message: user_message(flow, &err),
    }
}

/// Sign-up form input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Service for account flows
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<ProfileService>,
}

impl AuthService {
    pub fn new(provider: Arc<dyn IdentityProvider>, profiles: Arc<ProfileService>) -> Self {
        Self { provider, profiles }
    }

    /// Register an identity and write its profile document
    ///
    /// If the profile write fails the identity stays registered and signed
    /// in; the session falls back to provider fields until a profile exists.
    pub async fn sign_up(&self, form: SignUpForm) -> Result<Identity> {
        let username = form.username.trim();
        if username.is_empty() {
            return Err(Error::validation("Please choose a username."));
        }

        let identity = self
            .provider
            .register(&form.email, &form.password)
            .await
            .map_err(|e| auth_error(AuthFlow::SignUp, e))?;

        self.profiles
            .create_profile(&identity.id, NewProfile::new(username, identity.email.clone()))
            .await?;
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.provider
            .sign_in(email, password)
            .await
            .map_err(|e| auth_error(AuthFlow::SignIn, e))
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.provider
            .sign_out()
            .await
            .map_err(|e| auth_error(AuthFlow::SignOut, e))
    }

    /// Send a reset code; returns the confirmation to show the user
    pub async fn request_password_reset(&self, email: &str) -> Result<&'static str> {
        if email.trim().is_empty() {
            return Err(Error::validation("Please enter your email to reset password."));
        }
        self.provider
            .send_password_reset(email)
            .await
            .map_err(|e| auth_error(AuthFlow::PasswordReset, e))?;
        Ok(PASSWORD_RESET_SENT)
    }

    pub async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<()> {
        self.provider
            .confirm_password_reset(code, new_password)
            .await
            .map_err(|e| auth_error(AuthFlow::PasswordReset, e))
    }

    pub async fn send_email_verification(&self, identity: &Identity) -> Result<()> {
        self.provider
            .send_email_verification(identity)
            .await
            .map_err(|e| auth_error(AuthFlow::EmailVerification, e))
    }

    pub async fn verify_email(&self, code: &str) -> Result<Identity> {
        self.provider
            .verify_email(code)
            .await
            .map_err(|e| auth_error(AuthFlow::EmailVerification, e))
    }
}
