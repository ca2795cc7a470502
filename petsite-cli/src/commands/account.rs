//! Account commands - sign up, sign in/out, password reset, email verification

use anyhow::Result;
use clap::Subcommand;
use dialoguer::{Input, Password};
use petsite_core::services::{LogEvent, Route, SignUpForm};
use petsite_core::{Error, PetsiteContext};

use super::{get_context, get_logger, log_event, open_page};
use crate::output;

#[derive(Subcommand)]
pub enum ResetPasswordCommands {
    /// Email a reset code
    Request {
        /// Account email (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
    },
    /// Set a new password with a reset code
    Confirm {
        /// Code from the reset email
        code: String,
        /// New password (prompted if omitted)
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum VerifyEmailCommands {
    /// Email a verification code to the signed-in account
    Send,
    /// Mark the email verified with a code
    Confirm {
        /// Code from the verification email
        code: String,
    },
}

fn prompt_text(value: Option<String>, prompt: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => Ok(Input::<String>::new().with_prompt(prompt).interact_text()?),
    }
}

fn prompt_password(value: Option<String>, confirm: bool) -> Result<String> {
    if let Some(v) = value {
        return Ok(v);
    }
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(prompt.interact()?)
}

/// Record a failed auth flow without any account details
fn log_auth_failure(event: &str, err: &Error) {
    let mut log = LogEvent::new(event).with_error(err.to_string());
    if let Error::Auth { code, .. } = err {
        log = log.with_error_code(code.clone());
    }
    log_event(&get_logger(), log);
}

/// Land on the user home page after a successful sign-in or sign-up
async fn show_user_home(ctx: &PetsiteContext) -> Result<()> {
    let page = open_page(ctx, Route::UserHome).await?;
    output::print_user_home(&page.view);
    page.close().await;
    Ok(())
}

pub async fn signup(
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let ctx = get_context()?;
    let form = SignUpForm {
        username: prompt_text(username, "Username")?,
        email: prompt_text(email, "Email")?,
        password: prompt_password(password, true)?,
    };

    if let Err(e) = ctx.auth_service.sign_up(form).await {
        log_auth_failure("sign_up_failed", &e);
        return Err(e.into());
    }
    log_event(&get_logger(), LogEvent::new("signed_up"));

    output::success("Account created.");
    show_user_home(&ctx).await
}

pub async fn signin(email: Option<String>, password: Option<String>) -> Result<()> {
    let ctx = get_context()?;
    let email = prompt_text(email, "Email")?;
    let password = prompt_password(password, false)?;

    if let Err(e) = ctx.auth_service.sign_in(&email, &password).await {
        log_auth_failure("sign_in_failed", &e);
        return Err(e.into());
    }
    log_event(&get_logger(), LogEvent::new("signed_in"));

    show_user_home(&ctx).await
}

pub async fn signout() -> Result<()> {
    let ctx = get_context()?;
    ctx.auth_service.sign_out().await?;
    log_event(&get_logger(), LogEvent::new("signed_out"));
    output::success("Signed out.");
    Ok(())
}

pub async fn reset_password(command: ResetPasswordCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        ResetPasswordCommands::Request { email } => {
            let email = prompt_text(email, "Email")?;
            match ctx.auth_service.request_password_reset(&email).await {
                Ok(message) => output::success(message),
                Err(e) => {
                    log_auth_failure("password_reset_failed", &e);
                    return Err(e.into());
                }
            }
        }
        ResetPasswordCommands::Confirm { code, password } => {
            let password = prompt_password(password, true)?;
            if let Err(e) = ctx.auth_service.confirm_password_reset(&code, &password).await {
                log_auth_failure("password_reset_failed", &e);
                return Err(e.into());
            }
            output::success("Password updated. Sign in with your new password.");
        }
    }
    Ok(())
}

pub async fn verify_email(command: VerifyEmailCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        VerifyEmailCommands::Send => {
            let page = open_page(&ctx, Route::UserHome).await?;
            let identity = page.view.user.as_ref().map(|u| u.identity.clone());
            page.close().await;

            let Some(identity) = identity else {
                anyhow::bail!("You need to sign in first.");
            };
            if identity.email_verified {
                output::info("Your email is already verified.");
                return Ok(());
            }
            ctx.auth_service.send_email_verification(&identity).await?;
            output::success(&format!("Verification email sent to {}.", identity.email));
        }
        VerifyEmailCommands::Confirm { code } => {
            let identity = ctx.auth_service.verify_email(&code).await?;
            output::success(&format!("{} is now verified.", identity.email));
        }
    }
    Ok(())
}
