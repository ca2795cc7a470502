//! Petsite CLI - the virtual pet site in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use petsite_core::config::Config;
use petsite_core::domain::Gender;
use petsite_core::services::LogEvent;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{account, doctor, logs, outbox, pets};

/// Petsite - adopt, feature and show off virtual pets
#[derive(Parser)]
#[command(name = "petsite", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Prompted (with confirmation) if omitted
        #[arg(long, env = "PETSITE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in with email and password
    Signin {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, env = "PETSITE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out of the current session
    Signout,

    /// Show your home page (requires sign-in)
    Home {
        /// Output the session view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Adopt a new pet (requires sign-in)
    CreatePet {
        /// Pet name
        name: String,
        /// male, female or other
        #[arg(long, default_value = "male")]
        gender: Gender,
    },

    /// Show a profile page (yours if no user ID is given)
    Profile {
        user_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Feature one of your pets (running it again un-features it)
    Feature {
        pet_name: String,
    },

    /// Change your username or profile picture
    EditProfile {
        #[arg(long)]
        username: Option<String>,
        /// http(s) URL of the picture
        #[arg(long, conflicts_with = "clear_image")]
        image: Option<String>,
        /// Remove the profile picture
        #[arg(long)]
        clear_image: bool,
    },

    /// Reset a forgotten password
    ResetPassword {
        #[command(subcommand)]
        command: account::ResetPasswordCommands,
    },

    /// Verify your email address
    VerifyEmail {
        #[command(subcommand)]
        command: account::VerifyEmailCommands,
    },

    /// Show emails sent by the site
    Outbox {
        /// Number of messages to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run data health checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Signup { .. } => "signup",
            Commands::Signin { .. } => "signin",
            Commands::Signout => "signout",
            Commands::Home { .. } => "home",
            Commands::CreatePet { .. } => "create-pet",
            Commands::Profile { .. } => "profile",
            Commands::Feature { .. } => "feature",
            Commands::EditProfile { .. } => "edit-profile",
            Commands::ResetPassword { .. } => "reset-password",
            Commands::VerifyEmail { .. } => "verify-email",
            Commands::Outbox { .. } => "outbox",
            Commands::Doctor { .. } => "doctor",
            Commands::Logs { .. } => "logs",
        }
    }
}

/// Diagnostics go to stderr, filtered by `app.logFilter` or `PETSITE_LOG`
fn init_tracing() {
    let filter = Config::load(&commands::get_petsite_dir())
        .map(|c| c.log_filter)
        .unwrap_or_else(|_| "warn".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    // The log database is opened per event; a held connection would lock
    // `petsite logs` out of the same file
    let name = cli.command.name();
    tracing::debug!(command = name, "running command");
    commands::log_event(
        &commands::get_logger(),
        LogEvent::new("command_executed").with_command(name),
    );

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            commands::log_event(
                &commands::get_logger(),
                LogEvent::new("command_failed")
                    .with_command(name)
                    .with_error(e.to_string()),
            );
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Run a command; `Ok(false)` exits non-zero without an error message
async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Signup {
            username,
            email,
            password,
        } => account::signup(username, email, password).await?,
        Commands::Signin { email, password } => account::signin(email, password).await?,
        Commands::Signout => account::signout().await?,
        Commands::Home { json } => pets::home(json).await?,
        Commands::CreatePet { name, gender } => pets::create_pet(name, gender).await?,
        Commands::Profile { user_id, json } => pets::profile(user_id, json).await?,
        Commands::Feature { pet_name } => pets::feature(pet_name).await?,
        Commands::EditProfile {
            username,
            image,
            clear_image,
        } => pets::edit_profile(username, image, clear_image).await?,
        Commands::ResetPassword { command } => account::reset_password(command).await?,
        Commands::VerifyEmail { command } => account::verify_email(command).await?,
        Commands::Outbox { limit, json } => outbox::run(limit, json)?,
        Commands::Doctor { verbose, json } => return doctor::run(verbose, json),
        Commands::Logs { command } => logs::run(command)?,
    }
    Ok(true)
}
