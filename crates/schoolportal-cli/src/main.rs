//! schoolportal - command-line front end for the school portal session core.
//!
//! Drives the same `SessionController` the mobile screens use: OTP login,
//! role selection, logout and account-linkage routing.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use schoolportal_core::{
    Config, LoginOutcome, NavigationTarget, SessionController, SessionState, UserRole,
};

// ============================================================================
// Constants
// ============================================================================

/// Log file name in the data directory
const LOG_FILE: &str = "schoolportal.log";

#[derive(Parser)]
#[command(name = "schoolportal", version, about = "School portal session client")]
struct Cli {
    /// Backend base URL (overrides config and SCHOOLPORTAL_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current session
    Status,
    /// Sign in with a one-time password sent to PHONE
    Login { phone: String },
    /// Choose the dashboard role: parent, teacher or none
    Role { role: String },
    /// Resolve where USER_ID should land after login
    Route { user_id: i64 },
    /// Check the stored token with the server
    Revalidate,
    /// Mark onboarding as completed
    Onboard,
    /// Sign out (the chosen role is kept)
    Logout,
}

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr and, when the data directory is available, to a file.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config
        .data_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    let _log_guard = init_tracing(&config);
    info!(api = %config.api_base_url, "schoolportal starting");

    let store = config.open_credential_store()?;
    let controller = Arc::new(
        SessionController::from_config(&config, store).context("Failed to build API client")?,
    );
    controller.load_state();

    match cli.command {
        Command::Status => print_status(&controller.state(), &controller),
        Command::Login { phone } => login(&controller, &phone).await?,
        Command::Role { role } => {
            let role = parse_role_arg(&role)?;
            controller.set_user_role(role)?;
            println!("Role set to {}", role.map(|r| r.as_str()).unwrap_or("none"));
        }
        Command::Route { user_id } => {
            route(&controller, user_id).await?;
        }
        Command::Revalidate => {
            if controller.revalidate().await? {
                println!("Session is valid.");
            } else {
                println!("Session is not valid. Please log in again.");
            }
        }
        Command::Onboard => {
            controller.complete_onboarding()?;
            println!("Onboarding completed.");
        }
        Command::Logout => {
            controller.logout()?;
            println!("Logged out.");
        }
    }

    Ok(())
}

async fn login(controller: &SessionController, phone: &str) -> Result<()> {
    println!("Sending OTP to {}...", phone);
    match controller.login(phone).await? {
        LoginOutcome::OtpSent { .. } => {}
        LoginOutcome::Failed => {
            return Err(anyhow::anyhow!(auth_error(controller)));
        }
    }

    // The request id only lives in this process, so verify right away
    let otp = rpassword::prompt_password("OTP: ")?;
    if !controller.verify_otp(&otp).await? {
        return Err(anyhow::anyhow!(auth_error(controller)));
    }
    println!("Login successful!");

    match controller.stored_user() {
        Some(user) => {
            println!("Welcome, {}.", user.display_name());
            route(controller, user.id).await?;
        }
        None => println!("No profile returned; run `schoolportal route <user-id>` to continue."),
    }
    Ok(())
}

/// Resolve the landing screen and apply the role it implies
async fn route(controller: &SessionController, user_id: i64) -> Result<()> {
    let target = controller.profile_navigation_target(user_id).await;
    match target {
        NavigationTarget::Parent => controller.set_user_role(Some(UserRole::Parent))?,
        NavigationTarget::Teacher => controller.set_user_role(Some(UserRole::Teacher))?,
        NavigationTarget::RoleSelect => {
            let role = prompt_role()?;
            controller.set_user_role(Some(role))?;
        }
        NavigationTarget::Stay => {
            if let Some(alert) = controller.state().alert {
                eprintln!("{}: {}", alert.title, alert.message);
                controller.dismiss_alert();
            }
            // No valid destination: back to login
            controller.logout()?;
            return Err(anyhow::anyhow!("Unable to continue with this account"));
        }
    }
    let role = controller.state().user_role.map(|r| r.as_str());
    println!("Opening the {} dashboard.", role.unwrap_or(target.route()));
    Ok(())
}

fn prompt_role() -> Result<UserRole> {
    loop {
        print!("This account has students and schools. Continue as [p]arent or [t]eacher? ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        match input.trim().to_lowercase().as_str() {
            "p" | "parent" => return Ok(UserRole::Parent),
            "t" | "teacher" => return Ok(UserRole::Teacher),
            _ => println!("Please answer p or t."),
        }
    }
}

fn parse_role_arg(arg: &str) -> Result<Option<UserRole>> {
    if arg.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    arg.parse::<UserRole>().map(Some).map_err(|e| anyhow::anyhow!(e))
}

/// Take the controller's error message, leaving the session error-free
fn auth_error(controller: &SessionController) -> String {
    let message = controller
        .state()
        .auth_error
        .unwrap_or_else(|| "Authentication failed".to_string());
    controller.clear_error();
    message
}

fn print_status(state: &SessionState, controller: &SessionController) {
    println!("Signed in:   {}", if state.is_authenticated() { "yes" } else { "no" });
    println!("Phone:       {}", state.phone_number.as_deref().unwrap_or("-"));
    println!("Role:        {}", state.user_role.map(|r| r.as_str()).unwrap_or("-"));
    println!("Device:      {}", state.device_id.as_deref().unwrap_or("-"));
    println!("Onboarded:   {}", if state.has_completed_onboarding { "yes" } else { "no" });
    if let Some(user) = controller.stored_user() {
        println!("User:        {} (id {})", user.display_name(), user.id);
    }
}
