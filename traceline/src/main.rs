#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use serde::Serialize;
use std::process;
use std::sync::Arc;
use tracery::forms::{LoginForm, SignUpForm};
use tracery::guard::{GuardPolicy, GuardState, NavigationLog, UNAUTHORIZED_LANDING};
use tracery::storage::FileStore;
use tracery::{extract_message, AuthorizedTransport, ErrorPayload, Session};
use traceryconfig::{prompt, TraceryConfig};
use tracing_subscriber::{fmt, EnvFilter};
mod format;

#[derive(Parser)]
#[command(name = "traceline", about = "A CLI for Tracery")]
struct Cli {
    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the access token
    Login {
        /// Nickname or email; defaults to `login.user` from the config
        #[arg(long)]
        user: Option<String>,
    },
    /// Create an account, then log in with it
    Signup {
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// Show who is logged in
    Whoami,
    /// Show your profile, friends and events
    Profile,
    /// Show another user
    User {
        /// User id
        id: i64,
    },
    /// Show an event with its participants
    Event {
        /// Event id
        id: i64,
    },
    /// Search users, split into friends and potential friends
    Users {
        /// Free-text filter
        #[arg(default_value = "")]
        search: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Search events
    Events {
        /// Free-text filter
        #[arg(default_value = "")]
        search: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Manage friends
    Friend {
        #[command(subcommand)]
        action: FriendAction,
    },
    /// Join an event
    Join {
        /// Event id
        id: i64,
    },
    /// Leave an event
    Leave {
        /// Event id
        id: i64,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum FriendAction {
    /// Add a user to your friends
    Add {
        /// User id
        id: i64,
    },
    /// Remove a user from your friends
    Remove {
        /// User id
        id: i64,
    },
}

impl Command {
    /// Access rule for the command, `None` for commands that run regardless.
    const fn policy(&self) -> Option<GuardPolicy> {
        match self {
            Self::Login { .. } | Self::Signup { .. } => Some(GuardPolicy::UNAUTHORIZED),
            Self::Logout | Self::Completions { .. } => None,
            _ => Some(GuardPolicy::AUTHORIZED),
        }
    }
}

/// The command that plays the role of a landing route.
fn landing_command(route: &str) -> &'static str {
    match route {
        UNAUTHORIZED_LANDING => "login",
        _ => "profile",
    }
}

fn redirect_hint(target: &str) -> String {
    match target {
        UNAUTHORIZED_LANDING => format!(
            "Not logged in. Run `traceline {}` first.",
            landing_command(target)
        ),
        _ => format!(
            "Already logged in. Run `traceline {}` to see your account or `traceline logout` to switch.",
            landing_command(target)
        ),
    }
}

#[derive(Serialize)]
struct Whoami<'a> {
    nickname: &'a str,
    email: &'a str,
    base_url: &'a str,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_session(config: &TraceryConfig) -> Result<Session> {
    tracing::debug!(base_url = %config.base_url, "opening session");
    let transport = AuthorizedTransport::new(config.base_url.as_str(), config.timeout())
        .with_context(|| "Failed to build HTTP client")?;
    let state_dir = config
        .state_dir()
        .with_context(|| "Failed to locate tracery state directory")?;
    let session = Session::open(Arc::new(transport), Arc::new(FileStore::new(state_dir)))
        .with_context(|| "Failed to load stored credential")?;
    Ok(session.with_search_debounce(config.search_debounce()))
}

/// Mounts a guard for the command; fails with a hint if it redirects.
fn enforce(session: &Session, policy: GuardPolicy) -> Result<()> {
    let log = Arc::new(NavigationLog::new());
    let guard = session.guard(policy, log);
    let state = guard.state();
    guard.unmount(session.credentials());
    match state {
        GuardState::Allowed => Ok(()),
        GuardState::Redirecting { target } => Err(anyhow::anyhow!(redirect_hint(&target))),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).with_context(|| "Failed to encode JSON")?
    );
    Ok(())
}

fn handle_error(err: &anyhow::Error) -> ! {
    if let Some(payload) = err.downcast_ref::<ErrorPayload>() {
        eprintln!(
            "{} {}",
            format!("{} ({}):", payload.error, payload.status_code).red(),
            extract_message(payload)
        );
        process::exit(1);
    }

    eprintln!("{err:#}");
    process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        handle_error(&err);
    }

    Ok(())
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "traceline", &mut std::io::stdout());
        return Ok(());
    }

    let config = TraceryConfig::load().with_context(|| "Failed to load tracery config")?;
    if !config.display.color {
        colored::control::set_override(false);
    }
    let limit = config.display.page_size;
    let session = open_session(&config)?;
    if let Some(policy) = cli.command.policy() {
        enforce(&session, policy)?;
    }

    match cli.command {
        Command::Completions { .. } => {}
        Command::Login { user } => {
            let login = match user {
                Some(user) => user,
                None => config.login_user()?,
            };
            let form = LoginForm {
                login,
                password: config.password()?,
            };
            session.login(&form.submit()?).await?;
            println!("Logged in as {}.", form.login.trim().bold());
        }
        Command::Signup {
            nickname,
            first_name,
            last_name,
            email,
        } => {
            let form = SignUpForm {
                nickname: value_or_prompt(nickname, "nickname", "Nickname: ")?,
                first_name: value_or_prompt(first_name, "first name", "First name: ")?,
                last_name: value_or_prompt(last_name, "last name", "Last name: ")?,
                email: value_or_prompt(email, "email", "Email: ")?,
                password: prompt("password", "Password: ")?,
                repeat_password: prompt("password", "Repeat password: ")?,
            };
            let request = form.submit()?;
            session.sign_up_and_login(&request).await?;
            println!("Signed up and logged in as {}.", request.nickname.bold());
        }
        Command::Logout => {
            let was_logged_in = session.is_logged_in();
            session.logout()?;
            if was_logged_in {
                println!("Logged out.");
            }
        }
        Command::Whoami => {
            let profile = session.profile().await?;
            if cli.json {
                print_json(&Whoami {
                    nickname: &profile.nickname,
                    email: &profile.email,
                    base_url: session.client().transport().base_url(),
                })?;
            } else {
                println!("{}", profile.nickname);
            }
        }
        Command::Profile => {
            let profile = session.profile().await?;
            if cli.json {
                print_json(&*profile)?;
            } else {
                print!("{}", format::profile(&profile, limit));
            }
        }
        Command::User { id } => {
            let user = session.user(id).await?;
            if cli.json {
                print_json(&*user)?;
            } else {
                let profile = session.profile().await?;
                print!("{}", format::user(&user, profile.is_friend(id), limit));
            }
        }
        Command::Event { id } => {
            let event = session.event(id).await?;
            if cli.json {
                print_json(&*event)?;
            } else {
                let profile = session.profile().await?;
                print!("{}", format::event(&event, profile.has_joined(id), limit));
            }
        }
        Command::Users { search, page } => {
            let users = session.search_users(page, &search).await?;
            if cli.json {
                print_json(&*users)?;
            } else {
                let profile = session.profile().await?;
                print!("{}", format::user_search(&profile, &users, limit));
            }
        }
        Command::Events { search, page } => {
            let events = session.search_events(page, &search).await?;
            if cli.json {
                print_json(&*events)?;
            } else {
                let profile = session.profile().await?;
                print!("{}", format::event_search(&profile, &events, limit));
            }
        }
        Command::Friend { action } => {
            let response = match action {
                FriendAction::Add { id } => session.add_friend(id).await?,
                FriendAction::Remove { id } => session.remove_friend(id).await?,
            };
            println!("{}", response.message);
        }
        Command::Join { id } => {
            let response = session.add_event(id).await?;
            println!("{}", response.message);
        }
        Command::Leave { id } => {
            let response = session.remove_event(id).await?;
            println!("{}", response.message);
        }
    }

    Ok(())
}

fn value_or_prompt(value: Option<String>, field: &'static str, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => Ok(prompt(field, label)?),
    }
}
