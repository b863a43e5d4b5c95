use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gymdesk::backend::rest::RestClient;
use gymdesk::backend::{AuthBackend, BackendError, HostedBackend};
use gymdesk::config::{AppConfig, ConfigError};
use gymdesk::db;
use gymdesk::error::AuthError;
use gymdesk::guard::{GuardDecision, HistoryNavigator, Route};
use gymdesk::gyms::{GymOwner, GymRepository, GymUpdate, HostedGymRepository, PgGymRepository};
use gymdesk::members::{HostedMemberRepository, list_members};
use gymdesk::notify::{Notification, ToastTray, Variant};
use gymdesk::services::provisioning::ProvisionError;
use gymdesk::state::AppState;
use gymdesk::storage::{FileStore, LocalStore, StorageError};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

const TRAY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("local storage: {0}")]
    Storage(#[from] StorageError),
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("gym: {0}")]
    Provision(#[from] ProvisionError),
    #[error("database init failed: {0}")]
    Db(#[from] sqlx::Error),
    #[error("not signed in; run `gymdesk signin` first")]
    NotSignedIn,
    #[error("no gym exists for this account; run `gymdesk gym` first")]
    NoGym,
    #[error("output encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("signal handling failed: {0}")]
    Signal(std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "gymdesk", about = "Gym account and session management")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and its gym.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "GYMDESK_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = gymdesk::services::provisioning::DEFAULT_GYM_NAME)]
        gym_name: String,
    },
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "GYMDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signout,
    /// Send a password-reset email.
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    UpdatePassword {
        #[arg(long, env = "GYMDESK_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show auth state and the route guard's decision for a path.
    Status {
        #[arg(default_value = "/dashboard")]
        path: String,
    },
    /// Ensure the signed-in account has a gym, optionally updating it.
    Gym {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        company_name: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// List the gym's members.
    Members,
    /// Check the connection now and repair it if possible.
    Refresh,
    /// Show or advance onboarding progress.
    Onboarding {
        #[command(subcommand)]
        step: Option<OnboardingStep>,
    },
    /// Run the health-check and token-refresh timers until Ctrl-C.
    Watch,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum OnboardingStep {
    Next,
    Previous,
    Complete,
    Skip,
    Tutorial,
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let app = build_state(&config).await?;

    let mut notes = app.notifier.subscribe();
    let mut subscription = app.mount();
    subscription.initial_fetch_done().await;

    let mut tray = ToastTray::new(app.timings.toast_duration);
    let result = run(&app, cli.command, &mut notes, &mut tray).await;
    if tray.drain(&mut notes) > 0 {
        render_tray(&mut tray);
    }
    subscription.unsubscribe();
    result
}

async fn build_state(config: &AppConfig) -> Result<AppState, CliError> {
    let storage: Arc<dyn LocalStore> = Arc::new(FileStore::open(&config.data_dir)?);
    let backend: Arc<dyn AuthBackend> = Arc::new(HostedBackend::new(&config.backend, Arc::clone(&storage))?);
    let rest = Arc::new(RestClient::new(&config.backend, Arc::clone(&backend))?);

    let gyms: Arc<dyn GymRepository> = match &config.database_url {
        Some(url) => Arc::new(PgGymRepository::new(db::init_pool(url, config.db_max_connections).await?)),
        None => Arc::new(HostedGymRepository::new(Arc::clone(&rest))),
    };
    let members = Arc::new(HostedMemberRepository::new(rest));
    let navigator = Arc::new(HistoryNavigator::default());

    Ok(AppState::new(backend, gyms, members, storage, navigator, config.timings, &config.site_url))
}

async fn run(
    app: &AppState,
    command: Command,
    notes: &mut broadcast::Receiver<Notification>,
    tray: &mut ToastTray,
) -> Result<(), CliError> {
    let auth = app.auth();
    match command {
        Command::Signup { email, password, gym_name } => {
            let outcome = auth.sign_up(&email, &password, &gym_name).await?;
            println!("signed up as {}", outcome.session.user.email);
            if let Some(gym) = outcome.gym {
                println!("gym: {} ({})", gym.name, gym.id);
            }
        }
        Command::Signin { email, password } => {
            let session = auth.sign_in(&email, &password).await?;
            println!("signed in as {}", session.user.email);
        }
        Command::Signout => auth.sign_out().await,
        Command::ResetPassword { email } => auth.reset_password(&email).await?,
        Command::UpdatePassword { password } => {
            auth.update_password(&password).await?;
        }
        Command::Status { path } => run_status(app, &path),
        Command::Gym { name, phone, company_name, address } => {
            let update = GymUpdate { name: None, phone, company_name, address, owner_id: None };
            run_gym(app, name.as_deref(), &update).await?;
        }
        Command::Members => run_members(app).await?,
        Command::Refresh => {
            let outcome = auth.refresh_authentication().await;
            println!("success: {}, recovered: {}", outcome.success, outcome.recovered);
        }
        Command::Onboarding { step } => run_onboarding(app, step)?,
        Command::Watch => run_watch(app, notes, tray).await?,
    }
    println!("route: {}", app.navigator.current());
    Ok(())
}

fn signed_in_user(app: &AppState) -> Result<gymdesk::backend::User, CliError> {
    app.store.snapshot().user.ok_or(CliError::NotSignedIn)
}

fn run_status(app: &AppState, path: &str) {
    app.navigator.navigate(Route::parse(path));
    let decision = app.guard();
    let state = app.store.snapshot();
    println!("status: {:?}", state.status);
    println!("initialized: {}", state.is_initialized);
    if let Some(user) = &state.user {
        println!("user: {} ({})", user.email, user.id);
    }
    if let Some(error) = &state.error {
        println!("error: {:?}: {}", error.code, error.message);
    }
    match decision {
        GuardDecision::Render => println!("guard: render {path}"),
        GuardDecision::Loading => println!("guard: loading"),
        GuardDecision::Redirect { to, return_to } => println!("guard: redirect to {to} (return to {return_to})"),
    }
}

async fn run_gym(app: &AppState, name: Option<&str>, update: &GymUpdate) -> Result<(), CliError> {
    let user = signed_in_user(app)?;
    let mut gym = app
        .provisioner
        .ensure_gym_exists(&GymOwner::from_user(&user), name)
        .await?;
    if !update.is_empty() {
        gym = app.provisioner.update_gym(gym.id, update).await?;
    }
    println!("{}", serde_json::to_string_pretty(&gym)?);
    Ok(())
}

async fn run_members(app: &AppState) -> Result<(), CliError> {
    let user = signed_in_user(app)?;
    let gym = app
        .provisioner
        .find_gym(&GymOwner::from_user(&user))
        .await?
        .ok_or(CliError::NoGym)?;
    let members = list_members(&app.recovery, app.members.as_ref(), gym.id).await?;
    println!("{}", serde_json::to_string_pretty(&members)?);
    Ok(())
}

fn run_onboarding(app: &AppState, step: Option<OnboardingStep>) -> Result<(), CliError> {
    let user = signed_in_user(app)?;
    let mut tracker = app.onboarding(user.id);
    let state = match step {
        None => tracker.state(),
        Some(OnboardingStep::Next) => tracker.next_step()?,
        Some(OnboardingStep::Previous) => tracker.previous_step()?,
        Some(OnboardingStep::Complete) => tracker.complete()?,
        Some(OnboardingStep::Skip) => tracker.skip()?,
        Some(OnboardingStep::Tutorial) => tracker.mark_tutorial_viewed()?,
        Some(OnboardingStep::Reset) => tracker.reset()?,
    };
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn run_watch(
    app: &AppState,
    notes: &mut broadcast::Receiver<Notification>,
    tray: &mut ToastTray,
) -> Result<(), CliError> {
    let health = app.recovery.spawn_health_check();
    let refresh = app.recovery.spawn_token_refresh();
    let mut sweep = tokio::time::interval(TRAY_SWEEP_INTERVAL);
    tracing::info!("watching session; press Ctrl-C to stop");

    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::Signal),
            _ = sweep.tick() => {
                if !tray.expire().is_empty() {
                    render_tray(tray);
                }
            }
            note = notes.recv() => match note {
                Ok(note) => {
                    print_notification(&note);
                    tray.push(note);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification output lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
        }
    };
    health.abort();
    refresh.abort();
    result
}

fn print_notification(note: &Notification) {
    let tag = match note.variant {
        Variant::Default => "info",
        Variant::Success => "ok",
        Variant::Warning => "warn",
        Variant::Destructive => "error",
    };
    println!("[{tag}] {}: {}", note.title, note.description);
}

/// Print every toast still on screen; destructive ones stay until dismissed.
fn render_tray(tray: &mut ToastTray) {
    let visible = tray.visible();
    println!("-- {} notification(s) --", visible.len());
    for note in visible {
        print_notification(note);
    }
}
