//! Console navigation CLI
//!
//! Drives the permission cache and navigation guard against a live console
//! API. The session persists in a JSON file between invocations, so
//! `login`, `navigate`, and `logout` can be run as separate commands.

use anyhow::{bail, Context, Result};
use clap::Parser;
use console_access::{
    console_route_table, AccessContext, ConsoleConfig, EntityRef, FileSessionStore,
    HttpConsoleApi, Navigation, NavigationOutcome, Navigator, Permitted, RouteTable, ScopeKind,
    SessionStore, TracingNotifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Console navigation CLI
#[derive(Parser)]
#[command(name = "console-nav")]
#[command(about = "Navigate the pipeline console with permission checks")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Override API base URL
    #[arg(long, env = "CONSOLE_API_URL")]
    api_url: Option<String>,

    /// Override session file
    #[arg(long, env = "CONSOLE_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Sign in and open the home route
    Login {
        username: String,

        #[arg(long, env = "CONSOLE_PASSWORD")]
        password: String,
    },

    /// Sign out and return to the login route
    Logout,

    /// Navigate to a console path
    Navigate { path: String },

    /// Show the signed-in user and their permissions
    Whoami,

    /// List routes and whether the current session may enter them
    Routes,

    /// Run a function/data permission check
    Check {
        module: String,
        action: String,

        #[arg(long, conflicts_with = "environment")]
        project: Option<String>,

        #[arg(long)]
        environment: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConsoleConfig::load(path)?,
        None => ConsoleConfig::default(),
    };

    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }
    if let Some(session_file) = cli.session_file {
        config.session_file = session_file;
    }

    config.validate()?;

    let log_level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("warn,console_access={}", log_level).into()),
        )
        .with_target(true)
        .init();

    debug!("Using API at {}", config.api_base_url);

    let session: Arc<dyn SessionStore> = Arc::new(
        FileSessionStore::open(&config.session_file)
            .with_context(|| format!("failed to open session file {:?}", config.session_file))?,
    );
    let api = Arc::new(HttpConsoleApi::new(
        config.api_base_url.as_str(),
        config.request_timeout(),
        session.clone(),
    )?);
    let ctx = Arc::new(AccessContext::new(session, api, Arc::new(TracingNotifier)));

    let routes = match &config.routes_file {
        Some(path) => RouteTable::load_json(path)
            .with_context(|| format!("failed to load routes from {:?}", path))?,
        None => console_route_table()?,
    };

    let navigator = Navigator::new(
        ctx.clone(),
        routes,
        config.login_route.as_str(),
        config.home_route.as_str(),
    );

    match cli.command {
        Command::Login { username, password } => {
            let nav = navigator
                .login(&username, &password)
                .await
                .context("login failed")?;
            info!("Signed in as {}", username);
            report(&nav)
        }
        Command::Logout => report(&navigator.logout().await),
        Command::Navigate { path } => report(&navigator.navigate(&path).await),
        Command::Whoami => whoami(&ctx).await,
        Command::Routes => list_routes(&navigator).await,
        Command::Check {
            module,
            action,
            project,
            environment,
        } => {
            load_permissions(&ctx).await?;

            let entity = match (&project, &environment) {
                (Some(id), _) => Some(EntityRef::Project(id)),
                (None, Some(kind)) => Some(EntityRef::Environment(kind)),
                (None, None) => None,
            };

            if ctx.check_permission(&module, &action, entity) {
                println!("allowed");
                Ok(())
            } else {
                bail!("denied: {} {}", action, module)
            }
        }
    }
}

fn report(nav: &Navigation) -> Result<()> {
    for hop in &nav.hops {
        println!("{} -> {} ({})", hop.from, hop.to, hop.cause);
    }

    match &nav.outcome {
        NavigationOutcome::Arrived(route) => {
            println!("{}  {}", route.full_path, route.display_title());
            Ok(())
        }
        NavigationOutcome::NotFound(path) => bail!("no route matches {}", path),
    }
}

async fn load_permissions(ctx: &AccessContext) -> Result<()> {
    if ctx.token().is_none() {
        bail!("not signed in");
    }

    if let Err(e) = ctx.ensure_permissions().await {
        ctx.end_session();
        bail!("failed to load permissions: {}", e);
    }

    Ok(())
}

fn scope_label(scope: ScopeKind) -> &'static str {
    match scope {
        ScopeKind::All => "all",
        ScopeKind::Custom => "custom",
    }
}

fn permitted_label(permitted: &Permitted<String>) -> String {
    match permitted {
        Permitted::Unrestricted => "*".to_string(),
        Permitted::Only(items) => items.join(", "),
    }
}

async fn whoami(ctx: &AccessContext) -> Result<()> {
    let Some(identity) = ctx.identity() else {
        println!("Not signed in");
        return Ok(());
    };

    load_permissions(ctx).await?;
    let state = ctx.cache().snapshot();
    let data = &state.permissions.data;

    println!("User:         {} ({})", identity.display_name(), identity.user_id);
    println!("Admin:        {}", identity.is_admin);
    println!("Menus:        {}", state.permissions.menu.len());
    for path in &state.permissions.menu {
        println!("  {}", path);
    }
    println!("Functions:");
    for (module, actions) in &state.permissions.function {
        let actions: Vec<&str> = actions.iter().map(String::as_str).collect();
        println!("  {}: {}", module, actions.join(", "));
    }
    println!(
        "Projects:     {} [{}]",
        scope_label(data.project_scope),
        permitted_label(&ctx.permitted_project_ids())
    );
    println!(
        "Environments: {} [{}]",
        scope_label(data.environment_scope),
        permitted_label(&ctx.permitted_environment_types())
    );

    Ok(())
}

async fn list_routes(navigator: &Navigator) -> Result<()> {
    let ctx = navigator.context();
    let signed_in = ctx.token().is_some();
    if signed_in {
        load_permissions(ctx).await?;
    }

    for route in navigator.routes().iter() {
        let access = match route.permission.as_deref() {
            None => "open",
            Some(_) if !signed_in => "-",
            Some(permission) if ctx.may_enter(permission) => "yes",
            Some(_) => "no",
        };

        println!(
            "{:<28} {:<5} {:<22} {}",
            route.full_path,
            access,
            route.permission.as_deref().unwrap_or("-"),
            route.display_title()
        );
    }

    Ok(())
}
