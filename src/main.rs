//! EdenFrame server binary.
//!
//! ```text
//! edenframe [--config eden.toml] [--host H] [--port P] [serve]
//! edenframe routes     # print the compiled route table and exit
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use axum::{body::Body, http::Request};
use clap::{Parser, Subcommand};
use serde_json::json;

use edenframe::config::{load_config, AppConfig};
use edenframe::controller::{action, ActionFuture, Controller, ControllerRegistry, Outcome};
use edenframe::http::{Render, ShellEngine, Uploads};
use edenframe::lifecycle::{launch, signals, Shutdown, StartupError};
use edenframe::observability::{logging, TracingReporter};
use edenframe::routing::{RouteSet, RouteTableBuilder, UploadPolicy};

#[derive(Parser)]
#[command(name = "edenframe")]
#[command(about = "Declarative route table server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.host`
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve HTTP (default)
    Serve,
    /// Print the compiled route table
    Routes,
}

/// Public pages.
struct Home;

impl Controller for Home {
    fn declare(&self, routes: &mut RouteSet) {
        routes.get("/", "index").view("home/index").title("Welcome");
        routes.get("/about", "about").view("home/about").title("About");
        routes.get("/login", "login").view("home/login").title("Sign in");
    }

    fn actions(&self) -> &'static [&'static str] {
        &["index", "about", "login"]
    }

    fn invoke(self: Arc<Self>, name: &str, _req: Request<Body>, render: Render) -> Option<ActionFuture> {
        match name {
            "index" | "about" | "login" => action(async move { Ok(Outcome::Respond(render.render(json!({}))?)) }),
            _ => None,
        }
    }
}

/// Signed-in area.
struct Account;

impl Controller for Account {
    fn declare(&self, routes: &mut RouteSet) {
        routes.mount("/account").capability("account.view").fail("/login");
        routes.get("/", "profile").view("account/profile").title("Your account");
        routes
            .post("/avatar", "avatar")
            .upload(UploadPolicy::single("avatar"))
            .view("account/profile");
    }

    fn actions(&self) -> &'static [&'static str] {
        &["profile", "avatar"]
    }

    fn invoke(self: Arc<Self>, name: &str, req: Request<Body>, render: Render) -> Option<ActionFuture> {
        match name {
            "profile" => action(async move { Ok(Outcome::Respond(render.render(json!({}))?)) }),
            "avatar" => action(async move {
                let stored = req
                    .extensions()
                    .get::<Uploads>()
                    .map(|uploads| uploads.files.len())
                    .unwrap_or(0);
                Ok(Outcome::Respond(render.render(json!({ "stored": stored }))?))
            }),
            _ => None,
        }
    }
}

fn registry() -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry
        .register_instance("home", 0, Arc::new(Home))
        .register_instance("account", 10, Arc::new(Account));
    registry
}

fn load(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edenframe starting");

    let builder = RouteTableBuilder::new(registry())
        .view_engine(Arc::new(ShellEngine::new(config.assets.clone())));

    if let Some(Commands::Routes) = cli.command {
        let table = builder.upload_config(config.upload.clone()).build()?;
        for route in table.routes() {
            let descriptor = route.descriptor();
            println!(
                "{:<7} {:<30} {}.{}  [{}]",
                descriptor.verb.as_str().to_uppercase(),
                route.path(),
                descriptor.controller,
                descriptor.action,
                route.segment_names().join(" → ")
            );
        }
        return Ok(());
    }

    tracing::info!(
        address = %config.server.bind_address(),
        static_dir = %config.assets.static_dir,
        upload_dest = %config.upload.dest,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::forward(shutdown.clone());

    match launch(config, builder, Arc::new(TracingReporter::new()), &shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(StartupError::Server(e)) if e.is_fatal() => {
            eprintln!("{e}");
            process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
