mod cli;

use std::sync::{Arc, Mutex, PoisonError};

use clap::Parser;
use cli::{Cli, Commands};
use serde_json::Value;

use mixin_kit::capability::{Mixed, MiddlewareHost, Mixin, SettingsHost};
use mixin_kit::config::{self, Config};
use mixin_kit::middleware::{Catalog, JsonArgs, Pipeline};
use mixin_kit::observability;
use mixin_kit::settings::Settings;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;
type App = Mixin<Mixin<Mixed, Settings>, Pipeline<JsonArgs>>;

fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let _ = dotenvy::dotenv();
    let config = Config::load_from_path(path)?;
    observability::init_tracing(&config.telemetry.log_filter);

    let app: App = Mixed
        .with(config.build_settings())
        .with(config.build_pipeline(&Catalog::<JsonArgs>::with_defaults())?);

    match cli.command {
        Commands::Run(args) => run(&app, &args.context)?,
        Commands::Check => check(&app),
        Commands::Get(args) => match app.get(&args.path) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => return Err(format!("setting '{}' is not set", args.path).into()),
        },
    }

    Ok(())
}

fn run(app: &App, context: &str) -> Result<(), AnyError> {
    let document: Value = serde_json::from_str(context)?;
    let document = Arc::new(Mutex::new(document));

    app.handle((Arc::clone(&document),))?;

    let document = document.lock().unwrap_or_else(PoisonError::into_inner);
    println!("{}", serde_json::to_string_pretty(&*document)?);
    tracing::info!(metrics = ?app.pipeline().metrics().snapshot(), "dispatch finished");
    Ok(())
}

fn check(app: &App) {
    let pipeline = app.pipeline();
    println!("pipeline '{}'", pipeline.name());
    for (position, info) in pipeline.handlers().iter().enumerate() {
        println!("{:>3}  {:<16} {:?}", position, info.name, info.declared);
    }
}
