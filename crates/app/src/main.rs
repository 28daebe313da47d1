use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use directories::ProjectDirs;
use libcat_api::ApiClient;
use libcat_application::AppContext;
use libcat_ui::{Ui, UiExit};
use tracing::info;

mod logging;
mod settings;

/// Terminal client for the library catalog.
#[derive(Parser, Debug)]
#[command(name = "libcat", version)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "LIBCAT_API_URL", value_name = "URL")]
    api_url: Option<String>,

    /// Open the viewer for `type=..&id=..` (or a full viewer link)
    #[arg(long, value_name = "QUERY")]
    view: Option<String>,

    /// Settings file
    #[arg(long, env = "LIBCAT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_dirs =
        ProjectDirs::from("dev", "libcat", "libcat").context("resolve project dirs")?;

    let data_dir = project_dirs.data_dir();
    fs::create_dir_all(data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;
    logging::init(&data_dir.join("libcat.log"))?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut stored = settings::load(&config_path)?;
    let mut effective = stored.clone();
    settings::apply_overrides(&mut effective, cli.api_url.as_deref());
    info!(api_url = %effective.api_url, config = %config_path.display(), "starting");

    let client = ApiClient::new(&effective.api_url)
        .with_context(|| format!("configure API client for {}", effective.api_url))?;
    let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;

    let mut ui = Ui::new(
        AppContext::new(effective),
        Arc::new(client),
        runtime.handle().clone(),
    );
    if let Some(query) = cli.view.as_deref() {
        ui = ui.with_view(query);
    }
    let outcome = ui.run()?;

    match outcome.exit {
        UiExit::Quit => {
            if outcome.ctx.settings.theme != stored.theme {
                stored.theme = outcome.ctx.settings.theme;
                settings::save(&config_path, &stored)?;
            }
        }
    }

    info!("exiting");
    Ok(())
}
