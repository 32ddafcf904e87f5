use anyhow::{Context, Result};
use clap::Parser;
use imgpopup::app::App;
use imgpopup::models::{Config, PopupRequest};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "imgpopup")]
#[command(about = "Generate popup thumbnails and print their renderer variables")]
struct CliArgs {
    /// Image path relative to the source root, e.g. /images/big.png.
    #[arg(value_name = "PATH", required_unless_present = "manifest")]
    path: Option<String>,

    /// Scale percentage of the form nn%.
    #[arg(value_name = "PERCENT", required_unless_present = "manifest")]
    percent: Option<String>,

    /// Optional popup title.
    #[arg(value_name = "TITLE", trailing_var_arg = true)]
    title: Vec<String>,

    /// JSON file holding an array of {"path", "percent", "title"} requests.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["path", "percent", "title"])]
    manifest: Option<PathBuf>,

    /// Override IMGPOPUP_SOURCE_ROOT.
    #[arg(long, value_name = "DIR")]
    source_root: Option<PathBuf>,
}

impl CliArgs {
    fn single_request(&self) -> Option<PopupRequest> {
        let path = self.path.clone()?;
        let percent = self.percent.clone()?;
        let title = (!self.title.is_empty()).then(|| self.title.join(" "));
        Some(PopupRequest::new(path, percent, title))
    }
}

fn load_manifest(path: &Path) -> Result<Vec<PopupRequest>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid manifest {}", path.display()))
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(root) = args.source_root.clone() {
        config.source_root = root;
    }
    let app = App::new(&config)?;

    let output = match &args.manifest {
        Some(manifest) => {
            let requests = load_manifest(manifest)?;
            serde_json::to_string_pretty(&app.process_batch(requests).await?)?
        }
        None => {
            let request = args
                .single_request()
                .context("PATH and PERCENT are required without --manifest")?;
            serde_json::to_string_pretty(&app.process(&request).await?)?
        }
    };
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgpopup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => {
            info!("Popup generation completed");
            Ok(())
        }
        Err(e) => {
            error!("Popup generation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
