use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use contentshare::{
    archive,
    config::Config,
    document::{self, BasicConverter},
    dom::StaticPage,
    extractor::extract_page,
    fetcher::{build_client, fetch},
    media::MediaResolver,
};

/// Content extraction and republishing tools
#[derive(Parser)]
#[command(name = "contentshare")]
#[command(about = "Extract posts and documents and prepare them for republishing", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the images, videos and text of a post through its public API
    Resolve {
        url: String,
        /// Also download everything into a ZIP archive at this path
        #[arg(short, long)]
        archive: Option<PathBuf>,
    },
    /// Fetch a page and run the content extractor on it
    Extract { url: String },
    /// Convert a local .md/.txt/.html file
    Document { path: PathBuf },
    /// Print the active platform table as JSON
    Platforms,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let logs = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        logs.json().init();
    } else {
        logs.init();
    }

    let config = Config::from_env()?;

    match cli.command {
        Commands::Resolve { url, archive: path } => {
            let client = build_client()?;
            let resolver = MediaResolver::new(client.clone(), config.resolver().clone());
            let media = resolver.resolve_media(&url).await?;
            println!("{}", serde_json::to_string_pretty(&media)?);

            if let Some(path) = path {
                let built = archive::build_archive(&client, &media, &chrono::Local::now()).await?;
                let target = if path.is_dir() { path.join(&built.file_name) } else { path };
                tokio::fs::write(&target, &built.bytes)
                    .await
                    .with_context(|| format!("writing {}", target.display()))?;
                info!(
                    path = %target.display(),
                    succeeded = built.succeeded,
                    failed = built.failed,
                    "archive written"
                );
            }
        }
        Commands::Extract { url } => {
            let page = fetch(&url).await?;
            let frame = StaticPage::new(page.url_final, &page.body_utf8).with_client(build_client()?);
            let doc = extract_page(&frame, config.extractor()).await;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Document { path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parsed = document::parse_document_file(&BasicConverter, &file_name, &bytes)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Commands::Platforms => {
            println!("{}", config.platform_table()?.to_json()?);
        }
    }
    Ok(())
}
