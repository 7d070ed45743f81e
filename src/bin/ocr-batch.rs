use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::Layer as _;

use ocr_batch_client::{
    BatchProgress, BatchSettings, Client, ClientConfig, ContentMode, Env, PollSnapshot,
    Preferences, SelectionItem,
};

#[derive(Debug, Parser)]
#[command(name = "ocr-batch", about = "Browse SharePoint libraries and drive OCR batches")]
struct Cli {
    /// TOML client config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides `base_url` from the config (also read from OCR_BATCH_BASE_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,
    /// Where the last visited library/folder is remembered.
    #[arg(long, global = true)]
    prefs: Option<PathBuf>,
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Libraries,
    Folders {
        drive_id: String,
        #[arg(long)]
        parent: Option<String>,
    },
    Files {
        drive_id: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Download a file's content to disk.
    Download {
        drive_id: String,
        item_id: String,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Show which files a selection expands to.
    Expand(SelectionArgs),
    /// Expand a selection, start a batch and follow it.
    Start {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        engine: Option<String>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        no_watch: bool,
    },
    Status {
        batch_id: String,
    },
    Watch {
        batch_id: String,
    },
    Pause {
        batch_id: String,
    },
    Resume {
        batch_id: String,
    },
    Stop {
        batch_id: String,
    },
    List,
    OcrStatus {
        file_id: String,
    },
    OcrText {
        file_id: String,
    },
    CacheStats,
    CacheClear,
    Settings {
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Debug, Args)]
struct SelectionArgs {
    /// `<drive_id>:<folder_id>[:<name>]`, repeatable.
    #[arg(long = "folder", value_parser = parse_folder)]
    folders: Vec<SelectionItem>,
    /// `<drive_id>:<item_id>:<name>`, repeatable.
    #[arg(long = "file", value_parser = parse_file)]
    files: Vec<SelectionItem>,
}

impl SelectionArgs {
    fn items(&self) -> Vec<SelectionItem> {
        self.folders.iter().chain(&self.files).cloned().collect()
    }
}

fn parse_folder(raw: &str) -> Result<SelectionItem, String> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(drive), Some(id), name) if !drive.is_empty() && !id.is_empty() => Ok(
            SelectionItem::folder(drive, id, name.filter(|n| !n.is_empty()).unwrap_or(id)),
        ),
        _ => Err(format!("expected <drive_id>:<folder_id>[:<name>], got {raw:?}")),
    }
}

fn parse_file(raw: &str) -> Result<SelectionItem, String> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(drive), Some(id), Some(name))
            if !drive.is_empty() && !id.is_empty() && !name.is_empty() =>
        {
            Ok(SelectionItem::file(drive, id, name))
        }
        _ => Err(format!("expected <drive_id>:<item_id>:<name>, got {raw:?}")),
    }
}

fn init_tracing(json_logs: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn follow(client: &Client, batch_id: &str) {
    let mut updates = client.batches.watch(batch_id).await;
    let mut last_printed: Option<PollSnapshot> = None;
    loop {
        let snapshot = updates.borrow_and_update().clone();
        if last_printed.as_ref() != Some(&snapshot) {
            if let Some(job) = &snapshot.job {
                println!("{}", BatchProgress::from_job(job));
            }
            if let Some(error) = &snapshot.error {
                eprintln!("error: {error}");
            }
            last_printed = Some(snapshot.clone());
        }
        if snapshot.state.is_stopped() || updates.changed().await.is_err() {
            break;
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let env = match &cli.dotenv {
        Some(path) => Env::load_dotenv(path).await?,
        None => Env::default(),
    };
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path).await?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = cli.base_url.clone().or_else(|| env.get("OCR_BATCH_BASE_URL")) {
        config.base_url = base_url;
    }
    let client = Client::from_config(&config, &env)?;

    match cli.command {
        Command::Libraries => print_json(&client.sharepoint.libraries().await?)?,
        Command::Folders { drive_id, parent } => {
            print_json(&client.sharepoint.folders(&drive_id, parent.as_deref()).await?)?;
            if let Some(path) = &cli.prefs {
                let mut prefs = Preferences::load(path).await?;
                prefs.remember_location(&drive_id, parent.as_deref());
                prefs.save(path).await?;
            }
        }
        Command::Files { drive_id, parent } => {
            print_json(&client.sharepoint.files(&drive_id, parent.as_deref()).await?)?
        }
        Command::Download {
            drive_id,
            item_id,
            out,
        } => {
            let bytes = client
                .sharepoint
                .file_content(&drive_id, &item_id, ContentMode::Download)
                .await?;
            tokio::fs::write(&out, &bytes).await?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
        Command::Expand(selection) => {
            let expansion = client.expand(&selection.items()).await;
            for error in &expansion.errors {
                eprintln!("error: {error}");
            }
            print_json(&expansion.files)?;
        }
        Command::Start {
            selection,
            language,
            engine,
            force,
            no_watch,
        } => {
            let expansion = client.expand(&selection.items()).await;
            for error in &expansion.errors {
                eprintln!("error: {error}");
            }
            let settings = BatchSettings {
                language,
                engine,
                force_reprocess: force,
                ..BatchSettings::default()
            };
            let job = client.batches.start(&expansion.files, &settings).await?;
            println!("{}", BatchProgress::from_job(&job));
            if !no_watch && !job.status.is_terminal() {
                follow(&client, &job.batch_id).await;
            }
        }
        Command::Status { batch_id } => {
            let job = client.batches.refresh(&batch_id).await?;
            println!("{}", BatchProgress::from_job(&job));
        }
        Command::Watch { batch_id } => follow(&client, &batch_id).await,
        Command::Pause { batch_id } => {
            println!("{}", BatchProgress::from_job(&client.batches.pause(&batch_id).await?))
        }
        Command::Resume { batch_id } => {
            println!("{}", BatchProgress::from_job(&client.batches.resume(&batch_id).await?))
        }
        Command::Stop { batch_id } => {
            println!("{}", BatchProgress::from_job(&client.batches.stop(&batch_id).await?))
        }
        Command::List => {
            for job in client.batches.list().await? {
                println!("{}", BatchProgress::from_job(&job));
            }
        }
        Command::OcrStatus { file_id } => print_json(&client.ocr.file_status(&file_id).await?)?,
        Command::OcrText { file_id } => println!("{}", client.ocr.text(&file_id).await?.text),
        Command::CacheStats => print_json(&client.admin.cache_stats().await?)?,
        Command::CacheClear => print_json(&client.admin.clear_cache().await?)?,
        Command::Settings { category } => {
            print_json(&client.admin.settings(category.as_deref()).await?)?
        }
    }

    client.batches.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.json_logs) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = match err.downcast_ref::<ocr_batch_client::Error>() {
                Some(err) => err.display_message(),
                None => err.to_string(),
            };
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
