use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    CandidateFile, LifecycleEvent, LifecycleState, RuntimeHandle, TempDirPreviewStore,
    VisualSearchClient,
};
use storage::Storage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::Settings;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

#[derive(Parser, Debug)]
#[command(name = "visual-search", about = "Find products that look like an image")]
struct Args {
    /// Config file; defaults to ./visual_search.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload one image and print the visual matches.
    Search(SearchArgs),
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// Log in right after registering.
        #[arg(long)]
        login: bool,
    },
    Logout,
    /// Show the configured service and whether a token is stored.
    Status,
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// Image chosen the way a file picker would hand it over.
    #[arg(long, conflicts_with_all = ["drop", "pick"])]
    file: Option<PathBuf>,
    /// Files handed over as a drop; only the first one is used.
    #[arg(long, num_args = 1.., conflicts_with = "pick")]
    drop: Vec<PathBuf>,
    /// Open a native file dialog filtered to images.
    #[arg(long)]
    pick: bool,
    /// Print the decoded result as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();
    let settings = config::load_settings(args.config.as_deref());

    let storage = Storage::new(&settings.database_url)
        .await
        .with_context(|| format!("failed to open {}", settings.database_url))?;
    let previews = TempDirPreviewStore::new(&settings.preview_dir)?;
    let client = VisualSearchClient::start(
        settings.client_config()?,
        settings.selection_policy(),
        Arc::new(previews),
        Arc::new(storage),
    )
    .await?;

    run_and_shutdown(client, &settings, args.command).await
}

/// Runs one command and always stops the client afterwards, so a failed
/// command still releases the live preview. The command's error wins.
async fn run_and_shutdown(
    client: VisualSearchClient,
    settings: &Settings,
    command: Command,
) -> Result<()> {
    let result = run_command(&client, settings, command).await;
    client.shutdown().await?;
    result
}

async fn run_command(
    client: &VisualSearchClient,
    settings: &Settings,
    command: Command,
) -> Result<()> {
    match command {
        Command::Search(search) => run_search(client, search).await?,
        Command::Login { username, password } => {
            client.auth().login(&username, &password).await?;
            println!("Logged in as {username}");
        }
        Command::Register {
            username,
            password,
            login,
        } => {
            client.auth().register(&username, &password).await?;
            println!("Registered {username}");
            if login {
                client.auth().login(&username, &password).await?;
                println!("Logged in as {username}");
            }
        }
        Command::Logout => {
            client.auth().logout().await?;
            println!("Logged out");
        }
        Command::Status => print_status(client, settings).await,
    }
    Ok(())
}

async fn run_search(client: &VisualSearchClient, args: SearchArgs) -> Result<()> {
    let runtime = client.runtime();
    let selection = if let Some(path) = args.file {
        LifecycleEvent::PickerSelected(read_candidate(&path)?)
    } else if !args.drop.is_empty() {
        runtime.dispatch(LifecycleEvent::DragEnter)?;
        let files = args
            .drop
            .iter()
            .map(|path| read_candidate(path))
            .collect::<Result<Vec<_>>>()?;
        LifecycleEvent::Dropped(files)
    } else if args.pick {
        let Some(path) = pick_image().await? else {
            bail!("no file selected");
        };
        LifecycleEvent::PickerSelected(read_candidate(&path)?)
    } else {
        bail!("pass --file, --drop or --pick");
    };

    let snapshot = runtime.send(selection).await?;
    if let Some(preview) = &snapshot.preview {
        info!(preview = %preview.location, "search: preview ready");
    }
    if let LifecycleState::Failed(_) = &snapshot.state {
        return finish(&snapshot.state, args.json);
    }

    runtime.send(LifecycleEvent::SubmitRequested).await?;
    let state = tokio::select! {
        snapshot = runtime.wait_for_terminal() => snapshot?.state,
        _ = tokio::signal::ctrl_c() => {
            cancel(&runtime).await?;
            bail!("search cancelled");
        }
    };
    finish(&state, args.json)
}

fn finish(state: &LifecycleState, json: bool) -> Result<()> {
    match state {
        LifecycleState::Failed(failure) => {
            render::render_state(state, json, &mut io::stderr())?;
            bail!("{}", failure.message())
        }
        _ => Ok(render::render_state(state, json, &mut io::stdout().lock())?),
    }
}

async fn cancel(runtime: &RuntimeHandle) -> Result<()> {
    warn!("search: interrupted, resetting");
    runtime.send(LifecycleEvent::ResetRequested).await?;
    Ok(())
}

fn read_candidate(path: &Path) -> Result<CandidateFile> {
    CandidateFile::from_path(path).with_context(|| format!("failed to read {}", path.display()))
}

async fn pick_image() -> Result<Option<PathBuf>> {
    let start_dir = dirs::picture_dir()
        .or_else(dirs::desktop_dir)
        .or_else(dirs::download_dir)
        .or_else(dirs::home_dir);
    let picked = tokio::task::spawn_blocking(move || {
        let mut dialog = rfd::FileDialog::new()
            .set_title("Select an image to search")
            .add_filter("Images", IMAGE_EXTENSIONS);
        if let Some(dir) = start_dir {
            dialog = dialog.set_directory(dir);
        }
        dialog.pick_file()
    })
    .await?;
    Ok(picked)
}

async fn print_status(client: &VisualSearchClient, settings: &Settings) {
    println!("service:  {}", settings.api_base_url);
    println!("database: {}", settings.database_url);
    println!("previews: {}", settings.preview_dir.display());
    let auth = if client.session().is_authenticated().await {
        "token stored"
    } else {
        "anonymous"
    };
    println!("session:  {auth}");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
