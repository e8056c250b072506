use clap::{Parser, Subcommand};
use eyre::Context;
use jiff::Timestamp;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_scheduled_upload::oauth::http_client;
use youtube_scheduled_upload::{
    CredentialSnapshot, IncomingFile, OAuthManager, Session, SubmissionOutcome, UploadForm,
    UploadService, UploaderConfig, YouTubePlatform,
};

const OAUTH_DONE: &str = include_str!("../../oauth_done.html");

#[derive(Parser, Debug)]
#[command(name = "yt-upload")]
#[command(about = "Upload videos to YouTube, now or at a time of your choosing")]
struct Args {
    /// Where credentials are kept between runs
    #[arg(long, global = true, value_name = "FILE", default_value = "credentials.json")]
    credentials: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in to YouTube and store the credentials
    Login,
    /// Upload a video
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
struct UploadArgs {
    #[arg(long)]
    title: String,

    /// The video file
    #[arg(long, value_name = "PATH")]
    file: PathBuf,

    #[arg(long)]
    description: Option<String>,

    /// Comma-separated tags
    #[arg(long, value_name = "TAGS")]
    tags: Option<String>,

    /// private, unlisted, or public
    #[arg(long, default_value = "private")]
    privacy: String,

    /// Upload at this time instead of now, e.g. 2030-01-01T09:00 or 2030-01-01T09:00:00Z.
    /// The program keeps running until the upload has been performed.
    #[arg(long, value_name = "TIME")]
    at: Option<String>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let args = Args::parse();

    let config = UploaderConfig::from_env().context("load configuration")?;
    let http = http_client()?;
    let oauth = OAuthManager::new(config.oauth.clone(), http.clone(), OAUTH_DONE);
    let platform = Arc::new(YouTubePlatform::new(http));

    let session = sign_in(&args.credentials, &oauth, &platform).await?;

    let upload = match args.command {
        Command::Login => {
            eprintln!("signed in; credentials stored in {}", args.credentials.display());
            return Ok(());
        }
        Command::Upload(upload) => upload,
    };

    let (service, dispatcher) = UploadService::launch(&config, platform);

    let file = IncomingFile::open(&upload.file)
        .await
        .with_context(|| format!("open {}", upload.file.display()))?;
    let form = UploadForm {
        title: Some(upload.title),
        description: upload.description,
        tags: upload.tags,
        privacy_status: Some(upload.privacy),
        file: Some(file),
        schedule_time: upload.at,
    };

    let outcome = service.submit(&session, form).await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(dispatcher) = dispatcher {
                dispatcher.stop().await;
            }
            return Err(e.into());
        }
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("render outcome")?
    );

    let Some(dispatcher) = dispatcher else {
        return Ok(());
    };
    if let SubmissionOutcome::Scheduled { .. } = outcome {
        let queued = service.scheduled_uploads(&session).await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&queued).context("render queue")?
        );

        tracing::info!("waiting for the scheduled upload; press Ctrl-C to give up");
        let mut poll = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                r = tokio::signal::ctrl_c() => {
                    r.context("listen for Ctrl-C")?;
                    tracing::warn!("interrupted; the scheduled upload will not happen");
                    break;
                }
                _ = poll.tick() => {
                    if dispatcher.queue().is_empty().await {
                        break;
                    }
                }
            }
        }
    }
    dispatcher.stop().await;

    Ok(())
}

/// Restores the stored credentials, refreshing them if they have run out, or sends the user
/// through the browser to get new ones. Either way the result is stored for next time.
async fn sign_in(
    path: &Path,
    oauth: &OAuthManager,
    platform: &YouTubePlatform,
) -> eyre::Result<Session> {
    let stored = if tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("check for {}", path.display()))?
    {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let snapshot: CredentialSnapshot = serde_json::from_str(&json)
            .with_context(|| format!("parse credentials in {}", path.display()))?;
        if snapshot.needs_refresh(Timestamp::now()) {
            oauth
                .refresh(&snapshot)
                .await
                .context("refresh stored credentials")?
        } else {
            Some(snapshot)
        }
    } else {
        None
    };

    let mut session = Session::new();
    match stored {
        Some(snapshot) => {
            tracing::debug!("using stored credentials");
            session.replace_credentials(snapshot);
        }
        None => {
            let snapshot = oauth
                .authenticate_interactive()
                .await
                .context("authorize with YouTube")?;
            session.sign_in(snapshot, platform).await?;
        }
    }

    let json = serde_json::to_string(session.credentials()?).context("serialize credentials")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(session)
}
