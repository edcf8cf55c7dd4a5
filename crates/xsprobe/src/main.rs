//! xsprobe CLI - automated content-verification worker.
//!
//! Thin wrapper over `xsprobe-core`: wires the controller from
//! configuration and feeds it submissions read as JSON lines from
//! stdin. Also ships two debugging helpers: `inspect` runs a fragment
//! through the suspicion predicate, and `mint` produces an identity
//! assertion by hand.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use xsprobe_core::assertion::{AssertionIssuer as _, HmacAssertionIssuer};
use xsprobe_core::chromium::ChromiumEngine;
use xsprobe_core::config::Config;
use xsprobe_core::controller::{Controller, OfferOutcome};
use xsprobe_core::identity::{Identity, StaticDirectory};
use xsprobe_core::logging::init_logging;
use xsprobe_core::pool::EnginePool;
use xsprobe_core::sanitizer::{BasicMarkupSanitizer, ContentSanitizer as _};
use xsprobe_core::task::Submission;

#[derive(Parser)]
#[command(
    name = "xsprobe",
    version,
    about = "Automated content-verification worker"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker, reading submissions as JSON lines from stdin
    Run {
        /// Path to xsprobe.toml (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to a JSON file listing known identities
        #[arg(short, long)]
        identities: PathBuf,

        /// HMAC signing secret shared with the application under test
        #[arg(long, env = "XSPROBE_ASSERTION_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Check whether a fragment would be queued for verification
    Inspect {
        /// The fragment; read from stdin when omitted
        content: Option<String>,
    },

    /// Mint an identity assertion for debugging
    Mint {
        /// User identifier to assert
        #[arg(long)]
        user_id: String,

        /// Username to assert
        #[arg(long)]
        username: String,

        /// HMAC signing secret
        #[arg(long, env = "XSPROBE_ASSERTION_SECRET", hide_env_values = true)]
        secret: String,

        /// Assertion lifetime in seconds
        #[arg(long, default_value_t = 86_400)]
        ttl: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            identities,
            secret,
        } => run(config.as_deref(), &identities, secret).await,
        Command::Inspect { content } => inspect(content),
        Command::Mint {
            user_id,
            username,
            secret,
            ttl,
        } => Ok(mint(user_id, username, &secret, ttl)),
    }
}

async fn run(
    config_path: Option<&Path>,
    identities: &Path,
    secret: Option<String>,
) -> anyhow::Result<ExitCode> {
    let config = match config_path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    init_logging(&config.logging).context("initializing logging")?;

    let secret = secret
        .filter(|s| !s.is_empty())
        .or_else(|| {
            let configured = config.assertion.secret.clone();
            (!configured.is_empty()).then_some(configured)
        })
        .context(
            "no signing secret: pass --secret, set XSPROBE_ASSERTION_SECRET, \
             or configure assertion.secret",
        )?;

    let directory = load_directory(identities)?;
    let issuer = Arc::new(HmacAssertionIssuer::new(
        secret.into_bytes(),
        config.assertion.ttl_secs,
    ));
    let engine = ChromiumEngine::new(&config.pool, issuer)?;
    let pool = Arc::new(EnginePool::new(config.pool.clone(), Arc::new(engine)));
    let controller = Controller::new(
        config.controller.clone(),
        pool,
        Arc::new(directory),
        Arc::new(BasicMarkupSanitizer),
    );

    let mut queued = 0usize;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let submission: Submission = match serde_json::from_str(&line) {
            Ok(submission) => submission,
            Err(err) => {
                warn!(error = %err, "skipping malformed submission");
                continue;
            }
        };
        match controller
            .offer(&submission.receiver_id, &submission.content)
            .await
        {
            Ok(OfferOutcome::Queued) => queued += 1,
            Ok(OfferOutcome::NotSuspicious) => {}
            Err(err) => warn!(error = %err, "submission rejected"),
        }
    }

    if queued > 0 {
        info!(queued, "stdin closed, waiting for verification to finish");
        // Let the debounced startup fire before polling for quiet.
        tokio::time::sleep(config.controller.debounce_window() * 2).await;
        loop {
            if controller.launch_failed() {
                bail!("rendering engine failed to launch; queued submissions were dropped");
            }
            if !controller.is_running() && controller.queued() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
    info!(queued, "done");
    Ok(ExitCode::SUCCESS)
}

fn load_directory(path: &Path) -> anyhow::Result<StaticDirectory> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading identities from {}", path.display()))?;
    let identities: Vec<Identity> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    if identities.is_empty() {
        bail!("identity file {} lists no identities", path.display());
    }
    Ok(StaticDirectory::new(identities))
}

fn inspect(content: Option<String>) -> anyhow::Result<ExitCode> {
    let content = match content {
        Some(content) => content,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let sanitizer = BasicMarkupSanitizer;
    if sanitizer.is_suspicious(&content) {
        println!("suspicious");
        println!("sanitized: {}", sanitizer.sanitize(&content));
        Ok(ExitCode::from(1))
    } else {
        println!("benign");
        Ok(ExitCode::SUCCESS)
    }
}

fn mint(user_id: String, username: String, secret: &str, ttl: u64) -> ExitCode {
    let issuer = HmacAssertionIssuer::new(secret.as_bytes().to_vec(), ttl);
    let token = issuer.issue(&Identity::member(user_id, username));
    println!("{token}");
    ExitCode::SUCCESS
}
