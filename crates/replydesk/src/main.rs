//! `ReplyDesk` - command-line front end for the support inbox backend.
//!
//! Every command prints pretty JSON on stdout. Failures are printed as
//! `{"error": <kind>, "message": <text>}` on stderr with a non-zero exit
//! status: 2 when the user can fix it (connect, reconnect, correct input),
//! 1 otherwise.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use replydesk_core::ServiceError;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging on stderr so stdout stays machine-readable
    let default_filter = match cli.verbose {
        0 => "replydesk=info,replydesk_core=info,replydesk_oauth=info",
        1 => "replydesk=debug,replydesk_core=debug,replydesk_oauth=debug",
        _ => "replydesk=trace,replydesk_core=trace,replydesk_oauth=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting ReplyDesk");

    match commands::run(cli).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => report(&anyhow::Error::from(e)),
        },
        Err(e) => report(&e),
    }
}

/// Prints a failure as JSON on stderr and picks the exit status.
fn report(error: &anyhow::Error) -> ExitCode {
    debug!("Command failed: {error:?}");
    let (kind, actionable) = error
        .downcast_ref::<ServiceError>()
        .map_or(("error", false), |e| (e.kind(), e.is_user_actionable()));
    let body = serde_json::json!({
        "error": kind,
        "message": format!("{error:#}"),
    });
    eprintln!("{body:#}");
    if actionable {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}
