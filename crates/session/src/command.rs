// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sessionbridge` subcommands.
//!
//! Every invocation opens the same file-backed cookie jar and local store
//! under the state directory, so separate runs share one browser profile.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use url::Url;

use crate::agreement::Viewport;
use crate::api::{AuthApi, HttpAuthApi};
use crate::callback::CallbackOutcome;
use crate::config::BridgeConfig;
use crate::events::SessionEvent;
use crate::session::SessionService;
use crate::storage::{FileCookieJar, FileLocalStore};

/// Session bridge command line.
#[derive(Debug, Parser)]
#[command(name = "sessionbridge", version, about = "Cross-deployment session reconciliation")]
pub struct Cli {
    #[command(flatten)]
    pub config: BridgeConfig,

    /// Log format (json or text).
    #[arg(long, env = "SESSIONBRIDGE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SESSIONBRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Run the login flow for an identity-redirect URL.
    Callback(CallbackArgs),
    /// Poll the session until Ctrl-C, printing events.
    Watch(WatchArgs),
    /// Apply the `logged_out` URL signal and print the stripped URL.
    Signal {
        /// URL the sibling app redirected to.
        url: String,
    },
    /// Show token presence and the current profile.
    Status,
    /// Purge local session state and print the sibling sign-out URL.
    Logout,
}

#[derive(Debug, clap::Args)]
pub struct CallbackArgs {
    /// Identity-redirect URL carrying the token.
    pub url: String,
    /// Accept a pending agreement instead of skipping it.
    #[arg(long)]
    pub accept_agreement: bool,
}

#[derive(Debug, clap::Args)]
pub struct WatchArgs {
    /// Route being shown; protected routes get the strict logout check.
    #[arg(long)]
    pub route: Option<String>,
}

/// Open the file-backed stores under the configured state directory.
pub fn open_stores(config: &BridgeConfig) -> (Arc<FileCookieJar>, Arc<FileLocalStore>) {
    let dir = config.state_dir();
    tracing::debug!(dir = %dir.display(), "opening state");
    let cookies = Arc::new(FileCookieJar::new(config.host.clone(), dir.join("cookies.json")));
    let local = Arc::new(FileLocalStore::new(dir.join("local.json")));
    (cookies, local)
}

/// Build the service against the HTTP API and run `cli.command`.
/// Returns the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    cli.config.validate()?;
    let api = Arc::new(HttpAuthApi::new(
        cli.config.api_base()?,
        cli.config.locale.clone(),
        cli.config.timezone.clone(),
    ));
    let (cookies, local) = open_stores(&cli.config);
    let service = SessionService::new(cli.config, api, cookies, local)?;
    let code = execute(&service, cli.command, &mut std::io::stdout()).await?;
    service.stop().await;
    Ok(code)
}

/// Run a one-shot command, writing its report to `out`.
pub async fn execute<A: AuthApi, W: Write>(
    service: &SessionService<A>,
    command: Command,
    out: &mut W,
) -> anyhow::Result<i32> {
    match command {
        Command::Callback(args) => callback(service, &args, out).await,
        Command::Watch(args) => {
            watch(service, &args, out, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
        }
        Command::Signal { url } => {
            let url = Url::parse(&url)?;
            match service.apply_logged_out_signal(&url) {
                Some(stripped) => writeln!(out, "{stripped}")?,
                None => writeln!(out, "no {} signal in url", crate::logout::LOGGED_OUT_PARAM)?,
            }
            Ok(0)
        }
        Command::Status => status(service, out).await,
        Command::Logout => {
            let navigation = service.logout();
            writeln!(out, "{}", navigation.target())?;
            Ok(0)
        }
    }
}

async fn callback<A: AuthApi, W: Write>(
    service: &SessionService<A>,
    args: &CallbackArgs,
    out: &mut W,
) -> anyhow::Result<i32> {
    let url = Url::parse(&args.url)?;
    match service.handle_callback(&url).await {
        CallbackOutcome::Redirect(navigation) => {
            writeln!(out, "{navigation}")?;
            Ok(0)
        }
        CallbackOutcome::AgreementRequired(mut pending) => {
            let agreement = pending.agreement();
            writeln!(out, "agreement required: {}", agreement.title.as_deref().unwrap_or("untitled"))?;
            if let Some(ref content) = agreement.content {
                writeln!(out, "{content}")?;
            }
            // Printed in full, so the whole text has been in view.
            pending.gate_mut().observe(Viewport {
                content_height: 0.0,
                viewport_height: 0.0,
                scroll_top: 0.0,
            });
            if !args.accept_agreement {
                writeln!(out, "agreement skipped")?;
                writeln!(out, "{}", pending.skip())?;
                return Ok(0);
            }
            match pending.accept().await {
                Ok(navigation) => {
                    writeln!(out, "agreement accepted")?;
                    writeln!(out, "{navigation}")?;
                    Ok(0)
                }
                Err((_, e)) => {
                    writeln!(out, "error: {e}")?;
                    Ok(1)
                }
            }
        }
        CallbackOutcome::Failed { message, delay, navigation, .. } => {
            writeln!(out, "error: {message}")?;
            writeln!(out, "{navigation} after {}ms", delay.as_millis())?;
            Ok(1)
        }
    }
}

async fn status<A: AuthApi, W: Write>(service: &SessionService<A>, out: &mut W) -> anyhow::Result<i32> {
    let tokens = service.tokens();
    let location = match (tokens.cookie_token(), tokens.fallback_token()) {
        (Some(_), Some(_)) => "cookie + fallback",
        (Some(_), None) => "cookie",
        (None, Some(_)) => "fallback",
        (None, None) => {
            writeln!(out, "token: absent")?;
            return Ok(0);
        }
    };
    writeln!(out, "token: present ({location})")?;

    match service.current_profile(false).await {
        Ok(Some(profile)) => {
            writeln!(
                out,
                "profile: {} <{}> id={} roles=[{}] complete={}",
                profile.name,
                profile.email,
                profile.id,
                profile.roles,
                profile.is_complete()
            )?;
            Ok(0)
        }
        Ok(None) => {
            writeln!(out, "profile: unavailable")?;
            Ok(0)
        }
        Err(e) => {
            writeln!(out, "profile: {e}")?;
            Ok(1)
        }
    }
}

/// Poll until `stop` resolves, printing each event as a JSON line.
pub async fn watch<A: AuthApi, W: Write, F: Future<Output = ()>>(
    service: &SessionService<A>,
    args: &WatchArgs,
    out: &mut W,
    stop: F,
) -> anyhow::Result<i32> {
    service.set_route(args.route.as_deref());
    let mut events = service.subscribe();
    service.start_poller();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Ok(event) => {
                    writeln!(out, "{}", serde_json::to_string(&event)?)?;
                    if let SessionEvent::ForcedSignOut { ref target } = event {
                        writeln!(out, "navigate {target}")?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    service.stop().await;
    Ok(0)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
