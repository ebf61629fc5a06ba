// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harmonia::{
    compare_conditions, create_orchestrator, AffectScores, ConsentGate, CrisisDetector,
    EngineConfig, EngineError, FailureRoute, FileProfileStore, ProfileStore, ProfileSummary,
    SessionInput, StaticConsent,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_PROFILE_DIR: &str = "./profiles";

#[derive(Parser, Debug, Clone)]
#[command(name = "harmonia", about = "Adaptive music therapy personalisation engine")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured profile directory.
    #[arg(long, global = true)]
    profile_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Scan a piece of text for crisis signals.
    Crisis { text: String },

    /// Run one session from text check-ins and persist the outcome.
    Session {
        #[arg(long)]
        user: String,

        /// Opening check-in.
        #[arg(long)]
        text: String,

        /// Later check-ins, one monitor tick each.
        #[arg(long = "follow-up")]
        follow_ups: Vec<String>,

        #[arg(long, requires = "post_panas")]
        pre_panas: Option<f64>,

        #[arg(long, requires = "pre_panas")]
        post_panas: Option<f64>,

        /// Confirms the user agreed to emotion analysis and personalisation.
        #[arg(long)]
        consent: bool,
    },

    /// Print what has been learned for a user.
    Summary {
        #[arg(long)]
        user: String,
    },

    /// Effect size between two comma-separated improvement samples.
    Compare {
        #[arg(long, value_delimiter = ',')]
        adaptive: Vec<f64>,

        #[arg(long, value_delimiter = ',')]
        baseline: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.cmd {
        Command::Crisis { text } => run_crisis(&config, &text),
        Command::Session {
            user,
            text,
            follow_ups,
            pre_panas,
            post_panas,
            consent,
        } => {
            let store = open_store(&config, cli.profile_dir.as_deref()).await?;
            let affect = pre_panas
                .zip(post_panas)
                .map(|(pre, post)| AffectScores::new(pre, post));
            run_session(config, store, &user, &text, &follow_ups, affect, consent).await
        }
        Command::Summary { user } => {
            let store = open_store(&config, cli.profile_dir.as_deref()).await?;
            run_summary(store.as_ref(), &user).await
        }
        Command::Compare { adaptive, baseline } => {
            let comparison = compare_conditions(&adaptive, &baseline)?;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
            Ok(())
        }
    }
}

async fn open_store(config: &EngineConfig, override_dir: Option<&Path>) -> Result<Arc<dyn ProfileStore>> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| config.storage.profile_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE_DIR));
    let store = FileProfileStore::new(&dir)
        .await
        .with_context(|| format!("opening profile store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn run_crisis(config: &EngineConfig, text: &str) -> Result<()> {
    let detector = CrisisDetector::new(config.crisis.clone());
    let result = detector.detect(text);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_session(
    config: EngineConfig,
    store: Arc<dyn ProfileStore>,
    user: &str,
    text: &str,
    follow_ups: &[String],
    affect: Option<AffectScores>,
    consent: bool,
) -> Result<()> {
    let gate: Arc<dyn ConsentGate> = if consent {
        Arc::new(StaticConsent::granted().grant_all(user))
    } else {
        Arc::new(StaticConsent::DenyAll)
    };
    let mut orchestrator = create_orchestrator(user, config, gate, store).await?;

    if let Err(error) = orchestrator.initialize().await {
        // Crisis text must still reach the resource flow without consent.
        let crisis = orchestrator.check_crisis(text).await;
        report_failure(orchestrator.route_error(&error), &error);
        if !crisis.resources.is_empty() {
            println!("{}", serde_json::to_string_pretty(&crisis)?);
        }
        return Err(error.into());
    }

    let decision = orchestrator.start(SessionInput::text(text)).await?;
    println!("{}", serde_json::to_string_pretty(&decision)?);

    for follow_up in follow_ups {
        let report = orchestrator.monitor(SessionInput::text(follow_up.as_str())).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    match orchestrator.end(affect).await {
        Ok(outcome) => {
            info!(user_id = user, reward = outcome.reward, "Session complete");
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Err(error) => {
            report_failure(orchestrator.route_error(&error), &error);
            if orchestrator.has_pending_save() {
                warn!(user_id = user, "Retrying profile save");
                orchestrator.persist_profile().await?;
            }
        }
    }

    let referral = orchestrator.referral();
    if referral.should_refer {
        println!("{}", serde_json::to_string_pretty(&referral)?);
    }
    Ok(())
}

fn report_failure(route: FailureRoute, error: &EngineError) {
    match route {
        FailureRoute::CollectConsent => {
            eprintln!("Consent is needed before a session can start: {error}")
        }
        FailureRoute::DiscloseResources => {
            eprintln!("Please reach out for support now. Resources follow.")
        }
        FailureRoute::TryAgain => eprintln!("Something went wrong, please try again: {error}"),
    }
}

async fn run_summary(store: &dyn ProfileStore, user: &str) -> Result<()> {
    let profile = store
        .load_profile(user)
        .await?
        .with_context(|| format!("no profile stored for {user}"))?;
    let summary = ProfileSummary::from_profile(&profile);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_dir_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("override");
        let mut config = EngineConfig::default();
        config.storage.profile_dir = Some(dir.path().join("configured").display().to_string());

        let store = open_store(&config, Some(&target)).await.unwrap();
        assert!(target.is_dir());
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[test]
    fn test_cli_parses_session_flags() {
        let cli = Cli::parse_from([
            "harmonia",
            "session",
            "--user",
            "alice",
            "--text",
            "I feel sad",
            "--follow-up",
            "a bit better",
            "--pre-panas",
            "20",
            "--post-panas",
            "28",
            "--consent",
        ]);
        match cli.cmd {
            Command::Session {
                follow_ups,
                pre_panas,
                consent,
                ..
            } => {
                assert_eq!(follow_ups, vec!["a bit better".to_string()]);
                assert_eq!(pre_panas, Some(20.0));
                assert!(consent);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
