//! `sard-wiki`: edit wiki entities of a Sard novel from the terminal.
//!
//! Every invocation is one editing session: the entity is fetched, the
//! requested edits are applied to the working copy and the dirty groups are
//! saved independently.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use services::services::{
    auth::{NoToken, StaticToken, TokenProvider},
    config::ClientConfig,
    query_cache::QueryCache,
    wiki_api::{WikiApiClient, WikiBackend},
};

mod args;
mod commands;

use args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init_tracing(cli.verbose);

    let mut config =
        ClientConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(url) = cli.api_url.clone() {
        config.api_base_url = url;
    }
    if let Some(token) = cli.token.clone() {
        config.token = Some(SecretString::from(token));
    }

    let tokens: Arc<dyn TokenProvider> = match config.token.clone() {
        Some(token) => Arc::new(StaticToken::from(token)),
        None => Arc::new(NoToken),
    };
    let backend: Arc<dyn WikiBackend> = Arc::new(
        WikiApiClient::from_config(&config, tokens).context("failed to build http client")?,
    );
    let cache = QueryCache::new(config.cache_ttl());

    commands::run(cli.command, backend, cache).await
}
