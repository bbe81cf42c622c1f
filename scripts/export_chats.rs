//! Export one user's chats straight from the legacy store, skipping HTTP auth.
//!
//! Run with: cargo run --bin export_chats -- <user-id> [output.json]

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use deni_export::config::{database::PgResource, Settings};
use deni_export::modules::migration::crud::PgChatStore;
use deni_export::services::auth::OwnerId;
use deni_export::services::export::ExportService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "deni_export=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(owner) = args.next().and_then(OwnerId::new) else {
        bail!("usage: export_chats <user-id> [output.json]");
    };
    let output = args.next().unwrap_or_else(|| "message.json".to_string());

    let settings = Settings::from_env().context("loading configuration")?;
    let master = Arc::new(PgResource::master(&settings)?);

    let service = ExportService::new(
        Arc::new(PgChatStore::new(master.clone())),
        settings.query_timeout(),
        settings.normalize,
    );

    println!("Exporting chats for {owner}...");
    let result = service.export_document(&owner).await;
    master.shutdown().await;

    let document = result.context("export failed")?;
    tokio::fs::write(&output, document)
        .await
        .with_context(|| format!("writing {output}"))?;

    println!("✓ Wrote {output}");
    Ok(())
}
