use std::io::Read;

use anyhow::Context;
use complimap::config::AppConfig;
use complimap::llm::HttpModelClient;
use complimap::repo::FsRepository;
use complimap::services::steps;
use complimap::store::FsObjectStore;
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Orchestrator-invoked worker: `complimap <step>` with the step's JSON
/// payload on stdin. Prints the step result as JSON on stdout.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "complimap=debug".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let step = std::env::args()
        .nth(1)
        .context("usage: complimap <step> (JSON payload on stdin)")?;

    let mut payload = String::new();
    std::io::stdin()
        .read_to_string(&mut payload)
        .context("failed to read step payload from stdin")?;

    let config = AppConfig::from_env();
    let store = FsObjectStore::new(format!("{}/objects", config.data_dir));
    let repo = FsRepository::new(format!("{}/state", config.data_dir));

    match step.as_str() {
        "prepareFindingsAssociations" => {
            let input = serde_json::from_str(&payload)?;
            let uris =
                steps::prepare_findings_associations(&store, &repo, &config, &input).await?;
            println!("{}", serde_json::to_string(&uris)?);
        }
        "associateFindingsChunkToBestPractices" => {
            let input = serde_json::from_str(&payload)?;
            let client = HttpModelClient::new(&config)?;
            steps::associate_findings_chunk_to_best_practices(
                &store, &repo, &client, &config, &input,
            )
            .await?;
            println!("null");
        }
        "computeGraphData" => {
            let input = serde_json::from_str(&payload)?;
            steps::compute_graph_data(&repo, &input).await?;
            println!("null");
        }
        "cleanup" => {
            let input = serde_json::from_str(&payload)?;
            steps::cleanup(&store, &config, &input).await?;
            println!("null");
        }
        other => anyhow::bail!("unknown step: {other}"),
    }

    Ok(())
}
