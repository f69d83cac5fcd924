//! Walks one message through insertion, a blocked submit, editing, a
//! preprocessor run, and delivery.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use prompt_composer::config::ComposerConfig;
use prompt_composer::document::Document;
use prompt_composer::engine::{
    ChatTransport, CollectingObserver, Composer, ComposerEvent, ComposerObserver, CompositeObserver,
    EngineResult, SubmitOutcome, TracingObserver,
};
use prompt_composer::primitives::TemplateKey;
use prompt_composer::telemetry::init_tracing;
use prompt_composer::templates::{
    Block, BlockRole, InMemoryTemplateStore, PreProcessorCall, TemplateDefinition, Variable,
    VariableSource, VariableType,
};
use prompt_composer::tools::{ToolMetadata, ToolRegistry};
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Compose and send one templated chat message")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Value typed into the `topic` marker.
    #[arg(long, default_value = "tide pools")]
    topic: String,
    /// Audience, one of `kids`, `adults`, `experts`.
    #[arg(long, default_value = "adults")]
    audience: String,
}

struct StdoutTransport;

#[async_trait]
impl ChatTransport for StdoutTransport {
    async fn send(&self, text: &str) -> EngineResult<()> {
        println!("--- sent ---\n{text}\n------------");
        Ok(())
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ComposerConfig> {
    let mut config = match path {
        Some(path) => ComposerConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ComposerConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

fn briefing_template() -> TemplateDefinition {
    TemplateDefinition::new("Research briefing")
        .with_block(
            Block::new("system", "You are a careful science writer for {{audience}}.")
                .with_role(BlockRole::System),
        )
        .with_block(Block::new(
            "ask",
            "Write a briefing on {{topic}} as of {{as_of}}. Background: {{background}}",
        ))
        .with_variable(
            Variable::new("topic", VariableType::String)
                .required()
                .with_description("Subject of the briefing"),
        )
        .with_variable(
            Variable::new("audience", VariableType::Enum)
                .with_enum_values(["kids", "adults", "experts"])
                .with_default("adults"),
        )
        .with_variable(Variable::new("as_of", VariableType::Date).with_static("2024-01-01"))
        .with_variable(
            Variable::new("background", VariableType::String)
                .with_source(VariableSource::Tool)
                .required(),
        )
        .with_pre_processor(
            PreProcessorCall::new("lookup", "encyclopedia", "background")
                .with_arg("query", "{{topic}}")
                .with_path_expr("$.entries[0].summary"),
        )
}

fn encyclopedia() -> Result<ToolRegistry> {
    let tools = ToolRegistry::new();
    tools.register_tool(
        ToolMetadata::new("encyclopedia", "1.0.0")?.with_description("Canned encyclopedia lookup"),
        |args: Value| async move {
            let query = args["query"].as_str().unwrap_or_default().to_owned();
            Ok(json!({
                "entries": [{
                    "title": query,
                    "summary": format!("{query} are shaped by the tides."),
                }]
            }))
        },
    )?;
    Ok(tools)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    init_tracing(&config.telemetry)?;

    let key = TemplateKey::new("demo", "briefing", "1")?;
    let store = InMemoryTemplateStore::new();
    store.insert(key.clone(), briefing_template()).await?;

    let events = CollectingObserver::new();
    let observer = CompositeObserver::new([
        Arc::new(TracingObserver) as Arc<dyn ComposerObserver>,
        events.clone() as Arc<dyn ComposerObserver>,
    ]);
    let composer = Composer::new(Arc::new(store), Arc::new(encyclopedia()?))
        .with_config(config)
        .with_observer(Arc::new(observer));

    let mut doc = Document::from_text("Hi! Quick request:");
    let selection = composer.insert_template(&mut doc, &key, &[1]).await?;
    info!(%selection, preview = %composer.plain_text(&doc), "template inserted");

    let outcome = composer.submit(&mut doc, &StdoutTransport).await?;
    let SubmitOutcome::Blocked(report) = outcome else {
        bail!("an unfilled template should not be sendable");
    };
    info!(
        required = report.required_count,
        pending = report.pending_tool_count,
        blocker = ?report.first_blocker,
        "submission blocked"
    );

    composer.commit_variable(&mut doc, selection, "topic", &args.topic)?;
    composer.commit_variable(&mut doc, selection, "audience", &args.audience)?;
    composer.mark_tool_ready(&mut doc, selection, "lookup")?;

    match composer.submit(&mut doc, &StdoutTransport).await? {
        SubmitOutcome::Sent(text) => info!(bytes = text.len(), "message delivered"),
        SubmitOutcome::ToolsFailed(run) => bail!("preprocessors failed: {:?}", run.errors),
        SubmitOutcome::Blocked(report) => bail!("still blocked: {:?}", report.first_blocker),
    }

    let flashes = events
        .drain()
        .iter()
        .filter(|event| matches!(event, ComposerEvent::Flash { .. }))
        .count();
    info!(flashes, "walkthrough finished");
    Ok(())
}
