//! RepoGraph command line entry point.
//!
//! Runs the selected passes in order: history, dependencies, categories.

use clap::Parser;
use repograph::categories::{CategorizeRequest, CategoryGenerator, CommandGenerator};
use repograph::{
    CategoryManager, Config, ConfigError, DependencyDriller, HistoryDriller, IngestResult,
    MergeEngine,
};
use repograph_store::RocksGraphStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "repograph")]
#[command(about = "Ingest repository history and structure into a property graph")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured project id
    #[arg(long)]
    project_id: Option<String>,

    /// Extra gitignore-style file for the dependency pass
    #[arg(long)]
    ignore_file: Option<PathBuf>,

    /// Drill git history
    #[arg(long)]
    run_history: bool,

    /// Extract static imports and keywords from the working tree
    #[arg(long)]
    run_deps: bool,

    /// Merge categories and file-category assignments
    #[arg(long)]
    categorize: bool,

    /// Generate categories for routes not covered yet (needs --routes and --generator-cmd)
    #[arg(long)]
    auto_categories: bool,

    /// JSON array of route strings
    #[arg(long)]
    routes: Option<PathBuf>,

    /// JSON array of {name, description?, url?}
    #[arg(long)]
    categories_json: Option<PathBuf>,

    /// JSON array of {path|hash|merge_hash, category, confidence?}
    #[arg(long)]
    assignments_json: Option<PathBuf>,

    /// Project whose taxonomy assignments refer to
    #[arg(long)]
    category_project_id: Option<String>,

    /// Program that reads routes JSON on stdin and prints categories JSON
    #[arg(long)]
    generator_cmd: Option<String>,

    /// Argument for --generator-cmd, passed as-is; repeat for each one
    #[arg(long = "generator-arg", allow_hyphen_values = true, action = clap::ArgAction::Append)]
    generator_args: Vec<String>,
}

fn load_json_list<T: DeserializeOwned>(path: Option<&Path>) -> IngestResult<Vec<T>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn report<T: Serialize>(pass: &str, summary: &T) -> IngestResult<()> {
    let json = serde_json::to_string_pretty(summary)?;
    tracing::info!("{} pass complete", pass);
    println!("{json}");
    Ok(())
}

async fn run(args: Args, cancel: CancellationToken) -> IngestResult<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_project_id(args.project_id.clone());
    config.validate()?;

    if !(args.run_history || args.run_deps || args.categorize || args.auto_categories) {
        tracing::warn!("Nothing to do: pass --run-history, --run-deps, --categorize or --auto-categories");
        return Ok(());
    }

    let project_id = config.project.project_id.clone();
    tracing::info!("Opening graph store at {:?}", config.store.path);
    let store = RocksGraphStore::open(&config.store.path)?.with_sync_writes(config.store.sync_writes);
    let engine = MergeEngine::new(Arc::new(store), config.engine_config());

    if args.run_history {
        let summary = HistoryDriller::new(engine.clone(), &project_id, &config.project.repo)?
            .with_branch(config.project.branch.clone())
            .with_max_commits(config.project.max_commits)
            .run(&cancel)
            .await?;
        report("history", &summary)?;
    }

    if args.run_deps && !cancel.is_cancelled() {
        let summary = DependencyDriller::new(
            engine.clone(),
            &project_id,
            &config.project.repo,
            config.ingest.clone(),
        )
        .with_ignore_file(args.ignore_file.clone())
        .run(&cancel)
        .await?;
        report("dependency", &summary)?;
    }

    if (args.categorize || args.auto_categories) && !cancel.is_cancelled() {
        let routes = if args.auto_categories {
            if args.routes.is_none() {
                return Err(ConfigError::invalid("--auto-categories requires --routes").into());
            }
            Some(load_json_list(args.routes.as_deref())?)
        } else {
            None
        };
        let generator = args
            .generator_cmd
            .as_ref()
            .and_then(|program| {
                let argv: Vec<String> = std::iter::once(program.clone())
                    .chain(args.generator_args.iter().cloned())
                    .collect();
                CommandGenerator::from_argv(&argv)
            })
            .map(|g| Arc::new(g) as Arc<dyn CategoryGenerator>);

        let manager = CategoryManager::new(&project_id, engine.clone())?
            .with_category_project(args.category_project_id.clone());
        let summary = manager
            .categorize(CategorizeRequest {
                categories: load_json_list(args.categories_json.as_deref())?,
                assignments: load_json_list(args.assignments_json.as_deref())?,
                routes,
                generator,
            })
            .await?;
        report("category", &summary)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repograph=info,repograph_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current group");
            on_signal.cancel();
        }
    });

    if let Err(e) = run(args, cancel).await {
        tracing::error!("repograph failed: {}", e);
        std::process::exit(1);
    }
}
