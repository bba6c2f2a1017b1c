use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wiki_indexer::{
    config::Config,
    indexing::{gather_metrics, RebuildRequest, RebuildStatus},
    search::SearchRequest,
    store::{InMemoryContentStore, PlainTextExtractor},
    IndexService,
};

#[derive(Parser)]
#[command(name = "wiki-indexer")]
#[command(version, about = "Wiki full-text indexer", long_about = None)]
struct Cli {
    /// Primary index directory, overrides the configuration
    #[arg(short, long, env = "WIKI_INDEXER_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a JSON corpus
    Rebuild {
        /// Corpus file with pages and attachment texts
        #[arg(short, long)]
        corpus: PathBuf,

        /// Wikis to rebuild, all of them when omitted
        #[arg(short, long)]
        wiki: Vec<String>,

        /// Skip pages already indexed at the same version
        #[arg(long)]
        only_unindexed: bool,

        /// Wipe the rebuilt wikis first
        #[arg(long)]
        clear: bool,
    },

    /// Query the index
    Search {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Sort keys, prefix with '-' for descending order
        #[arg(short, long)]
        sort: Vec<String>,

        /// Comma separated wikis
        #[arg(short, long)]
        wiki: Option<String>,

        /// Comma separated languages, empty entry for the default language
        #[arg(short, long)]
        lang: Option<String>,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Search these index directories instead of the configured ones
        #[arg(long)]
        index: Vec<PathBuf>,

        /// Corpus used to resolve attachment download references
        #[arg(short, long)]
        corpus: Option<PathBuf>,
    },

    /// Show index statistics
    Stats {
        /// Also print Prometheus metrics
        #[arg(short, long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load();
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    if let Some(dir) = cli.index_dir {
        config.index.primary_dir = dir;
    }
    let json_logs = cli.json_logs || config.observability.json_logs;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("wiki_indexer={}", config.observability.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Err(e) = loaded {
        tracing::warn!(error = %e, "Failed to load configuration, using defaults");
    }

    match cli.command {
        Commands::Rebuild {
            corpus,
            wiki,
            only_unindexed,
            clear,
        } => {
            let store = InMemoryContentStore::from_corpus_file(&corpus)
                .with_context(|| format!("failed to load corpus {}", corpus.display()))?;
            tracing::info!(pages = store.page_count(), "Corpus loaded");

            let service =
                IndexService::start(&config, Arc::new(store), Arc::new(PlainTextExtractor::new()))
                    .await?;

            // a freshly created index is already being rebuilt
            let request = RebuildRequest::all()
                .with_partitions(wiki)
                .only_unindexed(only_unindexed)
                .clear_index(clear);
            if service.start_rebuild(request)? == RebuildStatus::AlreadyRunning {
                tracing::info!("Joining the rebuild already in progress");
            }

            let mut totals = wiki_indexer::indexing::CycleReport::default();
            loop {
                let report = service.flush().await?;
                totals.indexed += report.indexed;
                totals.deleted += report.deleted;
                totals.failed += report.failed;
                totals.repairs += report.repairs;

                if !service.is_rebuilding() && service.queue_depth() == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            let progress = service.rebuild_progress();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "progress": progress,
                    "committed": totals,
                    "indexed_count": service.indexed_count(),
                }))?
            );
            service.shutdown().await;
        }

        Commands::Search {
            query,
            sort,
            wiki,
            lang,
            limit,
            offset,
            index,
            corpus,
        } => {
            let store = match corpus {
                Some(path) => InMemoryContentStore::from_corpus_file(&path)
                    .with_context(|| format!("failed to load corpus {}", path.display()))?,
                None => InMemoryContentStore::new(),
            };
            config.rebuild.rebuild_on_empty_index = false;
            let service =
                IndexService::start(&config, Arc::new(store), Arc::new(PlainTextExtractor::new()))
                    .await?;

            let mut request = SearchRequest::new(query)
                .with_sort(sort)
                .with_limit(limit)
                .with_offset(offset);
            if let Some(wiki) = wiki {
                request = request.with_partition_list(&wiki);
            }
            if let Some(lang) = lang {
                request = request.with_language_list(&lang);
            }

            let results = if index.is_empty() {
                service.search(&request).await?
            } else {
                service.search_indexes(&request, &index).await?
            };
            println!("{}", serde_json::to_string_pretty(&results)?);
            service.shutdown().await;
        }

        Commands::Stats { metrics } => {
            config.rebuild.rebuild_on_empty_index = false;
            let service = IndexService::start(
                &config,
                Arc::new(InMemoryContentStore::new()),
                Arc::new(PlainTextExtractor::new()),
            )
            .await?;

            println!("{}", serde_json::to_string_pretty(&service.stats())?);
            if metrics {
                println!("{}", gather_metrics());
            }
            service.shutdown().await;
        }
    }

    Ok(())
}
