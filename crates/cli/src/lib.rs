use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use flags::{L1MatchFlag, UnparseableFinalFlag};
use report::{BatchReport, ProductReport};
use settings::AppConfig;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taxonav_funnel::{Classification, RecordingSink, StageFunnel, StageModels};
use taxonav_gateway::{CompletionGateway, OpenAiGateway, RetryingGateway};
use taxonav_taxonomy::TaxonomyIndex;

mod flags;
mod products;
mod report;
mod settings;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "taxonav")]
#[command(about = "Classify product descriptions into a hierarchical taxonomy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Taxonomy file, one "A > B > C" path per line after a header line
    #[arg(long, global = true, default_value = "data/taxonomy.en-US.txt")]
    taxonomy_file: PathBuf,

    /// TOML file with [funnel], [retry] and [gateway] sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single product description
    Classify(ClassifyArgs),

    /// Classify every line of a products file
    Batch(BatchArgs),

    /// Print taxonomy statistics (no API calls)
    Stats(StatsArgs),
}

#[derive(Args)]
struct ClassifierArgs {
    /// API key (default: OPENAI_API_KEY, then data/api_key.txt)
    #[arg(long)]
    api_key: Option<String>,

    /// Use this model for every stage
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// How stage 1 matches category names
    #[arg(long, value_enum)]
    l1_match: Option<L1MatchFlag>,

    /// What stage 3 does with an answer that contains no number
    #[arg(long, value_enum)]
    unparseable_final: Option<UnparseableFinalFlag>,

    /// Stage-2 batches sent at the same time
    #[arg(long)]
    max_concurrent_batches: Option<usize>,

    /// Show what every stage selected
    #[arg(long)]
    show_stages: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Product description, e.g. "iPhone 14: Smartphone with camera"
    text: String,

    #[command(flatten)]
    classifier: ClassifierArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// File with one product description per line
    #[arg(short, long)]
    file: PathBuf,

    /// Only classify the first N products
    #[arg(long)]
    limit: Option<usize>,

    #[command(flatten)]
    classifier: ClassifierArgs,
}

#[derive(Args)]
struct StatsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // stdout is reserved for results when emitting JSON
    let json_output = match &cli.command {
        Commands::Classify(args) => args.classifier.json,
        Commands::Batch(args) => args.classifier.json,
        Commands::Stats(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // reqwest/hyper connection chatter is only useful when debugging
    if !cli.verbose {
        builder.filter_module("reqwest", log::LevelFilter::Warn);
        builder.filter_module("hyper", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    match &cli.command {
        Commands::Classify(args) => run_classify(&cli, args).await?,
        Commands::Batch(args) => run_batch(&cli, args).await?,
        Commands::Stats(args) => run_stats(&cli, args)?,
    }

    Ok(())
}

fn load_taxonomy(path: &Path) -> Result<Arc<TaxonomyIndex>> {
    let index = TaxonomyIndex::from_file(path)
        .with_context(|| format!("Failed to load taxonomy {}", path.display()))?;
    Ok(Arc::new(index))
}

/// Config file, then command-line overrides, then the HTTP gateway
fn build_funnel(
    cli: &Cli,
    args: &ClassifierArgs,
    index: Arc<TaxonomyIndex>,
    sink: Arc<RecordingSink>,
) -> Result<StageFunnel> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    if let Some(model) = &args.model {
        config.funnel.models = StageModels::uniform(model.clone());
        config.gateway.default_model = model.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.gateway.base_url = base_url.clone();
    }
    if let Some(flag) = args.l1_match {
        config.funnel.l1_match = flag.as_domain();
    }
    if let Some(flag) = args.unparseable_final {
        config.funnel.unparseable_final = flag.as_domain();
    }
    if let Some(limit) = args.max_concurrent_batches {
        config.funnel.max_concurrent_batches = limit;
    }
    config.validate().context("Invalid settings")?;

    let env_key = env::var(settings::API_KEY_ENV).ok();
    let api_key = settings::resolve_api_key(
        args.api_key.as_deref(),
        env_key.as_deref(),
        &config.gateway.api_key,
        Path::new(settings::API_KEY_FILE),
    )
    .with_context(|| {
        format!(
            "No API key found. Pass --api-key, set {} or write it to {}",
            settings::API_KEY_ENV,
            settings::API_KEY_FILE
        )
    })?;
    if !settings::has_expected_key_format(&api_key) {
        log::warn!("API key does not start with 'sk-'; using it anyway");
    }
    config.gateway.api_key = api_key;

    log::info!(
        "Using {} (models: {}, {}, {}, {})",
        config.gateway.base_url,
        config.funnel.models.summary,
        config.funnel.models.top_level,
        config.funnel.models.leaf,
        config.funnel.models.final_selection
    );

    let http = OpenAiGateway::new(config.gateway).context("Failed to create API client")?;
    let gateway: Arc<dyn CompletionGateway> = Arc::new(RetryingGateway::new(http, config.retry));

    let funnel = StageFunnel::new(index, gateway, config.funnel)?.with_sink(sink);
    Ok(funnel)
}

async fn run_classify(cli: &Cli, args: &ClassifyArgs) -> Result<()> {
    let index = load_taxonomy(&cli.taxonomy_file)?;
    let sink = Arc::new(RecordingSink::new());
    let funnel = build_funnel(cli, &args.classifier, index, sink.clone())?;

    let text = args.text.trim();
    if text.is_empty() {
        anyhow::bail!("Product description is empty");
    }

    let classification = funnel.classify(text).await;
    let classified = classification.result.is_success();

    if args.classifier.json {
        let report = product_report(text, &classification, &args.classifier, &sink);
        print_stdout(&serde_json::to_string_pretty(&report)?)?;
    } else {
        if args.classifier.show_stages {
            print_stdout(&report::render_stages(&classification.trace))?;
        }
        print_stdout(&report::render_result(&classification.result))?;
    }

    if !classified {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_batch(cli: &Cli, args: &BatchArgs) -> Result<()> {
    let index = load_taxonomy(&cli.taxonomy_file)?;

    let mut lines = products::read_products(&args.file)?;
    if let Some(limit) = args.limit {
        lines.truncate(limit);
    }
    if lines.is_empty() {
        anyhow::bail!("No products found in {}", args.file.display());
    }

    let sink = Arc::new(RecordingSink::new());
    let funnel = build_funnel(cli, &args.classifier, index, sink.clone())?;

    log::info!("Classifying {} products", lines.len());

    let mut outcomes = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let title = products::product_title(line);
        let classification = funnel.classify(line).await;

        if !args.classifier.json {
            if args.classifier.show_stages {
                print_stdout(&format!("===== Product {} of {} =====", i + 1, lines.len()))?;
                print_stdout(&report::render_stages(&classification.trace))?;
            }
            print_stdout(&report::render_product(title, &classification))?;
            print_stdout("")?;
        }
        // drained every time so events never carry over to the next product
        let events = sink.take();
        outcomes.push((classification, events));
    }

    let classified = outcomes
        .iter()
        .filter(|(classification, _)| classification.result.is_success())
        .count();
    let failed = outcomes.len() - classified;

    if args.classifier.json {
        let products = lines
            .iter()
            .zip(&outcomes)
            .map(|(line, (classification, events))| ProductReport {
                product: line,
                title: products::product_title(line),
                result: &classification.result,
                trace: args
                    .classifier
                    .show_stages
                    .then_some(&classification.trace),
                events: if args.classifier.show_stages {
                    events.clone()
                } else {
                    Vec::new()
                },
            })
            .collect();
        let report = BatchReport {
            products,
            classified,
            failed,
        };
        print_stdout(&serde_json::to_string_pretty(&report)?)?;
    } else {
        eprintln!("{}", report::render_tally(classified, failed));
    }

    Ok(())
}

fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<()> {
    let index = load_taxonomy(&cli.taxonomy_file)?;
    let stats = index.stats();

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&stats)?)?;
    } else {
        print_stdout(&report::render_stats(&stats))?;
    }
    Ok(())
}

fn product_report<'a>(
    text: &'a str,
    classification: &'a Classification,
    args: &ClassifierArgs,
    sink: &RecordingSink,
) -> ProductReport<'a> {
    ProductReport {
        product: text,
        title: products::product_title(text),
        result: &classification.result,
        trace: args.show_stages.then_some(&classification.trace),
        events: if args.show_stages {
            sink.take()
        } else {
            Vec::new()
        },
    }
}
