use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use pricewatch_core::{
    CatalogEntry, Document, FetchConfig, Fetcher, HealConfig, ProductRecord, RuleSet, SelfHealer,
    build_category_groups, confidence_after, discover, discover_categories, extract_products,
    match_catalog, repair_rules,
};
use tracing_subscriber::EnvFilter;
use url::Url;

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extract competitor product and category data from web pages
#[derive(Parser, Debug)]
#[command(name = "pricewatch")]
#[command(version = VERSION)]
#[command(about = "Extract competitor product and category data from web pages", long_about = None)]
struct Args {
    /// Target URL or local HTML file
    #[arg(value_name = "INPUT")]
    input: String,

    /// Discover the category tree instead of extracting products
    #[arg(long)]
    categories: bool,

    /// Selector rules JSON file
    #[arg(short, long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Persist repaired rules back to the rules file
    #[arg(long)]
    save_rules: bool,

    /// Match extracted products against a catalog JSON file
    #[arg(long, value_name = "FILE")]
    match_catalog: Option<PathBuf>,

    /// Base URL for resolving links when the input is a local file
    #[arg(long, value_name = "URL", default_value = "http://localhost/")]
    base_url: String,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "20", value_name = "SECS")]
    timeout: u64,

    /// Bypass cookies: raw Cookie header value or a JSON object
    /// (defaults to the PRICEWATCH_COOKIES environment variable)
    #[arg(long, value_name = "COOKIES")]
    cookies: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_rules(path: Option<&Path>) -> anyhow::Result<RuleSet> {
    match path {
        Some(path) if path.exists() => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse rules file: {}", path.display()))
        }
        _ => Ok(RuleSet::new()),
    }
}

fn save_rules(path: &Path, rules: &RuleSet) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(rules).context("Failed to serialize rules")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write rules file: {}", path.display()))?;
    Ok(())
}

/// Products from an already-fetched page, repairing dead rules in place.
fn extract_with_local_repair(
    doc: &Document, rules: &RuleSet, page_url: &Url,
) -> pricewatch_core::Result<(Vec<ProductRecord>, RuleSet, bool, f64)> {
    let config = HealConfig::default();
    match extract_products(doc, rules, page_url) {
        Ok(records) => Ok((records, rules.clone(), false, config.confidence_ceiling)),
        Err(error) if error.is_extraction_failure() => {
            let repair = repair_rules(doc, rules, &config);
            let records = extract_products(doc, &repair.rules, page_url)?;
            let confidence = confidence_after(repair.unresolved, &config);
            Ok((records, repair.rules, true, confidence))
        }
        Err(error) => Err(error),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.verbose {
        echo::print_banner();
    }

    let rules = load_rules(args.rules.as_deref())?;
    let is_url = args.input.starts_with("http://") || args.input.starts_with("https://");

    let (payload, repaired_rules) = if is_url {
        run_remote(&args, &rules).await?
    } else {
        run_local(&args, &rules)?
    };

    if let (Some(repaired), Some(path)) = (&repaired_rules, args.rules.as_deref()) {
        if args.save_rules {
            save_rules(path, repaired)?;
            echo::print_success(&format!("Repaired rules saved to {}", path.display()));
        } else {
            echo::print_warning("Rules were repaired; pass --save-rules to persist the fix");
        }
    }

    let output = if args.pretty {
        serde_json::to_string_pretty(&payload)?
    } else {
        serde_json::to_string(&payload)?
    };

    match args.output {
        Some(path) => {
            fs::write(&path, output)
                .with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => println!("{}", output),
    }

    Ok(())
}

/// Fetch-and-extract over the network, with the full self-heal loop.
async fn run_remote(
    args: &Args, rules: &RuleSet,
) -> anyhow::Result<(serde_json::Value, Option<RuleSet>)> {
    let cookies =
        args.cookies.clone().or_else(|| std::env::var("PRICEWATCH_COOKIES").ok());
    let fetch_config =
        FetchConfig { timeout: args.timeout, bypass_cookies: cookies, ..Default::default() };
    let fetcher = Fetcher::with_config(fetch_config).context("Failed to build HTTP client")?;

    if args.categories {
        if args.verbose {
            echo::print_step(1, 2, &format!("Discovering categories on {}", args.input));
        }
        let groups = discover(&fetcher, &args.input, rules)
            .await
            .context("Category discovery failed")?;
        if args.verbose {
            echo::print_step(2, 2, &format!("Grouped {} top-level categories", groups.len()));
        }
        return Ok((serde_json::to_value(groups)?, None));
    }

    if args.verbose {
        echo::print_step(1, 2, &format!("Scraping {}", args.input.bright_white().underline()));
    }

    let healer = SelfHealer::new(fetcher);
    let outcome =
        healer.scrape_category(&args.input, rules).await.context("Extraction failed")?;

    if args.verbose {
        echo::print_step(2, 2, &format!("Extracted {} records", outcome.records.len()));
    }
    if outcome.repaired {
        echo::print_info(&format!(
            "Selector rules were repaired (confidence {:.2})",
            outcome.confidence
        ));
    }

    let payload = finish_products(args, outcome.records)?;
    Ok((payload, outcome.repaired.then_some(outcome.rules)))
}

/// Extract from a local HTML file without touching the network.
fn run_local(args: &Args, rules: &RuleSet) -> anyhow::Result<(serde_json::Value, Option<RuleSet>)> {
    let base_url = Url::parse(&args.base_url).context("Invalid --base-url")?;

    if args.verbose {
        echo::print_step(1, 2, &format!("Reading from file {}", args.input.bright_white()));
    }
    let html = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read file: {}", args.input))?;
    if args.verbose {
        echo::print_info(&format!("Size: {}", echo::format_size(html.len())));
    }

    let doc = Document::parse(&html);

    if args.categories {
        let categories = discover_categories(&doc, &base_url, rules);
        let groups = build_category_groups(&categories);
        if args.verbose {
            echo::print_step(2, 2, &format!("Grouped {} top-level categories", groups.len()));
        }
        return Ok((serde_json::to_value(groups)?, None));
    }

    let (records, new_rules, repaired, confidence) =
        extract_with_local_repair(&doc, rules, &base_url).context("Extraction failed")?;

    if args.verbose {
        echo::print_step(2, 2, &format!("Extracted {} records", records.len()));
    }
    if repaired {
        echo::print_info(&format!("Selector rules were repaired (confidence {:.2})", confidence));
    }

    let payload = finish_products(args, records)?;
    Ok((payload, repaired.then_some(new_rules)))
}

/// Serializes records, optionally matched against the operator's catalog.
fn finish_products(args: &Args, records: Vec<ProductRecord>) -> anyhow::Result<serde_json::Value> {
    match &args.match_catalog {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
            let ours: Vec<CatalogEntry> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
            let matches = match_catalog(&ours, &records);
            Ok(serde_json::to_value(matches)?)
        }
        None => Ok(serde_json::to_value(records)?),
    }
}
