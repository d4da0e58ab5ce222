use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use papernav_core::types::{Document, MetadataRecord, SearchMode};
use papernav_hybrid::AppContext;
use papernav_index::{BuildReport, LoadOutcome};

const USAGE: &str = "Usage: papernav <index <corpus.jsonl> | search <query> [--k N] [--mode text|hybrid] [--cluster] | stats | reset>";

#[derive(Deserialize)]
struct CorpusLine {
    document: Document,
    #[serde(default)]
    metadata: MetadataRecord,
}

#[derive(Serialize)]
struct RejectedLine {
    line: usize,
    reason: String,
}

#[derive(Serialize)]
struct IndexSummary {
    build: BuildReport,
    rejected_lines: Vec<RejectedLine>,
    n_documents: usize,
}

struct SearchArgs {
    query: String,
    k: Option<usize>,
    mode: SearchMode,
    cluster: bool,
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

fn parse_search_args(args: &[String]) -> anyhow::Result<SearchArgs> {
    let mut words = Vec::new();
    let (mut k, mut mode, mut cluster) = (None, SearchMode::default(), false);
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--k" | "-k" => { let v = args.get(i + 1).context("--k requires a number")?; k = Some(v.parse::<usize>().with_context(|| format!("--k requires a number, got '{v}'"))?); i += 1; }
            "--mode" | "-m" => { let v = args.get(i + 1).context("--mode requires text or hybrid")?; mode = v.parse()?; i += 1; }
            "--cluster" | "-c" => cluster = true,
            other if other.starts_with('-') => bail!("unknown flag '{other}'\n{USAGE}"),
            word => words.push(word.to_string()),
        }
        i += 1;
    }
    if words.is_empty() { bail!("search needs a query\n{USAGE}"); }
    Ok(SearchArgs { query: words.join(" "), k, mode, cluster })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn index_corpus(ctx: &AppContext, path: &Path) -> anyhow::Result<()> {
    let outcome = ctx.open_index();
    if let LoadOutcome::Corrupt(reason) = &outcome { warn!(%reason, "rebuilding from an empty index"); }
    let file = File::open(path).with_context(|| format!("cannot open corpus {}", path.display()))?;
    let mut rejected_lines = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let added = serde_json::from_str::<CorpusLine>(&line)
            .map_err(|e| e.to_string())
            .and_then(|c| ctx.engine().add(c.document, c.metadata).map_err(|e| e.to_string()));
        if let Err(reason) = added {
            warn!(line = n + 1, %reason, "skipping corpus line");
            rejected_lines.push(RejectedLine { line: n + 1, reason });
        }
    }
    let build = ctx.engine().build()?;
    ctx.engine().save()?;
    let n_documents = ctx.engine().stats().n_documents;
    info!(n_documents, "index saved");
    print_json(&IndexSummary { build, rejected_lines, n_documents })
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let (cmd, args) = parse_args();
    let ctx = AppContext::from_config().context("failed to load configuration")?;
    match cmd.as_str() {
        "index" => {
            let Some(path) = args.first().map(PathBuf::from) else { bail!("index needs a corpus file\n{USAGE}") };
            index_corpus(&ctx, &path)?;
        }
        "search" => {
            let search = parse_search_args(&args)?;
            ctx.open_index();
            let response = ctx.engine().respond(&search.query, search.k, search.mode, search.cluster)?;
            print_json(&response)?;
        }
        "stats" => {
            ctx.open_index();
            print_json(&ctx.engine().stats())?;
        }
        "reset" => {
            ctx.engine().reset();
            print_json(&serde_json::json!({ "reset": true, "index_dir": ctx.settings().data.index_dir() }))?;
        }
        _ => { eprintln!("Unknown command: {cmd}\n{USAGE}"); std::process::exit(1); }
    }
    Ok(())
}
