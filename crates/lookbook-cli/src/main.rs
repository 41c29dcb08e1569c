use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lookbook_contracts::api::{CropRequestBody, GenerateRequestBody};
use lookbook_contracts::crop::CropRect;
use lookbook_contracts::error::StudioError;
use lookbook_engine::config::EngineConfig;
use lookbook_engine::StudioEngine;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lookbook", version, about = "Multi-angle product photo generation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one batch of angles for a product and update its gallery.
    Generate(GenerateArgs),
    /// Crop, resize and sharpen an image, then store the result.
    Crop(CropArgs),
    /// Report profiles, angles and configured collaborators.
    Capabilities,
    /// Run JSON-lines generation jobs one product at a time.
    Bulk(BulkArgs),
    /// List ledger records for a product.
    History(HistoryArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    product: String,
    #[arg(long)]
    requested_by: Option<String>,
    /// JSON request body file (`-` for stdin); flags below are ignored when set.
    #[arg(long)]
    request: Option<PathBuf>,
    #[arg(long = "source")]
    sources: Vec<String>,
    #[arg(long = "angle")]
    angles: Vec<String>,
    #[arg(long)]
    profile: Option<String>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    color_reference: Option<String>,
    #[arg(long)]
    max_images: Option<u32>,
    /// Append generated images after the existing gallery instead of before it.
    #[arg(long)]
    append: bool,
}

#[derive(Debug, Parser)]
struct CropArgs {
    #[arg(long)]
    image: String,
    #[arg(long)]
    x: f64,
    #[arg(long)]
    y: f64,
    #[arg(long)]
    width: f64,
    #[arg(long)]
    height: f64,
    #[arg(long)]
    aspect: Option<String>,
    #[arg(long)]
    long_edge: Option<f64>,
}

#[derive(Debug, Parser)]
struct BulkArgs {
    /// JSON-lines file of `{"productId": ..., "request": {...}}` (`-` for stdin).
    #[arg(long)]
    jobs: PathBuf,
    #[arg(long)]
    requested_by: Option<String>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long)]
    product: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lookbook error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let engine = StudioEngine::from_config(EngineConfig::from_env());
    let mut stdout = io::stdout().lock();
    match cli.command {
        Command::Generate(args) => {
            let body = generate_body(&args)?;
            let result = engine.generate(&args.product, args.requested_by.as_deref(), body);
            emit(&engine, &mut stdout, result)
        }
        Command::Crop(args) => {
            let result = engine.crop(crop_body(args));
            emit(&engine, &mut stdout, result)
        }
        Command::Capabilities => {
            write_json(&mut stdout, &serde_json::to_value(engine.capabilities())?)?;
            Ok(0)
        }
        Command::Bulk(args) => {
            let reader = open_input(&args.jobs)?;
            let summary = run_bulk(&engine, reader, &mut stdout, args.requested_by.as_deref())?;
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "bulk run finished"
            );
            Ok(summary.exit_code())
        }
        Command::History(args) => {
            let result = engine.history(&args.product);
            emit(&engine, &mut stdout, result)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

/// Success prints the response; a studio error prints its payload and exits 1.
fn emit<T: serde::Serialize>(
    engine: &StudioEngine,
    out: &mut impl Write,
    result: Result<T, StudioError>,
) -> Result<i32> {
    match result {
        Ok(value) => {
            write_json(out, &serde_json::to_value(value)?)?;
            Ok(0)
        }
        Err(err) => {
            warn!(status = err.status(), code = err.code().as_str(), "request failed");
            write_json(out, &serde_json::to_value(engine.error_payload(&err))?)?;
            Ok(1)
        }
    }
}

fn write_json(out: &mut impl Write, value: &Value) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn generate_body(args: &GenerateArgs) -> Result<GenerateRequestBody> {
    if let Some(path) = &args.request {
        let mut raw = String::new();
        open_input(path)?
            .read_to_string(&mut raw)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("invalid generate request in {}", path.display()));
    }
    if args.sources.is_empty() {
        bail!("pass --request or at least one --source");
    }
    Ok(GenerateRequestBody {
        source_image_urls: args.sources.clone(),
        color_reference_image_url: args.color_reference.clone(),
        preferred_profile_id: args.profile.clone(),
        custom_prompt: args.prompt.clone(),
        target_color: args.color.clone(),
        angles: (!args.angles.is_empty()).then(|| args.angles.clone()),
        place_first: Some(!args.append),
        max_images: args.max_images,
        ..GenerateRequestBody::default()
    })
}

fn crop_body(args: CropArgs) -> CropRequestBody {
    CropRequestBody {
        image_url: args.image,
        crop: CropRect {
            x: args.x,
            y: args.y,
            width: args.width,
            height: args.height,
        },
        aspect: args.aspect,
        target_long_edge: args.long_edge,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BulkSummary {
    succeeded: usize,
    failed: usize,
}

impl BulkSummary {
    /// Non-zero only when every job failed.
    fn exit_code(&self) -> i32 {
        if self.failed > 0 && self.succeeded == 0 {
            1
        } else {
            0
        }
    }
}

#[derive(Debug)]
struct BulkJob {
    product_id: String,
    requested_by: Option<String>,
    body: GenerateRequestBody,
}

fn parse_bulk_line(line: &str) -> Result<BulkJob> {
    let value: Value = serde_json::from_str(line).context("job line is not valid JSON")?;
    let product_id = value
        .get("productId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .context("job is missing productId")?
        .to_string();
    let requested_by = value
        .get("requestedBy")
        .and_then(Value::as_str)
        .map(str::to_string);
    let body = serde_json::from_value(value.get("request").cloned().unwrap_or_else(|| json!({})))
        .context("job request is not a valid generate request")?;
    Ok(BulkJob {
        product_id,
        requested_by,
        body,
    })
}

/// One result line per job; earlier successes are kept when later jobs fail.
fn run_bulk(
    engine: &StudioEngine,
    reader: impl BufRead,
    out: &mut impl Write,
    default_requested_by: Option<&str>,
) -> Result<BulkSummary> {
    let mut summary = BulkSummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read job file")?;
        if line.trim().is_empty() {
            continue;
        }
        let row = match parse_bulk_line(&line) {
            Ok(job) => {
                let requested_by = job.requested_by.as_deref().or(default_requested_by);
                match engine.generate(&job.product_id, requested_by, job.body) {
                    Ok(response) => {
                        summary.succeeded += 1;
                        json!({
                            "line": index + 1,
                            "productId": job.product_id,
                            "ok": true,
                            "response": response,
                        })
                    }
                    Err(err) => {
                        summary.failed += 1;
                        warn!(
                            line = index + 1,
                            product_id = job.product_id.as_str(),
                            status = err.status(),
                            "bulk job failed"
                        );
                        json!({
                            "line": index + 1,
                            "productId": job.product_id,
                            "ok": false,
                            "status": err.status(),
                            "error": engine.error_payload(&err),
                        })
                    }
                }
            }
            Err(err) => {
                summary.failed += 1;
                warn!(line = index + 1, "skipping malformed bulk job");
                json!({
                    "line": index + 1,
                    "ok": false,
                    "status": 400,
                    "error": {"error": format!("{err:#}")},
                })
            }
        };
        writeln!(out, "{}", serde_json::to_string(&row)?)?;
    }
    Ok(summary)
}
