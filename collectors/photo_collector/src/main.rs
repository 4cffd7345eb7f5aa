mod gemini;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use clap::Parser;
use journal_core::{
    labels::format_date_time,
    model::{Entry, FoodComponent, NutritionData, Summary},
    period::{normalize_tz_offset_minutes, tz_offset_from_minutes},
    thumbnail::{
        resize_and_encode, validate_upload, ANALYSIS_MAX_DIMENSION, ANALYSIS_QUALITY,
        MAX_UPLOAD_BYTES,
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::info;

use crate::gemini::{GeminiClient, DEFAULT_MODEL};

#[derive(Parser, Debug)]
#[command(name = "photo_collector", version)]
struct Args {
    /// Meal photo to analyze.
    #[arg(long)]
    image: PathBuf,

    /// Core base URL, e.g. http://127.0.0.1:17700
    #[arg(long, default_value = "http://127.0.0.1:17700")]
    core_url: String,

    /// Gemini model used for the estimate.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Override the MIME type guessed from the file extension.
    #[arg(long)]
    mime_type: Option<String>,

    /// Analyze and print the estimate without adding it to the journal.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Print today / this week / this month totals afterwards.
    #[arg(long, default_value_t = false)]
    summary: bool,

    /// HTTP timeout (seconds) for both Gemini and core requests.
    #[arg(long, default_value_t = 60)]
    timeout_seconds: u64,
}

#[derive(Deserialize)]
struct OkResponse<T> {
    ok: bool,
    data: Option<T>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddEntryBody<'a> {
    food_name: &'a str,
    calories: f64,
    fat: f64,
    sugar: f64,
    components: &'a [FoodComponent],
    image_base64: String,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct AddEntryResult {
    journaled: bool,
    entry: Option<Entry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photo_collector=info".into()),
        )
        .init();

    let args = Args::parse();
    let base_url = args.core_url.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_seconds))
        .build()?;

    let bytes = std::fs::read(&args.image)?;
    let mime = args
        .mime_type
        .clone()
        .unwrap_or_else(|| mime_from_path(&args.image).to_string());
    validate_upload(bytes.len(), &mime, MAX_UPLOAD_BYTES)?;

    let key = require_api_key(args.api_key.as_deref())?;
    let for_model = resize_and_encode(&bytes, ANALYSIS_MAX_DIMENSION, ANALYSIS_QUALITY)?;
    info!(
        "analyzing {} ({} bytes sent to {})",
        args.image.display(),
        for_model.bytes.len(),
        args.model
    );
    let nutrition = GeminiClient::new(client.clone(), key, args.model.as_str())
        .analyze(&for_model)
        .await;
    println!("{}", describe(&nutrition));

    if !nutrition.is_journalable() {
        info!("estimate not journaled: '{}'", nutrition.food_name);
    } else if args.dry_run {
        info!("dry run, not journaled");
    } else {
        let body = AddEntryBody {
            food_name: &nutrition.food_name,
            calories: nutrition.calories,
            fat: nutrition.fat,
            sugar: nutrition.sugar,
            components: &nutrition.components,
            image_base64: STANDARD.encode(&bytes),
            mime_type: &mime,
        };
        let res: AddEntryResult = post_ok(&client, &format!("{base_url}/entries"), &body).await?;
        match res.entry {
            Some(entry) if res.journaled => {
                let tz = tz_offset_from_minutes(local_tz_offset_minutes());
                println!(
                    "journaled {} at {}",
                    entry.id,
                    format_date_time(entry.timestamp, tz)
                );
            }
            _ => info!("core declined the entry"),
        }
    }

    if args.summary {
        let tz_offset_minutes = local_tz_offset_minutes();
        let s: Summary = get_ok(
            &client,
            &format!("{base_url}/summary?tz_offset_minutes={tz_offset_minutes}"),
        )
        .await?;
        for p in [&s.today, &s.this_week, &s.this_month] {
            println!(
                "{:<10} {:>7.0} kcal {:>6.1} g fat {:>6.1} g sugar",
                p.name, p.calories, p.fat, p.sugar
            );
        }
    }
    Ok(())
}

fn require_api_key(key: Option<&str>) -> anyhow::Result<&str> {
    match key.map(str::trim) {
        Some(k) if !k.is_empty() => Ok(k),
        _ => anyhow::bail!(
            "Gemini API Key is not configured. Set GEMINI_API_KEY or pass --api-key."
        ),
    }
}

fn local_tz_offset_minutes() -> i32 {
    normalize_tz_offset_minutes(Some(Local::now().offset().local_minus_utc() / 60))
}

fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn describe(n: &NutritionData) -> String {
    let mut out = format!(
        "{}: {:.0} kcal, {:.1} g fat, {:.1} g sugar",
        n.food_name, n.calories, n.fat, n.sugar
    );
    for c in &n.components {
        out.push_str(&format!("\n  - {} ({:.0} kcal)", c.name, c.calories));
    }
    out
}

async fn get_ok<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> anyhow::Result<T> {
    let res = client.get(url).send().await?;
    unwrap_ok(res).await
}

async fn post_ok<T: DeserializeOwned, B: Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> anyhow::Result<T> {
    let res = client.post(url).json(body).send().await?;
    unwrap_ok(res).await
}

async fn unwrap_ok<T: DeserializeOwned>(res: reqwest::Response) -> anyhow::Result<T> {
    if !res.status().is_success() {
        anyhow::bail!("http_{}", res.status().as_u16());
    }
    let body: OkResponse<T> = res.json().await?;
    if !body.ok {
        anyhow::bail!("not_ok");
    }
    body.data.ok_or_else(|| anyhow::anyhow!("missing_data"))
}
