use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use dataspace_down::auth::{Credentials, TokenProvider};
use dataspace_down::catalog::CatalogClient;
use dataspace_down::driver::{Mode, RetrievalDriver, RetrievalRequest};
use dataspace_down::fetcher::HttpFetcher;
use dataspace_down::filter::format_instant;
use dataspace_down::selection::Selection;
use dataspace_down::{Error, ErrorKind};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "dataspace-down",
    about = "Search the Copernicus Data Space catalog and download matching products"
)]
struct Cli {
    /// TOML selection file; flags below override its values
    #[arg(long)]
    selection: Option<PathBuf>,
    /// SENTINEL-1, SENTINEL-2, SENTINEL-3 or SENTINEL-5P
    #[arg(long)]
    collection: Option<String>,
    /// Product type (default GRD for SENTINEL-1, S2MSI2A for SENTINEL-2)
    #[arg(long = "ptype")]
    product_type: Option<String>,
    /// Start sensing date, e.g. 2022-01-01T00:00:00.000Z (default now - 5 days)
    #[arg(long, value_parser = parse_instant)]
    start_date: Option<DateTime<Utc>>,
    /// End sensing date (default now)
    #[arg(long, value_parser = parse_instant)]
    end_date: Option<DateTime<Utc>>,
    #[arg(long = "search-point-lat", allow_hyphen_values = true)]
    latitude: Option<f64>,
    #[arg(long = "search-point-lon", allow_hyphen_values = true)]
    longitude: Option<f64>,
    /// Maximum cloud cover percentage (SENTINEL-2 only)
    #[arg(long)]
    cloud_cover: Option<f64>,
    /// Maximum number of products returned by the catalog
    #[arg(long)]
    top: Option<u32>,
    /// Download folder
    #[arg(long = "dest-path")]
    dest_path: Option<PathBuf>,
    #[arg(long, env = "DATASPACE_USERNAME")]
    username: Option<String>,
    #[arg(long, env = "DATASPACE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Download the products instead of listing them
    #[arg(long, overrides_with = "no_download")]
    download: bool,
    /// List the products even if the selection file asks for a download
    #[arg(long, overrides_with = "download")]
    no_download: bool,
    /// Write a JSON report of the run
    #[arg(long)]
    report: Option<PathBuf>,
    /// Exit with a failure status if any product failed to download
    #[arg(long)]
    strict: bool,
    #[arg(long)]
    catalog_url: Option<String>,
    #[arg(long)]
    token_url: Option<String>,
}

fn parse_instant(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected YYYY-MM-DDThh:mm:ss.000Z: {e}"))
}

/// 2 for rejected input, 3 for search or authentication failures.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>().map(Error::kind) {
        Some(ErrorKind::InvalidCollection | ErrorKind::InvalidProductType | ErrorKind::Config) => 2,
        Some(_) => 3,
        None => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dataspace_down=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut selection = match &cli.selection {
        Some(path) => Selection::read(path)?,
        None => Selection::default(),
    };
    apply_overrides(&mut selection, &cli);
    selection.endpoints.check()?;

    let params = selection.search_params(Utc::now());
    let dest_dir = selection.dest_dir();

    info!("Start date : {}", format_instant(&params.start_date));
    info!("End date   : {}", format_instant(&params.end_date));
    info!("Latitude   : {}", params.point.latitude);
    info!("Longitude  : {}", params.point.longitude);
    info!("% Cloud    : less than {} %", params.max_cloud_cover);
    info!("Folder     : {}", dest_dir.display());

    let mode = if selection.output.download {
        let (Some(username), Some(password)) = (cli.username, cli.password) else {
            return Err(Error::Config("set username and password to download".to_string()).into());
        };
        Mode::Fetch {
            credentials: Credentials::new(username, password),
            dest_dir,
        }
    } else {
        Mode::List
    };

    let client = reqwest::Client::new();
    let endpoints = &selection.endpoints;
    let driver = RetrievalDriver::new(
        CatalogClient::new(client.clone(), &endpoints.catalog_url),
        TokenProvider::new(client, &endpoints.token_url, &endpoints.client_id),
        HttpFetcher::new()?,
    );

    let report = driver
        .run(RetrievalRequest {
            params,
            top: selection.search.top,
            mode,
        })
        .await?;

    if let Some(path) = &cli.report {
        report
            .write(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    let failures = report.failures();
    if failures > 0 {
        warn!("{failures} of {} products failed to download", report.items.len());
        if cli.strict {
            return Ok(ExitCode::from(4));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn apply_overrides(selection: &mut Selection, cli: &Cli) {
    let search = &mut selection.search;
    if cli.collection.is_some() {
        search.collection = cli.collection.clone();
    }
    if cli.product_type.is_some() {
        search.product_type = cli.product_type.clone();
    }
    search.start_date = cli.start_date.or(search.start_date);
    search.end_date = cli.end_date.or(search.end_date);
    search.latitude = cli.latitude.or(search.latitude);
    search.longitude = cli.longitude.or(search.longitude);
    search.cloud_cover = cli.cloud_cover.or(search.cloud_cover);
    search.top = cli.top.or(search.top);

    if cli.dest_path.is_some() {
        selection.output.dest_dir = cli.dest_path.clone();
    }
    if cli.download {
        selection.output.download = true;
    } else if cli.no_download {
        selection.output.download = false;
    }

    if let Some(url) = &cli.catalog_url {
        selection.endpoints.catalog_url = url.clone();
    }
    if let Some(url) = &cli.token_url {
        selection.endpoints.token_url = url.clone();
    }
}
