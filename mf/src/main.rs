//! multifetch - bounded-concurrency fetcher
//!
//! CLI entry point: submits every URL to the scheduler and prints each
//! response as soon as it finishes.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use multifetch::cli::{Cli, Command, OutputFormat, parse_header_arg, parse_url_list};
use multifetch::config::Config;
use multifetch::{Header, HttpHandle, HttpMultiplexer, Pull, Response, Scheduler};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("multifetch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("mf.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Fetch {
            urls,
            input,
            max_concurrent,
            method,
            headers,
            timeout_ms,
            raw_headers,
            show_headers,
            body,
            format,
        } => {
            let request = FetchRequest {
                urls,
                input,
                max_concurrent,
                method,
                headers,
                timeout_ms,
                raw_headers,
            };
            let output = FetchOutput {
                show_headers,
                body,
                format,
            };
            cmd_fetch(&config, request, output).await
        }
        Command::Config => {
            let yaml = serde_yaml::to_string(&config).context("Failed to render config")?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

/// What to fetch
struct FetchRequest {
    urls: Vec<String>,
    input: Option<PathBuf>,
    max_concurrent: Option<usize>,
    method: String,
    headers: Vec<String>,
    timeout_ms: Option<u64>,
    raw_headers: bool,
}

/// How to print it
struct FetchOutput {
    show_headers: bool,
    body: bool,
    format: OutputFormat,
}

async fn cmd_fetch(config: &Config, request: FetchRequest, output: FetchOutput) -> Result<()> {
    let mut urls = request.urls;
    if let Some(input) = &request.input {
        urls.extend(parse_url_list(&read_input(input)?));
    }
    if urls.is_empty() {
        return Err(eyre!("No URLs given (pass them as arguments or with --input)"));
    }

    let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
        .context(format!("Invalid HTTP method: {}", request.method))?;
    let headers = request
        .headers
        .iter()
        .map(|h| parse_header_arg(h).ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", h)))
        .collect::<Result<Vec<_>>>()?;

    let mut scheduler_config = config.scheduler.clone();
    if let Some(max) = request.max_concurrent {
        scheduler_config.max_concurrent = max;
    }
    if request.raw_headers {
        scheduler_config.parse_headers = false;
    }
    scheduler_config.auto_close_handles = true;

    let client = config.http.build_client()?;
    let mut scheduler: Scheduler<HttpMultiplexer, String> =
        Scheduler::new(HttpMultiplexer::new(client), scheduler_config);

    for url in urls {
        let mut handle = HttpHandle::new(method.clone(), url.as_str());
        for (name, value) in &headers {
            handle = handle.header(name.as_str(), value.as_str());
        }
        if let Some(ms) = request.timeout_ms {
            handle = handle.timeout(Duration::from_millis(ms));
        }
        scheduler.submit_with(handle, url);
    }

    let total = scheduler.pending_count();
    info!(total, max_concurrent = scheduler.config().max_concurrent, "cmd_fetch: starting");

    let mut failed = 0usize;
    while let Pull::Ready(response) = scheduler.pull().await {
        if !response.is_ok() {
            failed += 1;
        }
        match output.format {
            OutputFormat::Text => print_text(&response, &output),
            OutputFormat::Json => {
                let record = ResultRecord::from_response(&response, &output);
                println!("{}", serde_json::to_string(&record).context("Failed to serialize result")?);
            }
        }
    }

    info!(total, failed, stats = ?scheduler.stats(), "cmd_fetch: done");
    if output.format == OutputFormat::Text {
        eprintln!(
            "{} {} fetched, {} failed",
            if failed == 0 { "✓".green() } else { "✗".red() },
            total - failed,
            failed
        );
    }
    if failed > 0 {
        return Err(eyre!("{} of {} requests failed", failed, total));
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read URLs from stdin")?;
        return Ok(content);
    }
    fs::read_to_string(input).context(format!("Failed to read URL list {}", input.display()))
}

fn print_text(response: &Response<String, HttpHandle>, output: &FetchOutput) {
    let url = response.user_data.as_deref().unwrap_or("?");
    let elapsed = format!("{:.3}s", response.info.total_time);
    if !response.is_ok() {
        println!(
            "{} {} {} {}",
            "ERR".red(),
            elapsed.dimmed(),
            url,
            response.error.message.red()
        );
        return;
    }

    let status = response.status().to_string();
    let status = match response.status() {
        200..=299 => status.green(),
        300..=399 => status.yellow(),
        _ => status.red(),
    };
    println!(
        "{} {} {} {}",
        status,
        elapsed.dimmed(),
        format!("{}B", response.info.size_download).cyan(),
        url
    );

    if output.show_headers {
        match &response.header {
            Some(Header::Parsed(fields)) => {
                for (name, value) in fields {
                    println!("  {}: {}", name.bold(), value);
                }
            }
            Some(Header::Raw(raw)) => {
                for line in raw.split("\r\n") {
                    println!("  {}", line);
                }
            }
            None => {}
        }
    }
    if output.body {
        println!("{}", response.body_text());
    }
}

/// One JSON line per finished request
#[derive(Debug, Serialize)]
struct ResultRecord<'a> {
    id: u64,
    url: Option<&'a str>,
    info: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<&'a Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    error: ErrorRecord<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorRecord<'a> {
    code: u32,
    message: &'a str,
    description: Option<&'static str>,
}

impl<'a> ResultRecord<'a> {
    fn from_response(response: &'a Response<String, HttpHandle>, output: &FetchOutput) -> Self {
        Self {
            id: response.id.as_u64(),
            url: response.user_data.as_deref(),
            info: response.info.to_map(),
            header: if output.show_headers {
                response.header.as_ref()
            } else {
                None
            },
            body: output.body.then(|| response.body_text().into_owned()),
            error: ErrorRecord {
                code: response.error.code.code(),
                message: &response.error.message,
                description: response.error.description(),
            },
        }
    }
}
