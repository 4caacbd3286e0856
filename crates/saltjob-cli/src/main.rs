//! `saltjob`: submit and inspect Salt API jobs by hand.
//!
//! Handles printed by `submit` are the same strings a reconciler persists,
//! so a job started by a controller can be polled from a shell and the
//! other way round.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use saltjob_models::JobHandle;
use saltjob_sdk::{CaBundle, ClientConfig, SaltClient, SaltError, StaticCredentials};
use serde_json::{Map, Value};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "saltjob")]
#[command(about = "Submit and poll Salt API jobs")]
#[command(author, version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit an asynchronous job and print its handle
    Submit(SubmitArgs),
    /// Poll a job once
    Poll(PollArgs),
    /// Poll a job until it finishes, fails or the deadline passes
    Wait(WaitArgs),
    /// Resolve a device path to its kernel name on a node
    DeviceName(DeviceNameArgs),
    /// Parse a persisted handle and print its parts
    Handle {
        /// Handle string, e.g. PrepareVolume/20240101123456789
        value: String,
    },
}

/// How to reach and log in to the API.
#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Salt API address (falls back to the built-in default)
    #[arg(long, env = "SALT_API_URL")]
    url: Option<String>,

    /// PEM bundle of the CAs trusted for the API
    #[arg(long, env = "SALT_API_CA_FILE")]
    ca_file: PathBuf,

    /// Username presented at login
    #[arg(long, env = "SALT_API_USERNAME")]
    username: String,

    /// Bearer token presented at login
    #[arg(long, env = "SALT_API_TOKEN", hide_env_values = true)]
    token: String,

    /// Timeout hint sent to the server, in seconds
    #[arg(long, default_value_t = 10)]
    server_timeout: u64,
}

impl ConnectionArgs {
    fn client(&self) -> Result<SaltClient> {
        let ca = CaBundle::from_file(&self.ca_file)?;
        let config = ClientConfig::new(self.url.as_deref(), ca)?
            .with_server_timeout(Duration::from_secs(self.server_timeout));
        let credentials = StaticCredentials::new(&self.username, &self.token);
        SaltClient::new(config, &credentials).context("failed to create Salt API client")
    }
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[command(flatten)]
    conn: ConnectionArgs,

    /// Node to run the job on
    #[arg(long)]
    target: String,

    /// Execution function, e.g. state.sls
    #[arg(long)]
    function: String,

    /// Logical name recorded in the handle
    #[arg(long, default_value = "Manual")]
    name: String,

    /// Keyword argument as key=value; the value is parsed as JSON when possible
    #[arg(long = "kwarg", value_parser = parse_kwarg)]
    kwargs: Vec<(String, Value)>,
}

#[derive(Args, Debug)]
struct PollArgs {
    #[command(flatten)]
    conn: ConnectionArgs,

    #[arg(long)]
    target: String,

    handle: JobHandle,
}

#[derive(Args, Debug)]
struct WaitArgs {
    #[command(flatten)]
    conn: ConnectionArgs,

    #[arg(long)]
    target: String,

    /// Seconds between polls
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 600)]
    deadline: u64,

    handle: JobHandle,
}

#[derive(Args, Debug)]
struct DeviceNameArgs {
    #[command(flatten)]
    conn: ConnectionArgs,

    #[arg(long)]
    target: String,

    path: String,
}

fn parse_kwarg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got \"{raw}\""))?;
    if key.is_empty() {
        return Err(format!("empty key in \"{raw}\""));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn print_result(result: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

async fn wait_for(client: &SaltClient, args: &WaitArgs) -> Result<Value> {
    let interval = Duration::from_secs(args.interval);
    let deadline = Duration::from_secs(args.deadline);

    let polling = async {
        loop {
            if let Some(result) = client.poll_job(&args.handle, &args.target).await? {
                return Ok::<_, SaltError>(result);
            }
            info!(handle = %args.handle, "job still running");
            tokio::time::sleep(interval).await;
        }
    };

    tokio::time::timeout(deadline, polling)
        .await
        .map_err(|_| anyhow!("job {} still running after {}s", args.handle, args.deadline))?
        .map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit(args) => {
            let client = args.conn.client()?;
            let kwargs: Map<String, Value> = args.kwargs.into_iter().collect();
            let handle = client
                .submit_job(&args.name, &args.target, &args.function, kwargs)
                .await?;
            println!("{handle}");
        }
        Commands::Poll(args) => {
            let client = args.conn.client()?;
            match client.poll_job(&args.handle, &args.target).await? {
                None => println!("running"),
                Some(result) => print_result(&result)?,
            }
        }
        Commands::Wait(args) => {
            let client = args.conn.client()?;
            let result = wait_for(&client, &args).await?;
            print_result(&result)?;
        }
        Commands::DeviceName(args) => {
            let client = args.conn.client()?;
            println!("{}", client.get_device_name(&args.target, &args.path).await?);
        }
        Commands::Handle { value } => {
            let handle = JobHandle::parse(&value)?;
            println!("name: {}", handle.name());
            println!("id:   {}", handle.id());
            if let Some(result) = handle.legacy_result() {
                println!("legacy result: {result}");
            }
        }
    }

    Ok(())
}
