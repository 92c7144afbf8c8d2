use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use auction_probe::config::{RunConfig, DEFAULT_BASE_URL};
use auction_probe::poll::PollSettings;
use auction_probe::sandbox::{self, SandboxConfig};
use auction_probe::suite;
use clap::{Args, Parser, Subcommand};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(name = "auction-probe")]
#[command(about = "Acceptance scenario runner for the auction API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the auction suite against a live service
    Run(RunArgs),
    /// Serve the in-memory sandbox service
    Sandbox(SandboxArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Base URL of the auction service
    #[arg(long, env = "AUCTION_API_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Run against an in-process sandbox instead of --base-url
    #[arg(long)]
    sandbox: bool,

    /// Timeout of a single request
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    request_timeout: Duration,

    /// Pause between two reads while waiting for an auction to close
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    poll_interval: Duration,

    /// Longest wait for an auction to close
    #[arg(long, value_parser = humantime::parse_duration, default_value = "90s")]
    poll_timeout: Duration,

    /// How long after creation the bid-on listing closes
    #[arg(long, value_parser = humantime::parse_duration, default_value = "20s")]
    closing_offset: Duration,

    /// Lifetime of the listings that must stay open during the run
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1day")]
    open_listing_lifetime: Duration,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SandboxArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = auto)
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Period of the auction closer
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    close_every: Duration,
}

impl RunArgs {
    fn config(&self, base_url: String) -> RunConfig {
        RunConfig {
            base_url,
            request_timeout: self.request_timeout,
            poll: PollSettings::new(self.poll_interval, self.poll_timeout),
            closing_offset: self.closing_offset,
            open_listing_lifetime: self.open_listing_lifetime,
        }
    }
}

fn run(args: RunArgs) -> anyhow::Result<bool> {
    // Held until the suite finishes; dropping it stops the server.
    let local = if args.sandbox {
        Some(sandbox::spawn(SandboxConfig::default()).context("starting the sandbox")?)
    } else {
        None
    };
    let base_url = local
        .as_ref()
        .map_or_else(|| args.base_url.clone(), |sandbox| sandbox.base_url().to_string());

    info!("Running the auction suite against {}", base_url);
    let report = suite::run(args.config(base_url))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(report.is_success())
}

fn serve(args: SandboxArgs) -> anyhow::Result<()> {
    let config = SandboxConfig {
        host: args.host,
        port: args.port,
        close_every: Some(args.close_every),
        ..SandboxConfig::default()
    };
    actix_web::rt::System::new()
        .block_on(sandbox::serve(config))
        .context("serving the sandbox")
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Sandbox(args) => serve(args).map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
