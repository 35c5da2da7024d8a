use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use sqlpulse::collectors::SqlCollector;
use sqlpulse::forwarder::{
    CloudWatchSink, Invoker, LambdaInvoker, LocalInvoker, MetricsSink, StdoutSink,
};
use sqlpulse::logging::init_logging;
use sqlpulse::{CollectorHandler, Config, Forwarder, ForwarderHandler, InvocationContext};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the SQL metrics collector and forwarder by hand", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SQLPULSE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and list the metric queries
    Check,
    /// Run every query once and print the resulting batch
    Collect,
    /// Invoke the collector and push its batch to the metrics API
    Forward {
        /// Print the batch instead of submitting it
        #[arg(long)]
        dry_run: bool,

        /// Run the collector in this process instead of invoking it remotely
        #[arg(long)]
        local: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Check => check(&config),
        Command::Collect => collect(&config).await,
        Command::Forward { dry_run, local } => forward(&config, dry_run, local).await,
    }
}

fn check(config: &Config) -> Result<()> {
    let table = config.query_table()?;
    println!("Namespace: {}", config.namespace);
    println!("Collector function: {}", config.collector_function);
    println!("Queries ({}):", table.len());
    for (index, query) in table.iter().enumerate() {
        println!("  #{} {} [{}]", index, query.label, query.unit);
        println!("     {}", query.query);
    }
    Ok(())
}

fn collector_handler(config: &Config) -> Result<Arc<CollectorHandler>> {
    let collector = SqlCollector::from_config(config)?;
    Ok(Arc::new(CollectorHandler::new(Arc::new(collector))))
}

async fn collect(config: &Config) -> Result<()> {
    let handler = collector_handler(config)?;
    let mut ctx = InvocationContext::local();
    let batch = handler.handle(Value::Null, &mut ctx).await?;
    println!("{}", serde_json::to_string_pretty(&batch)?);
    Ok(())
}

async fn forward(config: &Config, dry_run: bool, local: bool) -> Result<()> {
    let invoker: Arc<dyn Invoker> = if local {
        Arc::new(LocalInvoker::new(collector_handler(config)?))
    } else {
        Arc::new(LambdaInvoker::new(config.aws_region.clone()).await)
    };
    let sink: Arc<dyn MetricsSink> = if dry_run {
        Arc::new(StdoutSink)
    } else {
        Arc::new(CloudWatchSink::new(config.aws_region.clone()).await)
    };

    let handler = ForwarderHandler::new(Forwarder::new(
        invoker,
        sink,
        config.collector_function.clone(),
        config.timeouts.invoke(),
        config.timeouts.ingest(),
    ));
    let report = handler
        .handle(Value::Object(Default::default()), &mut InvocationContext::local())
        .await?;
    println!("{}", report);
    Ok(())
}
