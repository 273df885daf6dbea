use clap::{Parser, Subcommand};
use log::{error, info};
use metertrekker::config::{Config, TelegramConfig};
use metertrekker::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use metertrekker::metering_p1::source::TelegramReader;
use metertrekker::{DispatchEngine, MetricDefinition, MetricRegistry, MqttManager, P1Manager};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};

/// Forwards DSMR P1 smart meter telegrams to MQTT and InfluxDB.
#[derive(Parser, Debug)]
#[command(name = "metertrekker")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file, defaults to config/metertrekker.yaml or metertrekker.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read telegrams and publish them (default).
    Run,
    /// Validate the configuration and the metric registry, then exit.
    Check,
    /// Print the enabled metric definitions.
    List,
}

fn configuration_failure(message: String) -> ExitCode {
    Diagnostic::new(Severity::Error, DiagnosticKind::Configuration, message).log();
    ExitCode::FAILURE
}

async fn open_source(telegram: &TelegramConfig) -> std::io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if telegram.source == "-" {
        info!("Reading telegrams from stdin");
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    info!("Reading telegrams from {}", telegram.source);
    let file = tokio::fs::File::open(&telegram.source).await?;
    Ok(Box::new(BufReader::new(file)))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let default_filter = std::env::var("MT_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return configuration_failure(e.to_string()),
    };
    let registry = match MetricRegistry::build(&config.metrics) {
        Ok(r) => r,
        Err(e) => return configuration_failure(e.to_string()),
    };

    match args.command.unwrap_or(Command::Run) {
        Command::Check => {
            println!("Configuration is valid, {} metrics enabled", registry.len());
            ExitCode::SUCCESS
        }
        Command::List => {
            let definitions: Vec<&MetricDefinition> = registry.iter().collect();
            match serde_yml::to_string(&definitions) {
                Ok(yaml) => {
                    print!("{}", yaml);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("Unable to print metric definitions: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Command::Run => run(config, registry).await,
    }
}

async fn run(config: Config, registry: MetricRegistry) -> ExitCode {
    let source = match open_source(&config.telegram).await {
        Ok(s) => s,
        Err(e) => {
            error!("Unable to open telegram source {}: {}", config.telegram.source, e);
            return ExitCode::FAILURE;
        }
    };

    // the meter thread sends everything through the MQTT thread
    let (mut mqtt, tx) = MqttManager::new(&config.mqtt);

    let mqtt_task = tokio::spawn(async move {
        mqtt.start_thread().await;
    });

    let engine = DispatchEngine::new(Arc::new(registry), config.influx.measurement_names());
    let reader = TelegramReader::new(source, config.telegram.verify_crc);
    let mut p1 = P1Manager::new(tx, engine, config.telegram.clone(), config.influx.clone());
    let p1_task = tokio::spawn(async move {
        p1.start_thread(reader).await;
    });

    info!("All modules started, running until the telegram source closes");
    if let Err(e) = p1_task.await {
        error!("P1 thread failed: {}", e);
    }
    /* the P1 sender is gone now, the MQTT thread ends once everything queued is published */
    if let Err(e) = mqtt_task.await {
        error!("MQTT thread failed: {}", e);
    }
    info!("Exiting");
    ExitCode::SUCCESS
}
