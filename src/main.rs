use clap::{Arg, Command};
use dmarc_milter::email::Envelope;
use dmarc_milter::milter::Milter;
use dmarc_milter::processor::{decode_report_file, EmailClassification, Processor};
use dmarc_milter::Config;
use log::LevelFilter;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("dmarc-milter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Milter that decodes DMARC aggregate reports and forwards them to a reporting sink")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/dmarc-milter.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("process-email")
                .long("process-email")
                .value_name("FILE")
                .help("Run a single .eml file through the pipeline, including delivery")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("decode-report")
                .long("decode-report")
                .value_name("FILE")
                .help("Decode an .xml, .gz or .zip report file and print normalized rows")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    if let Some(report_file) = matches.get_one::<String>("decode-report") {
        decode_report(report_file);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/dmarc-milter.yaml");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!("🔍 Testing configuration...");
        match config.validate() {
            Ok(()) => {
                println!("Socket path: {}", config.socket_path);
                println!("Sink endpoint: {}", config.sink.endpoint);
                println!("Sink timeout: {}s (client limit {}s)", config.sink.timeout_seconds, config.sink.client_timeout_seconds);
                println!("User-Agent: {}", config.worker.user_agent());
                println!("✅ Configuration is valid");
            }
            Err(e) => {
                println!("❌ Configuration validation failed:");
                println!("Error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        process::exit(1);
    }

    if let Some(email_file) = matches.get_one::<String>("process-email") {
        process_email_file(&config, email_file).await;
        return;
    }

    log::info!("Starting DMARC milter...");

    let milter = match Milter::new(&config) {
        Ok(milter) => milter,
        Err(e) => {
            log::error!("Failed to create milter: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = milter.run(&config.socket_path).await {
        log::error!("Milter error: {e}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please set sink.endpoint to your reporting endpoint.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn decode_report(path: &str) {
    let rows = match decode_report_file(Path::new(path)) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("❌ Failed to decode report: {e}");
            process::exit(1);
        }
    };
    match serde_json::to_string_pretty(&rows) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ Failed to serialize rows: {e}");
            process::exit(1);
        }
    }
}

async fn process_email_file(config: &Config, email_file: &str) {
    println!("🧪 Processing email file: {}", email_file);

    let raw = match std::fs::read(email_file) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("❌ Error reading email file: {}", e);
            process::exit(1);
        }
    };

    let processor = match Processor::from_config(config) {
        Ok(processor) => processor,
        Err(e) => {
            eprintln!("❌ Failed to create processor: {e}");
            process::exit(1);
        }
    };

    match processor.process(&raw, &Envelope::default()).await {
        Ok(EmailClassification::NoAttachment) => println!("📭 No attachment"),
        Ok(EmailClassification::NonReportAttachment { reason }) => {
            println!("📎 Attachment is not a DMARC report: {reason}")
        }
        Ok(EmailClassification::DmarcReport { rows }) => {
            println!("📊 DMARC report with {} rows", rows.len())
        }
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    }
}
