use clap::Parser;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};
use std::fs::File;

use soq::config;
use soq::session::Session;

#[derive(Parser)]
#[command(name = "soq", about = "Search Stack Overflow from your terminal")]
struct Args {
    /// The question to search for. Omit it for an interactive prompt.
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,

    /// Answers shown per question (0 = all)
    #[arg(short, long)]
    answers: Option<usize>,

    /// List matching questions instead of picking the best one
    #[arg(short, long)]
    list: bool,

    /// Disable ANSI styling
    #[arg(long)]
    no_color: bool,

    /// MCP server command override
    #[arg(long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Initialize file logger - writes to soq.log in current directory
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create("soq.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, log_config, log_file);
    }

    log::info!("soq starting up");

    // A broken config file shouldn't block searching; fall back to defaults.
    let file_config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: {e}; using defaults");
            config::SoqConfig::default()
        }
    };
    let resolved = config::resolve(
        &file_config,
        args.server.as_deref(),
        args.answers,
        args.no_color,
    );

    let mut session = match Session::connect(resolved).await {
        Ok(s) => s,
        Err(_) => return std::process::ExitCode::FAILURE, // already reported
    };

    if args.query.is_empty() {
        if let Err(e) = session.repl(args.list).await {
            eprintln!("Input error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    } else {
        session.answer(&args.query.join(" "), args.list).await;
    }

    std::process::ExitCode::SUCCESS
}
