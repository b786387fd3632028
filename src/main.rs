use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use form_monitor::config::Config;
use form_monitor::{ExerciseType, FormMonitor};

#[derive(Parser, Debug)]
#[command(version = env!("GIT_VERSION"), about = "Exercise form monitor (console)")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// Start monitoring immediately with this exercise (hand_raise / hand_curl)
    #[arg(long)]
    exercise: Option<ExerciseType>,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn print_help() {
    println!("コマンド:");
    println!("  s [hand_raise|hand_curl] - 監視開始 (既定: hand_raise)");
    println!("  x                        - 監視停止");
    println!("  ?                        - 状態表示");
    println!("  q                        - 終了");
    println!();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = Config::load_or_default(&args.config);

    println!("=== Form Monitor {} ===", env!("GIT_VERSION"));
    print_help();

    let mut monitor = FormMonitor::from_config(config)?;
    let session = monitor.session();

    if let Some(exercise) = args.exercise {
        monitor.start(exercise)?;
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "s" => {
                let exercise = match parts.get(1).map(|s| s.parse::<ExerciseType>()) {
                    None => ExerciseType::HandRaise,
                    Some(Ok(exercise)) => exercise,
                    Some(Err(e)) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match monitor.start(exercise) {
                    Ok(()) => println!("監視開始: {}", exercise),
                    Err(e) => println!("開始できません: {}", e),
                }
            }
            "x" => {
                if monitor.is_running() {
                    monitor.stop();
                    println!("監視停止");
                } else {
                    println!("監視していません");
                }
            }
            "?" => {
                println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
            }
            "q" => {
                println!("終了します");
                break;
            }
            other => {
                println!("不明なコマンド: {}", other);
                print_help();
            }
        }
    }

    monitor.stop();
    Ok(())
}
