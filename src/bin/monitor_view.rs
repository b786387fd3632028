use anyhow::Result;
use clap::Parser;
use opencv::core::Mat;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use form_monitor::config::Config;
use form_monitor::render::MinifbRenderer;
use form_monitor::{ExerciseType, FormMonitor, FramePoller, StatusSnapshot};

#[derive(Parser, Debug)]
#[command(version = env!("GIT_VERSION"), about = "Exercise form monitor (window)")]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// hand_raise / hand_curl
    #[arg(long, default_value = "hand_raise")]
    exercise: ExerciseType,
}

fn title(status: &StatusSnapshot) -> String {
    let angle = if status.angle.is_empty() { "Angle: Not detected" } else { status.angle.as_str() };
    format!("Form Monitor - {} | {} | {}", status.exercise_type, angle, status.feedback)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config);
    let (width, height) = (config.camera.width as usize, config.camera.height as usize);
    let poll_interval = Duration::from_millis(config.view.poll_interval_ms);

    println!("Press ESC to exit");
    let mut monitor = FormMonitor::from_config(config)?;
    monitor.start(args.exercise)?;

    // minifb のウィンドウはメインスレッドから動かせないので、ポーラーからチャネルで受け取る
    let (tx, rx) = mpsc::sync_channel::<(Mat, StatusSnapshot)>(1);
    let mut poller = FramePoller::spawn(monitor.session(), poll_interval, move |frame, status| {
        let _ = tx.try_send((frame, status));
    })?;

    let mut renderer = MinifbRenderer::new("Form Monitor", width, height)?;

    while renderer.is_open() {
        if let Ok((frame, status)) = rx.recv_timeout(poll_interval) {
            renderer.draw_frame(&frame)?;
            renderer.set_title(&title(&status));
            if !status.running {
                renderer.set_title("Form Monitor - stopped (camera unavailable?)");
            }
        }
        renderer.update()?;
    }

    println!("Shutting down...");
    poller.stop();
    monitor.stop();
    Ok(())
}
