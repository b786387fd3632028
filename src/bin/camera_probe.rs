use anyhow::Result;
use clap::Parser;
use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoCaptureAPIs};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "List camera indices that open and what they deliver")]
struct Args {
    /// Highest index to probe
    #[arg(long, default_value_t = 4)]
    max_index: i32,
    /// Save the first frame of each camera as probe_cam<N>.png
    #[arg(long)]
    save: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    println!("=== カメラプローブ ===");
    println!();

    for index in 0..=args.max_index {
        print!("index {}: ", index);
        let mut cap = match VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32) {
            Ok(c) => c,
            Err(e) => {
                println!("open failed ({})", e);
                continue;
            }
        };
        // 検出ループと同じく開いてから少し待つ
        thread::sleep(Duration::from_millis(500));
        if !cap.is_opened().unwrap_or(false) {
            println!("not available");
            continue;
        }

        let prop_w = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let prop_h = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        let prop_fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        let backend = cap.get_backend_name().unwrap_or_default();
        println!("{}x{} fps={} backend={}", prop_w, prop_h, prop_fps, backend);

        let mut frame = Mat::default();
        match cap.read(&mut frame) {
            Ok(true) if !frame.empty() => {
                println!("       frame: {}x{} ch={}", frame.cols(), frame.rows(), frame.channels());
                if args.save {
                    let filename = format!("probe_cam{}.png", index);
                    match imgcodecs::imwrite(&filename, &frame, &opencv::core::Vector::new()) {
                        Ok(_) => println!("       saved: {}", filename),
                        Err(e) => println!("       save err: {}", e),
                    }
                }
            }
            Ok(_) => println!("       frame: EMPTY"),
            Err(e) => println!("       frame err: {}", e),
        }
        cap.release()?;
    }

    Ok(())
}
