use anyhow::{bail, Result};
use minifb::{Key, Window, WindowOptions};
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

/// minifbを使用したフレーム表示ウィンドウ
pub struct MinifbRenderer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
        })
    }

    /// ウィンドウが開いているか（ESCで閉じる）
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// BGR Mat をウィンドウサイズに合わせてバッファにコピー
    pub fn draw_frame(&mut self, frame: &Mat) -> Result<()> {
        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(self.width as i32, self.height as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let bytes = resized.data_bytes()?;
        if bytes.len() != self.width * self.height * 3 {
            bail!("expected 8-bit BGR frame");
        }

        // BGR -> 0RGB
        for (dst, bgr) in self.buffer.iter_mut().zip(bytes.chunks_exact(3)) {
            *dst = ((bgr[2] as u32) << 16) | ((bgr[1] as u32) << 8) | bgr[0] as u32;
        }
        Ok(())
    }

    /// バッファをウィンドウに表示
    pub fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }
}
