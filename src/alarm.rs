use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::AlertConfig;
use crate::error::MonitorError;

/// 安定後の不正フレームを数え、1エピソードにつき1回だけアラームを出す
#[derive(Debug, Clone)]
pub struct AlarmDebouncer {
    threshold: u32,
    wrong_form_counter: u32,
    triggered: bool,
}

impl AlarmDebouncer {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            wrong_form_counter: 0,
            triggered: false,
        }
    }

    pub fn record_wrong_frame(&mut self) {
        self.wrong_form_counter += 1;
    }

    pub fn clear_counter(&mut self) {
        self.wrong_form_counter = 0;
    }

    /// 閾値に達していて未発火なら発火する。発火後カウンタは0から数え直し
    pub fn poll(&mut self) -> bool {
        if self.wrong_form_counter >= self.threshold && !self.triggered {
            self.triggered = true;
            self.wrong_form_counter = 0;
            return true;
        }
        false
    }

    /// Good かつ連続不正フレーム0のときだけ呼ぶ
    pub fn rearm(&mut self) {
        self.triggered = false;
    }

    pub fn wrong_form_counter(&self) -> u32 {
        self.wrong_form_counter
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }
}

/// 音によるアラート出力先
pub trait AlertSink: Send + Sync {
    fn play(&self) -> Result<()>;
}

/// 別スレッドでアラートを鳴らす。結果は待たず、失敗はログのみ
pub fn dispatch_alert(sink: Arc<dyn AlertSink>) {
    let spawned = thread::Builder::new()
        .name("alarm".to_string())
        .spawn(move || {
            if let Err(e) = sink.play() {
                let err = MonitorError::AlertDispatch(format!("{:#}", e));
                warn!("{}", err);
            }
        });

    if let Err(e) = spawned {
        error!("failed to spawn alarm thread: {}", e);
    }
}

/// デコード済みのアラーム音（インターリーブ、-1.0〜1.0）
#[derive(Debug, Clone)]
pub struct AlarmClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AlarmClip {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("{} is not a readable WAV file", path.display()))?;
        let spec = reader.spec();
        debug!(
            "alarm sound: {} Hz, {} ch, {} bits",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        );
        if spec.channels == 0 || spec.sample_rate == 0 {
            bail!("{} has an empty WAV header", path.display());
        }

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        }
        .context("failed to read WAV samples")?;

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    /// 出力デバイスの形式に変換する。モノラルに平均してから線形補間で
    /// リサンプルし、全チャンネルに複製
    pub fn render(&self, sample_rate: u32, channels: u16, volume: f32) -> Vec<f32> {
        let source_channels = self.channels.max(1) as usize;
        let mono: Vec<f32> = self
            .samples
            .chunks_exact(source_channels)
            .map(|frame| frame.iter().sum::<f32>() / source_channels as f32)
            .collect();
        if mono.is_empty() || sample_rate == 0 || channels == 0 {
            return Vec::new();
        }

        let step = self.sample_rate as f64 / sample_rate as f64;
        let frames = (mono.len() as f64 / step).ceil() as usize;
        let mut out = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(mono.len() - 1);
            let frac = (pos - idx as f64) as f32;
            let a = mono[idx];
            let b = mono.get(idx + 1).copied().unwrap_or(a);
            let value = (a + (b - a) * frac) * volume;
            out.extend(std::iter::repeat(value).take(channels as usize));
        }
        out
    }
}

/// 再生完了を待つ上限（クリップ長に加算）
const PLAYBACK_GRACE: Duration = Duration::from_secs(1);

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Vec<f32>,
    played: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut position = 0usize;
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    let value = samples.get(position).copied().unwrap_or(0.0);
                    *out = T::from_sample(value);
                    position += 1;
                }
                played.store(position.min(samples.len()), Ordering::Release);
            },
            |e| warn!("alarm stream error: {}", e),
            None,
        )
        .context("failed to build output stream")?;
    Ok(stream)
}

/// 既定の出力デバイスでクリップを最後まで鳴らす（呼び出しスレッドをブロック）
fn play_clip(clip: &AlarmClip, volume: f32) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    let supported = device
        .default_output_config()
        .context("failed to query output config")?;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let samples = clip.render(config.sample_rate.0, config.channels, volume);
    let total = samples.len();
    let played = Arc::new(AtomicUsize::new(0));
    let stream = match format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, samples, played.clone())?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, samples, played.clone())?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, samples, played.clone())?,
        other => bail!("unsupported output sample format {:?}", other),
    };
    stream.play().context("failed to start output stream")?;

    let deadline = Instant::now() + Duration::from_secs_f32(clip.duration_secs()) + PLAYBACK_GRACE;
    while played.load(Ordering::Acquire) < total && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}

/// WAVファイルを既定の出力デバイスで鳴らす。ファイルがなければ端末ベル
pub struct SoundAlert {
    path: PathBuf,
    volume: f32,
}

impl SoundAlert {
    pub fn new<P: AsRef<Path>>(path: P, volume: f32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &AlertConfig) -> Self {
        Self::new(&config.sound_path, config.volume)
    }

    fn ring_bell() -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

impl AlertSink for SoundAlert {
    fn play(&self) -> Result<()> {
        if !self.path.exists() {
            warn!("{} not found, falling back to terminal bell", self.path.display());
            return Self::ring_bell();
        }

        let clip = AlarmClip::load(&self.path)?;
        info!("playing {} ({:.2}s)", self.path.display(), clip.duration_secs());
        play_clip(&clip, self.volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_at_threshold() {
        let mut d = AlarmDebouncer::new(3);
        d.record_wrong_frame();
        d.record_wrong_frame();
        assert!(!d.poll());
        d.record_wrong_frame();
        assert!(d.poll());
        assert!(d.triggered());
        assert_eq!(d.wrong_form_counter(), 0);
    }

    #[test]
    fn test_no_refire_until_rearmed() {
        let mut d = AlarmDebouncer::new(2);
        d.record_wrong_frame();
        d.record_wrong_frame();
        assert!(d.poll());

        for _ in 0..10 {
            d.record_wrong_frame();
            assert!(!d.poll());
        }

        d.rearm();
        d.clear_counter();
        d.record_wrong_frame();
        assert!(!d.poll());
        d.record_wrong_frame();
        assert!(d.poll());
    }

    #[test]
    fn test_clear_counter_does_not_rearm() {
        let mut d = AlarmDebouncer::new(1);
        d.record_wrong_frame();
        assert!(d.poll());
        d.clear_counter();
        assert!(d.triggered());
    }

    struct CountingSink(Arc<AtomicUsize>);

    impl AlertSink for CountingSink {
        fn play(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            bail!("no audio device")
        }
    }

    #[test]
    fn test_dispatch_swallows_failures() {
        let count = Arc::new(AtomicUsize::new(0));
        dispatch_alert(Arc::new(CountingSink(count.clone())));

        let deadline = Instant::now() + Duration::from_secs(2);
        while count.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_wav_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a wav file").unwrap();
        let alert = SoundAlert::new(file.path(), 1.0);
        assert!(alert.play().is_err());
    }

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[f32]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            match spec.sample_format {
                hound::SampleFormat::Float => writer.write_sample(s).unwrap(),
                hound::SampleFormat::Int => writer.write_sample((s * 32768.0) as i16).unwrap(),
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_clip_upsampled_to_device_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarm.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, &[0.5; 8]);

        let clip = AlarmClip::load(&path).unwrap();
        assert_eq!(clip.samples, vec![0.5; 8]);
        assert!((clip.duration_secs() - 0.001).abs() < 1e-6);

        // 8kHz mono -> 16kHz stereo, 半分の音量
        let out = clip.render(16000, 2, 0.5);
        assert_eq!(out.len(), 32);
        assert!(out.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_stereo_clip_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarm.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        write_wav(&path, spec, &[0.2, 0.6, 0.2, 0.6]);

        let clip = AlarmClip::load(&path).unwrap();
        let out = clip.render(44100, 1, 1.0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|&v| (v - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_empty_clip_renders_nothing() {
        let clip = AlarmClip {
            samples: Vec::new(),
            sample_rate: 8000,
            channels: 1,
        };
        assert!(clip.render(48000, 2, 1.0).is_empty());
    }
}
