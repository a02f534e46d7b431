use crate::capture::{AudioBackend, CaptureStream};
use crate::config::AudioConfig;
use crate::error::{CaptureError, OpenError};
use crate::types::{CaptureConfig, SampleI16};
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedBufferSize};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use regex_lite::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// コールバックから読み取り側へ渡すチャンクの最大数
const STREAM_QUEUE_CHUNKS: usize = 64;

/// バッファサイズが不明なデバイスで使う周期 (ミリ秒)
const DEFAULT_PERIOD_MS: u32 = 20;

/// cpal コールバックからのメッセージ
enum StreamMessage {
    Samples(Vec<SampleI16>),
    Failed(String),
}

/// cpal によるマイク入力
///
/// ストリームは専用スレッドが保持し、コールバックで受け取った音声を
/// キュー経由でブロッキング読み取りに変換する。
pub struct CpalBackend {
    device_id: String,
    exclude: Option<Regex>,
    read_timeout: Duration,
    in_use: Arc<AtomicBool>,
}

impl CpalBackend {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let exclude = config
            .exclude_devices
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("exclude_devices の正規表現が不正です")?;

        log::info!("設定: {:?}", config);

        Ok(Self {
            device_id: config.device_id.clone(),
            exclude,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            in_use: Arc::new(AtomicBool::new(false)),
        })
    }

    /// デバイス一覧を表示
    pub fn list_devices(&self) -> Result<()> {
        println!("利用可能な入力デバイス:");
        println!();

        for (idx, device) in input_devices(self.exclude.as_ref())?.into_iter().enumerate() {
            let name = device.name()?;
            println!("  [{}] {}", idx, name);

            device.supported_input_configs()?.for_each(|config_range| {
                println!(
                    "      フォーマット: {:?}, {}-{}Hz, {}ch",
                    config_range.sample_format(),
                    config_range.min_sample_rate().0,
                    config_range.max_sample_rate().0,
                    config_range.channels()
                );
            });
            println!();
        }

        Ok(())
    }

    fn spawn_stream(&self, config: &CaptureConfig) -> Result<CpalCapture> {
        let device_id = self.device_id.clone();
        let exclude = self.exclude.clone();
        let config = *config;

        let (data_tx, data_rx) = crossbeam_channel::bounded(STREAM_QUEUE_CHUNKS);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let worker = thread::Builder::new()
            .name("cpal-input".to_string())
            .spawn(move || {
                let stream = match open_input_stream(&device_id, exclude.as_ref(), &config, data_tx)
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // close() まで待機
                let _ = shutdown_rx.recv();
                drop(stream);
                log::info!("音声入力ストリームを停止しました");
            })
            .context("入力スレッドの起動に失敗")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                anyhow::bail!(e);
            }
            Err(_) => {
                let _ = worker.join();
                anyhow::bail!("入力スレッドが異常終了しました");
            }
        }

        Ok(CpalCapture {
            data_rx,
            pending: Vec::new(),
            pending_pos: 0,
            read_timeout: self.read_timeout,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
            in_use: self.in_use.clone(),
        })
    }
}

impl AudioBackend for CpalBackend {
    fn min_buffer_frames(&self, sample_rate: u32) -> Option<usize> {
        let device = match find_device(&self.device_id, self.exclude.as_ref()) {
            Ok(device) => device,
            Err(e) => {
                log::warn!("入力デバイスを取得できません: {:#}", e);
                return None;
            }
        };

        let (range, _) = choose_config_range(&device, sample_rate)?;
        let period = (sample_rate * DEFAULT_PERIOD_MS / 1000) as usize;
        let frames = match range.buffer_size() {
            SupportedBufferSize::Range { min, max } => period.clamp(*min as usize, *max as usize),
            SupportedBufferSize::Unknown => period,
        };
        Some(frames)
    }

    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, OpenError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OpenError::DeviceUnavailable(
                "入力デバイスは別のセッションが使用中です".to_string(),
            ));
        }

        match self.spawn_stream(config) {
            Ok(capture) => Ok(Box::new(capture)),
            Err(e) => {
                self.in_use.store(false, Ordering::SeqCst);
                log::error!("入力ストリームを開けません: {:#}", e);
                Err(OpenError::DeviceUnavailable(format!("{:#}", e)))
            }
        }
    }
}

/// 開かれた cpal 入力
pub struct CpalCapture {
    data_rx: Receiver<StreamMessage>,
    pending: Vec<SampleI16>,
    pending_pos: usize,
    read_timeout: Duration,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    in_use: Arc<AtomicBool>,
}

impl CaptureStream for CpalCapture {
    fn disable_signal_conditioning(&mut self) -> Result<()> {
        anyhow::bail!("cpal はエコーキャンセル/AGC/ノイズ抑制の制御に対応していません")
    }

    fn read(&mut self, buf: &mut [SampleI16]) -> Result<usize, CaptureError> {
        while self.pending_pos >= self.pending.len() {
            match self.data_rx.recv_timeout(self.read_timeout) {
                Ok(StreamMessage::Samples(samples)) => {
                    self.pending = samples;
                    self.pending_pos = 0;
                }
                Ok(StreamMessage::Failed(e)) => return Err(CaptureError::Device(e)),
                Err(RecvTimeoutError::Timeout) => return Err(CaptureError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let n = (self.pending.len() - self.pending_pos).min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        Ok(n)
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() {
                    log::error!("入力スレッドが異常終了しました");
                }
            }
            self.in_use.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.close();
    }
}

/// 入力デバイスを取得 ("default" の場合はシステムのデフォルト)
fn find_device(device_id: &str, exclude: Option<&Regex>) -> Result<cpal::Device> {
    if device_id == "default" {
        let host = cpal::default_host();
        host.default_input_device()
            .context("デフォルト入力デバイスが見つかりません")
    } else {
        input_devices(exclude)?
            .into_iter()
            .find(|d| d.name().ok().as_deref() == Some(device_id))
            .with_context(|| format!("デバイスが見つかりません: {}", device_id))
    }
}

/// 除外パターンに一致するデバイスを除いた入力デバイス一覧
fn input_devices(exclude: Option<&Regex>) -> Result<Vec<cpal::Device>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()?
        .filter(|device| match (exclude, device.name()) {
            (Some(pattern), Ok(name)) => !pattern.is_match(&name),
            _ => true,
        })
        .collect();
    Ok(devices)
}

/// 指定レートを含む設定範囲を選ぶ
///
/// モノラルを優先し、次にサンプルフォーマット (i16 → f32 → その他) で選ぶ。
fn choose_config_range(
    device: &cpal::Device,
    sample_rate: u32,
) -> Option<(cpal::SupportedStreamConfigRange, SampleFormat)> {
    let format_rank = |format: SampleFormat| match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        SampleFormat::I32 => 2,
        SampleFormat::U16 => 3,
        _ => 4,
    };

    let ranges = device.supported_input_configs().ok()?;
    ranges
        .filter(|r| r.min_sample_rate().0 <= sample_rate && sample_rate <= r.max_sample_rate().0)
        .filter(|r| format_rank(r.sample_format()) < 4)
        .min_by_key(|r| (r.channels() != 1, format_rank(r.sample_format())))
        .map(|r| {
            let format = r.sample_format();
            (r, format)
        })
}

fn open_input_stream(
    device_id: &str,
    exclude: Option<&Regex>,
    config: &CaptureConfig,
    data_tx: Sender<StreamMessage>,
) -> Result<cpal::Stream> {
    let device = find_device(device_id, exclude)?;
    log::info!("入力デバイス: {:?}", device.name());

    let (range, sample_format) = choose_config_range(&device, config.sample_rate)
        .with_context(|| format!("{} Hz に対応する入力設定がありません", config.sample_rate))?;

    let buffer_size = match range.buffer_size() {
        SupportedBufferSize::Range { min, max } => {
            cpal::BufferSize::Fixed((config.buffer_frames as u32).clamp(*min, *max))
        }
        SupportedBufferSize::Unknown => cpal::BufferSize::Default,
    };
    let stream_config = cpal::StreamConfig {
        channels: range.channels(),
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size,
    };

    log::info!(
        "デバイス設定: {:?}, {}Hz, {}ch",
        sample_format,
        stream_config.sample_rate.0,
        stream_config.channels
    );

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, data_tx)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, data_tx)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, data_tx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, data_tx)?,
        _ => anyhow::bail!("サポートされていないサンプルフォーマット"),
    };

    stream.play().context("ストリームの再生開始に失敗")?;
    log::info!("音声入力ストリームを開始しました");

    Ok(stream)
}

/// ストリームを構築
fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    data_tx: Sender<StreamMessage>,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let channels = stream_config.channels as usize;
    let error_tx = data_tx.clone();

    let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
        let samples = to_mono_i16(data, channels);

        // 非同期送信（ブロッキングしない）
        match data_tx.try_send(StreamMessage::Samples(samples)) {
            Ok(_) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("入力キューが満杯のためチャンクを破棄しました");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    };

    let error_callback = move |err: cpal::StreamError| {
        log::error!("ストリームエラー: {}", err);
        let _ = error_tx.try_send(StreamMessage::Failed(err.to_string()));
    };

    let stream = device
        .build_input_stream(stream_config, data_callback, error_callback, None)
        .context("入力ストリームの構築に失敗")?;

    Ok(stream)
}

/// インターリーブされたデータをモノラル i16 に変換 (チャンネル平均)
fn to_mono_i16<T>(data: &[T], channels: usize) -> Vec<SampleI16>
where
    T: Sample,
    i16: FromSample<T>,
{
    if channels <= 1 {
        return data.iter().map(|&s| i16::from_sample(s)).collect();
    }

    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i16::from_sample(s) as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}
