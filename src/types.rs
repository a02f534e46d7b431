use serde::Serialize;

/// 16ビット整数型のオーディオサンプル
///
/// PCM形式の音声データを表現するための型エイリアス。
/// -32768 から 32767 の範囲の値を取る。
pub type SampleI16 = i16;

/// 優先サンプリングレート (Hz)
pub const PREFERRED_SAMPLE_RATE: u32 = 48_000;

/// フォールバック用の最低サンプリングレート (Hz)
pub const MIN_SAMPLE_RATE: u32 = 16_000;

/// 録音の最短時間 (ミリ秒)。これより短い録音は破棄する
pub const MIN_RECORDING_DURATION_MS: u64 = 500;

/// 録音の最長時間 (ミリ秒)。到達すると強制的に終了処理へ移行する
pub const MAX_RECORDING_DURATION_MS: u64 = 60_000;

/// 音声とみなす正規化RMSの下限 (最大振幅の1%)
pub const MIN_SPEECH_ENERGY_THRESHOLD: f64 = 0.01;

/// 無音とみなす正規化RMSの上限 (最大振幅の0.5%)
pub const SILENCE_THRESHOLD: f64 = 0.005;

/// 音声検出後、この長さの無音が続いたら「間」としてログに残す (ミリ秒)
pub const SILENCE_DURATION_MS: u64 = 2_000;

/// 録音開始前に必要な空き容量 (バイト)
///
/// 48kHz × 2バイト × 60秒 ≒ 5.76MB の2倍
pub const REQUIRED_FREE_BYTES: u64 = 12 * 1024 * 1024;

/// 録音1回分のキャプチャ設定
///
/// サンプリングレートは録音中に変化しない。
/// チャンネル数は常に1 (モノラル)、量子化ビット数は常に16。
///
/// # Examples
///
/// ```
/// # use voice_recorder::types::CaptureConfig;
/// let config = CaptureConfig::mono16(48000, 1920);
/// assert_eq!(config.channels, 1);
/// assert_eq!(config.chunk_frames(), 960);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// サンプリングレート (Hz)
    pub sample_rate: u32,

    /// チャンネル数 (常に1)
    pub channels: u16,

    /// 量子化ビット数 (常に16)
    pub bits_per_sample: u16,

    /// デバイスバッファのフレーム数
    ///
    /// デバイスが報告する最小値の2倍 (ジッタ対策)
    pub buffer_frames: usize,
}

impl CaptureConfig {
    pub fn mono16(sample_rate: u32, buffer_frames: usize) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
            buffer_frames,
        }
    }

    /// 1回の読み取りで要求するフレーム数 (デバイス最小バッファ分)
    pub fn chunk_frames(&self) -> usize {
        (self.buffer_frames / 2).max(1)
    }
}

/// オーディオチャンク
///
/// 1回のデバイス読み取りで得られたサンプル列。
/// 処理後はファイルに追記されたバイト列以外は保持しない。
#[derive(Clone, Copy, Debug)]
pub struct AudioChunk<'a> {
    /// PCM音声サンプルの配列 (読み取りバッファを借用)
    pub samples: &'a [SampleI16],

    /// セッション開始からの経過時間 (ミリ秒)
    pub timestamp_ms: u64,
}

impl<'a> AudioChunk<'a> {
    pub fn new(samples: &'a [SampleI16], timestamp_ms: u64) -> Self {
        Self {
            samples,
            timestamp_ms,
        }
    }
}

/// チャンク毎のレベル測定結果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelSample {
    /// 正規化RMS (0.0 ~ 1.0)
    pub normalized_rms: f64,

    /// 正規化前のRMS
    pub rms: f64,

    /// セッション開始からの経過時間 (ミリ秒)
    pub timestamp_ms: u64,
}

/// レベルの分類
///
/// 2つの閾値の間に入った値は音声でも無音でもない。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelClass {
    /// `MIN_SPEECH_ENERGY_THRESHOLD` 以上
    Speech,
    /// `SILENCE_THRESHOLD` 未満
    Silence,
    /// 閾値の間
    Neutral,
}

/// 録音セッションの状態
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Finalizing,
    Closed,
}

/// 録音開始コマンドの応答
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    pub sample_rate: u32,
    pub file_path: String,
}

/// 録音完了通知の内容
///
/// 成功時は `file_path` 以下が埋まり、失敗時は `error` のみが埋まる。
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionReport {
    pub fn accepted(file_path: String, duration_ms: u64, sample_rate: u32, data_size: u32) -> Self {
        Self {
            success: true,
            file_path: Some(file_path),
            duration: Some(duration_ms),
            sample_rate: Some(sample_rate),
            data_size: Some(data_size),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: None,
            duration: None,
            sample_rate: None,
            data_size: None,
            error: Some(error.into()),
        }
    }
}

/// ライブイベント
///
/// # JSON出力例
///
/// ```json
/// {"type":"audioLevel","level":0.0421,"raw":1379.5}
/// {"type":"recordingComplete","success":false,"error":"No speech detected"}
/// ```
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RecordingEvent {
    #[serde(rename = "audioLevel")]
    AudioLevel {
        /// 正規化RMS
        level: f64,
        /// 正規化前のRMS
        raw: f64,
    },

    #[serde(rename = "recordingComplete")]
    RecordingComplete(CompletionReport),
}

impl RecordingEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, RecordingEvent::RecordingComplete(_))
    }
}
