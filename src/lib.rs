//! voice-recorder - 音声入力用の生PCM録音パイプライン
//!
//! このクレートは、マイクから自動停止・音声認識なしで音声を録音し、
//! 波形表示用のレベルをリアルタイムで通知し、音声/無音の判定で録音を
//! 採用または破棄して、モノラル16ビットのWAVファイルを出力します。
//!
//! # 主な機能
//!
//! - **手動の開始/停止**: 無音による自動停止はしない (最大60秒)
//! - **生音声のキャプチャ**: 48kHz優先、16kHzにフォールバック。信号処理は無効化を試みる
//! - **レベル通知**: チャンク毎の RMS を `audioLevel` イベントとして送信
//! - **品質判定**: 短すぎる録音・音声のない録音を破棄
//! - **WAVファイル出力**: 44バイトのヘッダを録音後に確定
//!
//! # アーキテクチャ
//!
//! ```text
//! [DeviceSelector] → [CaptureSession] → [Recorder (録音スレッド)]
//!                                              │
//!                                     ┌────────┴────────┐
//!                                     │                 │
//!                              [LevelAnalyzer]    [PcmFileWriter]
//!                                     │                 │
//!                                     ↓                 ↓
//!                               [EventSink]      [Gatekeeper] → ヘッダ確定 / 削除
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use std::sync::Arc;
//! use voice_recorder::audio_input::CpalBackend;
//! use voice_recorder::config::Config;
//! use voice_recorder::focus::FocusArbiter;
//! use voice_recorder::recorder::Recorder;
//! use voice_recorder::types::RecordingEvent;
//!
//! let config = Config::load_or_default("config.toml").unwrap();
//! let backend = CpalBackend::new(&config.audio).unwrap();
//! let recorder = Recorder::new(Arc::new(backend), Arc::new(FocusArbiter::new()));
//!
//! let (tx, rx) = crossbeam_channel::bounded::<RecordingEvent>(config.events.queue_capacity);
//! recorder.attach_sink(Arc::new(tx));
//!
//! recorder.start_recording("recordings/voice.wav").unwrap();
//! // ...
//! recorder.stop_recording().unwrap();
//! # drop(rx);
//! ```

pub mod audio_input;
pub mod capture;
pub mod config;
pub mod device_selector;
pub mod error;
pub mod focus;
pub mod gatekeeper;
pub mod level_analyzer;
pub mod recorder;
pub mod sinks;
pub mod storage;
pub mod types;
pub mod wav_writer;
