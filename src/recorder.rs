use crate::capture::{AudioBackend, CaptureSession};
use crate::device_selector::select_capture_config;
use crate::error::RecorderError;
use crate::focus::{AudioFocus, StopSignal};
use crate::gatekeeper::{self, SessionStats, Verdict};
use crate::level_analyzer::LevelAnalyzer;
use crate::sinks::EventSink;
use crate::storage::{check_free_space, FsStorageProbe, StorageCheck, StorageProbe};
use crate::types::{
    AudioChunk, CompletionReport, LevelClass, LevelSample, RecordingEvent, SessionState,
    StartResponse, MAX_RECORDING_DURATION_MS, REQUIRED_FREE_BYTES, SILENCE_DURATION_MS,
};
use crate::wav_writer::{write_header, PcmFileWriter, MAX_DATA_SIZE};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

type SharedSink = Arc<Mutex<Option<Arc<dyn EventSink>>>>;

/// 録音コントローラ
///
/// 1プロセスにつき同時に1セッションのみ。`start_recording` / `stop_recording`
/// は呼び出し元をブロックせず、録音ループは専用スレッドで動く。
///
/// ```text
/// start → [Capturing] ──stop / フォーカス喪失 / 60秒 / 読み取りエラー──→ [Finalizing] → [Closed]
///                                                                     │
///                                        品質判定 OK → ヘッダ確定 / NG → ファイル削除
/// ```
pub struct Recorder {
    backend: Arc<dyn AudioBackend>,
    focus: Arc<dyn AudioFocus>,
    storage: Arc<dyn StorageProbe>,
    sink: SharedSink,
    max_duration_ms: u64,
    session: Mutex<Option<SessionHandle>>,
}

struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    stop: StopSignal,
    worker: Option<JoinHandle<()>>,
}

impl SessionHandle {
    fn state(&self) -> SessionState {
        let finished = self.worker.as_ref().map_or(true, |w| w.is_finished());
        let state = *lock(&self.state);
        if finished && state != SessionState::Closed {
            // スレッドが異常終了した場合
            return SessionState::Closed;
        }
        state
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("録音スレッドが異常終了しました");
            }
        }
    }
}

impl Recorder {
    pub fn new(backend: Arc<dyn AudioBackend>, focus: Arc<dyn AudioFocus>) -> Self {
        Self {
            backend,
            focus,
            storage: Arc::new(FsStorageProbe),
            sink: Arc::new(Mutex::new(None)),
            max_duration_ms: MAX_RECORDING_DURATION_MS,
            session: Mutex::new(None),
        }
    }

    /// 空き容量の取得方法を差し替える
    pub fn with_storage_probe(mut self, storage: Arc<dyn StorageProbe>) -> Self {
        self.storage = storage;
        self
    }

    #[cfg(test)]
    fn with_max_duration_ms(mut self, max_duration_ms: u64) -> Self {
        self.max_duration_ms = max_duration_ms;
        self
    }

    /// イベントの受け手を設定 (録音中でも差し替え可能)
    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) {
        *lock(&self.sink) = Some(sink);
        log::debug!("イベントリスナーを接続しました");
    }

    /// イベントの受け手を外す。以降のイベントは破棄される
    pub fn detach_sink(&self) {
        *lock(&self.sink) = None;
        log::debug!("イベントリスナーを切断しました");
    }

    /// 現在のセッション状態
    pub fn state(&self) -> SessionState {
        lock(&self.session)
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state())
    }

    /// 録音を開始
    ///
    /// 空き容量確認 → デバイス選択・オープン → フォーカス取得 → プレースホルダ書き込み
    /// の順に行い、どこかで失敗したらセッションは作られない。
    pub fn start_recording<P: AsRef<Path>>(
        &self,
        output_path: P,
    ) -> Result<StartResponse, RecorderError> {
        let mut session = lock(&self.session);

        if let Some(current) = session.as_ref() {
            match current.state() {
                SessionState::Capturing | SessionState::Finalizing => {
                    return Err(RecorderError::AlreadyRecording);
                }
                SessionState::Idle | SessionState::Closed => {}
            }
        }
        if let Some(mut finished) = session.take() {
            finished.join();
        }

        let output_path = output_path.as_ref().to_path_buf();

        if let StorageCheck::Insufficient(available) =
            check_free_space(&*self.storage, &output_path, REQUIRED_FREE_BYTES)
        {
            return Err(RecorderError::InsufficientStorage {
                available,
                required: REQUIRED_FREE_BYTES,
            });
        }

        let config = select_capture_config(&*self.backend)?;
        let mut capture = CaptureSession::open(&*self.backend, config)?;

        let stop = StopSignal::new();
        if !self.focus.request(stop.clone()) {
            capture.close();
            return Err(RecorderError::PriorityDenied);
        }

        let writer = match PcmFileWriter::create(&output_path) {
            Ok(writer) => writer,
            Err(e) => {
                capture.close();
                self.focus.abandon(&stop);
                return Err(RecorderError::Recording(format!("{:#}", e)));
            }
        };

        let state = Arc::new(Mutex::new(SessionState::Capturing));
        let worker = CaptureWorker {
            capture,
            writer,
            output_path: output_path.clone(),
            stop: stop.clone(),
            state: state.clone(),
            sink: self.sink.clone(),
            focus: self.focus.clone(),
            max_duration_ms: self.max_duration_ms,
        };

        let handle = thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || worker.run());
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.focus.abandon(&stop);
                let _ = fs::remove_file(&output_path);
                return Err(RecorderError::Recording(format!(
                    "録音スレッドの起動に失敗: {}",
                    e
                )));
            }
        };

        *session = Some(SessionHandle {
            state,
            stop,
            worker: Some(handle),
        });

        log::info!("録音を開始しました: {:?}", output_path);

        Ok(StartResponse {
            success: true,
            sample_rate: config.sample_rate,
            file_path: output_path.display().to_string(),
        })
    }

    /// 録音の停止を要求
    ///
    /// 状態を Finalizing に切り替えるだけで、終了処理は録音スレッドが行う。
    pub fn stop_recording(&self) -> Result<(), RecorderError> {
        let session = lock(&self.session);
        let Some(current) = session.as_ref() else {
            return Err(RecorderError::NotRecording);
        };

        let mut state = lock(&current.state);
        if *state != SessionState::Capturing {
            return Err(RecorderError::NotRecording);
        }
        *state = SessionState::Finalizing;
        current.stop.raise();

        log::debug!("録音停止を要求しました");
        Ok(())
    }

    /// 進行中のセッションを停止し、スレッドの終了を待つ (冪等)
    pub fn dispose(&self) {
        let session = lock(&self.session).take();
        if let Some(mut session) = session {
            session.stop.raise();
            session.join();
            self.focus.abandon(&session.stop);
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// 音声/無音の集計状態
#[derive(Debug, Default)]
struct SpeechTracker {
    has_detected_speech: bool,
    silence_started_ms: Option<u64>,
    pause_logged: bool,
}

impl SpeechTracker {
    fn observe(&mut self, level: &LevelSample) {
        match LevelAnalyzer::classify(level.normalized_rms) {
            LevelClass::Speech => {
                self.has_detected_speech = true;
                self.silence_started_ms = None;
                self.pause_logged = false;
            }
            LevelClass::Silence => {
                let started = *self.silence_started_ms.get_or_insert(level.timestamp_ms);
                let silence_ms = level.timestamp_ms.saturating_sub(started);
                if self.has_detected_speech && !self.pause_logged && silence_ms >= SILENCE_DURATION_MS {
                    // 話者の間とみなし、録音は継続する
                    log::debug!("無音が {}ms 続いています", silence_ms);
                    self.pause_logged = true;
                }
            }
            LevelClass::Neutral => {}
        }
    }
}

/// 録音スレッドが所有するセッション資源
struct CaptureWorker {
    capture: CaptureSession,
    writer: PcmFileWriter,
    output_path: PathBuf,
    stop: StopSignal,
    state: Arc<Mutex<SessionState>>,
    sink: SharedSink,
    focus: Arc<dyn AudioFocus>,
    max_duration_ms: u64,
}

impl CaptureWorker {
    fn run(mut self) {
        let started = Instant::now();
        let mut buffer = vec![0i16; self.capture.config().chunk_frames()];
        let mut tracker = SpeechTracker::default();
        let mut levels: Vec<LevelSample> = Vec::new();
        let mut failure: Option<String> = None;

        loop {
            if self.stop.is_raised() {
                log::debug!("停止要求を検出しました");
                break;
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;
            if elapsed_ms >= self.max_duration_ms {
                log::info!("最大録音時間に到達しました: {}ms", elapsed_ms);
                break;
            }

            let samples_read = match self.capture.read(&mut buffer) {
                Ok(0) => {
                    log::error!("入力ストリームが終了しました");
                    failure = Some("input stream ended".to_string());
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    log::error!("録音中の読み取りエラー: {}", e);
                    failure = Some(e.to_string());
                    break;
                }
            };

            let timestamp_ms = started.elapsed().as_millis() as u64;
            let chunk = AudioChunk::new(&buffer[..samples_read], timestamp_ms);
            let level = LevelAnalyzer::analyze(&chunk);
            tracker.observe(&level);
            levels.push(level);

            if let Err(e) = self.writer.write_samples(chunk.samples) {
                log::error!("録音中のI/Oエラー: {:#}", e);
                failure = Some(format!("{:#}", e));
                break;
            }

            self.emit(RecordingEvent::AudioLevel {
                level: level.normalized_rms,
                raw: level.rms,
            });
        }

        self.set_state(SessionState::Finalizing);
        let report = self.finalize(started, &tracker, &levels, failure);

        self.capture.close();
        self.focus.abandon(&self.stop);

        // Closed が見えた時点で完了イベントは送信済み
        self.emit(RecordingEvent::RecordingComplete(report));
        self.set_state(SessionState::Closed);
    }

    fn finalize(
        &mut self,
        started: Instant,
        tracker: &SpeechTracker,
        levels: &[LevelSample],
        mut failure: Option<String>,
    ) -> CompletionReport {
        let data_size = match self.writer.close() {
            Ok(bytes) => bytes,
            Err(e) => {
                failure.get_or_insert(format!("{:#}", e));
                self.writer.bytes_written()
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let sample_rate = self.capture.config().sample_rate;

        if let Some(detail) = failure {
            self.discard();
            return CompletionReport::failed(format!("IO error: {}", detail));
        }

        let stats = SessionStats {
            duration_ms,
            has_detected_speech: tracker.has_detected_speech,
            levels,
        };

        match gatekeeper::evaluate(&stats) {
            Verdict::Rejected(reason) => {
                self.discard();
                CompletionReport::failed(reason.to_string())
            }
            Verdict::Accepted { average_level } => {
                let Some(data_size) = wav_data_size(data_size) else {
                    self.discard();
                    return CompletionReport::failed("IO error: data size exceeds WAV limit");
                };

                if let Err(e) = write_header(&self.output_path, data_size, sample_rate) {
                    log::error!("WAVヘッダの確定に失敗: {:#}", e);
                    self.discard();
                    return CompletionReport::failed(format!("IO error: {:#}", e));
                }

                let file_path = fs::canonicalize(&self.output_path)
                    .unwrap_or_else(|_| self.output_path.clone());
                log::info!(
                    "録音完了: {:?}, {}ms, {} バイト, 平均レベル {:.4}",
                    file_path,
                    duration_ms,
                    data_size,
                    average_level
                );

                CompletionReport::accepted(
                    file_path.display().to_string(),
                    duration_ms,
                    sample_rate,
                    data_size,
                )
            }
        }
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.output_path) {
            log::warn!("録音ファイルを削除できませんでした {:?}: {}", self.output_path, e);
        }
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn emit(&self, event: RecordingEvent) {
        let sink = lock(&self.sink).clone();
        if let Some(sink) = sink {
            sink.send(event);
        }
    }
}

/// ヘッダに書けるデータ部サイズ
fn wav_data_size(bytes: u64) -> Option<u32> {
    u32::try_from(bytes).ok().filter(|size| *size <= MAX_DATA_SIZE)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
