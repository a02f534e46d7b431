use crate::error::{CaptureError, OpenError};
use crate::types::{CaptureConfig, SampleI16};

/// 音声入力サブシステムの抽象
///
/// 実装は `audio_input::CpalBackend` (実デバイス) とテスト用のフェイク。
pub trait AudioBackend: Send + Sync {
    /// 指定レート・モノラル・16ビットでの最小バッファフレーム数
    ///
    /// レートが使えない場合は `None`
    fn min_buffer_frames(&self, sample_rate: u32) -> Option<usize>;

    /// 入力ストリームを開く (マイクの排他取得)
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, OpenError>;
}

/// 開かれた入力ストリーム
pub trait CaptureStream: Send {
    /// エコーキャンセル・AGC・ノイズ抑制を無効化する
    fn disable_signal_conditioning(&mut self) -> anyhow::Result<()>;

    /// 最低1フレーム読めるまでブロックする
    ///
    /// `Ok(0)` はストリーム終端
    fn read(&mut self, buf: &mut [SampleI16]) -> Result<usize, CaptureError>;

    /// デバイスを解放する (冪等)
    fn close(&mut self);
}

/// キャプチャセッション
///
/// 入力デバイスを排他的に保持し、`close()` または drop で解放する。
pub struct CaptureSession {
    stream: Box<dyn CaptureStream>,
    config: CaptureConfig,
    closed: bool,
}

impl CaptureSession {
    /// デバイスを開き、信号処理の無効化を試みる
    ///
    /// 無効化の失敗はログに残すだけで、キャプチャは継続する。
    pub fn open(backend: &dyn AudioBackend, config: CaptureConfig) -> Result<Self, OpenError> {
        let mut stream = backend.open(&config)?;

        match stream.disable_signal_conditioning() {
            Ok(()) => log::debug!("信号処理 (AEC/AGC/NS) を無効化しました"),
            Err(e) => log::warn!("信号処理を無効化できませんでした: {:#}", e),
        }

        log::info!(
            "キャプチャを開始: {}Hz, バッファ {} フレーム",
            config.sample_rate,
            config.buffer_frames
        );

        Ok(Self {
            stream,
            config,
            closed: false,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn read(&mut self, buf: &mut [SampleI16]) -> Result<usize, CaptureError> {
        if self.closed {
            return Ok(0);
        }
        self.stream.read(buf)
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.stream.close();
            self.closed = true;
            log::debug!("キャプチャデバイスを解放しました");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! テスト用のスクリプト駆動バックエンド

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// 読み取り毎の振る舞い
    #[derive(Clone, Debug)]
    pub enum Step {
        /// 指定振幅の矩形波を返す (RMS = 振幅)
        Tone(i16),
        /// デバイスエラー
        Fail,
        /// ストリーム終端
        End,
    }

    #[derive(Clone)]
    pub struct FakeBackend {
        pub supported: Vec<(u32, usize)>,
        pub script: Vec<Step>,
        /// スクリプトを使い切った後に繰り返す振る舞い
        pub tail: Step,
        pub read_delay: Duration,
        pub conditioning_fails: bool,
        pub in_use: Arc<AtomicBool>,
        pub opens: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        pub fn tone(amplitude: i16) -> Self {
            Self {
                supported: vec![(48000, 960), (16000, 320)],
                script: Vec::new(),
                tail: Step::Tone(amplitude),
                read_delay: Duration::from_millis(10),
                conditioning_fails: false,
                in_use: Arc::new(AtomicBool::new(false)),
                opens: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl AudioBackend for FakeBackend {
        fn min_buffer_frames(&self, sample_rate: u32) -> Option<usize> {
            self.supported
                .iter()
                .find(|(rate, _)| *rate == sample_rate)
                .map(|(_, frames)| *frames)
        }

        fn open(&self, _config: &CaptureConfig) -> Result<Box<dyn CaptureStream>, OpenError> {
            if self
                .in_use
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(OpenError::DeviceUnavailable("使用中".to_string()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                backend: self.clone(),
                position: 0,
                closed: false,
            }))
        }
    }

    pub struct FakeStream {
        backend: FakeBackend,
        position: usize,
        closed: bool,
    }

    impl CaptureStream for FakeStream {
        fn disable_signal_conditioning(&mut self) -> anyhow::Result<()> {
            if self.backend.conditioning_fails {
                anyhow::bail!("サポートされていません");
            }
            Ok(())
        }

        fn read(&mut self, buf: &mut [SampleI16]) -> Result<usize, CaptureError> {
            std::thread::sleep(self.backend.read_delay);
            let step = self
                .backend
                .script
                .get(self.position)
                .cloned()
                .unwrap_or_else(|| self.backend.tail.clone());
            self.position += 1;

            match step {
                Step::Tone(amplitude) => {
                    for (i, sample) in buf.iter_mut().enumerate() {
                        *sample = if i % 2 == 0 { amplitude } else { -amplitude };
                    }
                    Ok(buf.len())
                }
                Step::Fail => Err(CaptureError::Device("フェイク障害".to_string())),
                Step::End => Ok(0),
            }
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.backend.closes.fetch_add(1, Ordering::SeqCst);
                self.backend.in_use.store(false, Ordering::SeqCst);
            }
        }
    }
}
