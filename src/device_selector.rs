use crate::capture::AudioBackend;
use crate::error::OpenError;
use crate::types::{CaptureConfig, MIN_SAMPLE_RATE, PREFERRED_SAMPLE_RATE};

/// 試行するサンプリングレート (優先順)
pub const CANDIDATE_SAMPLE_RATES: [u32; 2] = [PREFERRED_SAMPLE_RATE, MIN_SAMPLE_RATE];

/// キャプチャ設定を選択
///
/// 48kHz → 16kHz の順に最小バッファサイズを問い合わせ、
/// 最初に成功したレートを採用する。バッファはジッタ対策として2倍にする。
pub fn select_capture_config(backend: &dyn AudioBackend) -> Result<CaptureConfig, OpenError> {
    for (idx, &rate) in CANDIDATE_SAMPLE_RATES.iter().enumerate() {
        match backend.min_buffer_frames(rate) {
            Some(frames) if frames > 0 => {
                if idx == 0 {
                    log::debug!("優先サンプリングレートを使用: {} Hz", rate);
                } else {
                    log::debug!("フォールバックサンプリングレートを使用: {} Hz", rate);
                }
                return Ok(CaptureConfig::mono16(rate, frames * 2));
            }
            _ => log::debug!("{} Hz は使用できません", rate),
        }
    }

    log::error!("有効なバッファサイズを取得できませんでした");
    Err(OpenError::NoSupportedFormat)
}
