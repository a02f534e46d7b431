use thiserror::Error;

/// キャプチャデバイスを開く際のエラー
#[derive(Debug, Error)]
pub enum OpenError {
    /// 優先・フォールバックどちらのサンプリングレートも使えない
    #[error("サポートされているキャプチャフォーマットがありません")]
    NoSupportedFormat,

    /// 他のセッションが使用中、またはハードウェア初期化に失敗
    #[error("入力デバイスが使用できません: {0}")]
    DeviceUnavailable(String),
}

/// 録音中のデバイス読み取りエラー
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("デバイス読み取りエラー: {0}")]
    Device(String),

    #[error("デバイスからの音声データが途絶えました")]
    Timeout,
}

/// 録音コマンドのエラー
///
/// `code()` は外部アプリケーションに返すエラーコード。
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("録音はすでに進行中です")]
    AlreadyRecording,

    #[error("空き容量が不足しています: {available} バイト (必要: {required} バイト)")]
    InsufficientStorage { available: u64, required: u64 },

    #[error("キャプチャの初期化に失敗: {0}")]
    InitFailed(#[from] OpenError),

    #[error("オーディオフォーカスを取得できません")]
    PriorityDenied,

    #[error("録音は進行していません")]
    NotRecording,

    #[error("録音エラー: {0}")]
    Recording(String),
}

impl RecorderError {
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::AlreadyRecording => "ALREADY_RECORDING",
            RecorderError::InsufficientStorage { .. } => "LOW_STORAGE",
            RecorderError::InitFailed(_) => "INIT_FAILED",
            RecorderError::PriorityDenied => "AUDIO_FOCUS_FAILED",
            RecorderError::NotRecording => "NOT_RECORDING",
            RecorderError::Recording(_) => "RECORDING_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RecorderError::AlreadyRecording.code(), "ALREADY_RECORDING");
        assert_eq!(
            RecorderError::InsufficientStorage {
                available: 1,
                required: 2
            }
            .code(),
            "LOW_STORAGE"
        );
        assert_eq!(
            RecorderError::from(OpenError::NoSupportedFormat).code(),
            "INIT_FAILED"
        );
        assert_eq!(RecorderError::PriorityDenied.code(), "AUDIO_FOCUS_FAILED");
        assert_eq!(RecorderError::NotRecording.code(), "NOT_RECORDING");
        assert_eq!(
            RecorderError::Recording("x".to_string()).code(),
            "RECORDING_ERROR"
        );
    }
}
