mod sink_trait;

pub use sink_trait::EventSink;

use crate::types::RecordingEvent;

/// tokio チャンネルへの送信 (ブロッキングしない)
impl EventSink for tokio::sync::mpsc::Sender<RecordingEvent> {
    fn send(&self, event: RecordingEvent) {
        match self.try_send(event) {
            Ok(_) => {}
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                log::warn!("イベント送信失敗: バッファ満杯");
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("イベント送信失敗: チャンネルクローズ");
            }
        }
    }
}

impl EventSink for crossbeam_channel::Sender<RecordingEvent> {
    fn send(&self, event: RecordingEvent) {
        match self.try_send(event) {
            Ok(_) => {}
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                log::warn!("イベント送信失敗: バッファ満杯");
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                log::debug!("イベント送信失敗: チャンネルクローズ");
            }
        }
    }
}
