use crate::types::RecordingEvent;

/// ライブイベントの受け手
///
/// 録音ループをブロックしてはいけない。送れなければ捨てる。
pub trait EventSink: Send + Sync + 'static {
    fn send(&self, event: RecordingEvent);
}
