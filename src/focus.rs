use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// 録音ループに停止を伝える共有フラグ
///
/// 手動停止とフォーカス喪失の両方がこのフラグを立てる。
/// ループは各イテレーションの境界でのみ確認する (協調的キャンセル)。
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 同じセッションのフラグかどうか (クローン同士は true)
    pub fn same_as(&self, other: &StopSignal) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// フォーカス変化の種類
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    LossTransient,
    LossTransientCanDuck,
    Loss,
}

/// OSのオーディオ調停層との境界
pub trait AudioFocus: Send + Sync {
    /// フォーカスを要求する。喪失時は `on_loss` を立てる
    fn request(&self, on_loss: StopSignal) -> bool;

    /// `owner` が保持しているフォーカスを放棄する (冪等)
    ///
    /// 他のセッションが保持している場合は何もしない。
    fn abandon(&self, owner: &StopSignal);
}

/// プロセス内のフォーカス調停
///
/// 保持者は常に1つ。外部からの割り込みは `notify` で通知する。
#[derive(Debug, Default)]
pub struct FocusArbiter {
    holder: Mutex<Option<StopSignal>>,
}

impl FocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 外部からのフォーカス変化を通知
    pub fn notify(&self, change: FocusChange) {
        let holder = lock(&self.holder);
        match change {
            FocusChange::Gain => log::debug!("オーディオフォーカスを取得しました"),
            FocusChange::LossTransient | FocusChange::LossTransientCanDuck => {
                log::info!("オーディオフォーカスを一時的に失いました - 録音を停止します");
                if let Some(signal) = holder.as_ref() {
                    signal.raise();
                }
            }
            FocusChange::Loss => {
                log::info!("オーディオフォーカスを失いました - 録音を停止します");
                if let Some(signal) = holder.as_ref() {
                    signal.raise();
                }
            }
        }
    }

    pub fn is_held(&self) -> bool {
        lock(&self.holder).is_some()
    }
}

impl AudioFocus for FocusArbiter {
    fn request(&self, on_loss: StopSignal) -> bool {
        let mut holder = lock(&self.holder);
        match holder.as_ref() {
            Some(current) if !current.is_raised() => {
                log::warn!("オーディオフォーカスは別のセッションが保持しています");
                false
            }
            _ => {
                *holder = Some(on_loss);
                true
            }
        }
    }

    fn abandon(&self, owner: &StopSignal) {
        let mut holder = lock(&self.holder);
        if holder.as_ref().is_some_and(|current| current.same_as(owner)) {
            *holder = None;
            log::debug!("オーディオフォーカスを放棄しました");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let arbiter = FocusArbiter::new();
        let first = StopSignal::new();
        assert!(arbiter.request(first.clone()));
        assert!(!arbiter.request(StopSignal::new()));

        arbiter.abandon(&first);
        assert!(!arbiter.is_held());
        assert!(arbiter.request(StopSignal::new()));
    }

    #[test]
    fn test_abandon_ignores_other_owner() {
        let arbiter = FocusArbiter::new();
        let holder = StopSignal::new();
        assert!(arbiter.request(holder.clone()));

        arbiter.abandon(&StopSignal::new());
        assert!(arbiter.is_held());

        arbiter.notify(FocusChange::Loss);
        assert!(holder.is_raised());
    }

    #[test]
    fn test_stale_owner_cannot_release_successor() {
        let arbiter = FocusArbiter::new();
        let stale = StopSignal::new();
        arbiter.request(stale.clone());
        stale.raise();

        let next = StopSignal::new();
        assert!(arbiter.request(next.clone()));
        arbiter.abandon(&stale);
        assert!(arbiter.is_held());

        arbiter.notify(FocusChange::LossTransient);
        assert!(next.is_raised());
    }

    #[test]
    fn test_loss_raises_stop_signal() {
        for change in [
            FocusChange::Loss,
            FocusChange::LossTransient,
            FocusChange::LossTransientCanDuck,
        ] {
            let arbiter = FocusArbiter::new();
            let signal = StopSignal::new();
            assert!(arbiter.request(signal.clone()));
            arbiter.notify(change);
            assert!(signal.is_raised(), "{:?}", change);
        }
    }

    #[test]
    fn test_gain_does_not_stop() {
        let arbiter = FocusArbiter::new();
        let signal = StopSignal::new();
        arbiter.request(signal.clone());
        arbiter.notify(FocusChange::Gain);
        assert!(!signal.is_raised());
    }

    #[test]
    fn test_stopped_holder_can_be_replaced() {
        let arbiter = FocusArbiter::new();
        let stale = StopSignal::new();
        arbiter.request(stale.clone());
        stale.raise();
        assert!(arbiter.request(StopSignal::new()));
    }

    #[test]
    fn test_notify_without_holder() {
        let arbiter = FocusArbiter::new();
        arbiter.notify(FocusChange::Loss);
        assert!(!arbiter.is_held());
    }
}
