use crate::types::{LevelSample, MIN_RECORDING_DURATION_MS, MIN_SPEECH_ENERGY_THRESHOLD};
use std::fmt;

/// 録音終了時の集計値
#[derive(Clone, Copy, Debug)]
pub struct SessionStats<'a> {
    pub duration_ms: u64,
    pub has_detected_speech: bool,
    pub levels: &'a [LevelSample],
}

/// 破棄理由
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    NoSpeech,
    /// 平均レベルが低すぎる (外部には NoSpeech と同じ文言で通知)
    LowAverageEnergy,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooShort => write!(f, "Recording too short"),
            RejectReason::NoSpeech | RejectReason::LowAverageEnergy => {
                write!(f, "No speech detected")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    Accepted { average_level: f64 },
    Rejected(RejectReason),
}

/// 録音品質の判定
///
/// 採用/破棄を決めるだけで、無音区間のトリミングは行わない。
pub fn evaluate(stats: &SessionStats<'_>) -> Verdict {
    if stats.duration_ms < MIN_RECORDING_DURATION_MS {
        log::warn!("録音が短すぎます: {}ms", stats.duration_ms);
        return Verdict::Rejected(RejectReason::TooShort);
    }

    if !stats.has_detected_speech {
        log::warn!("録音を破棄: 音声が検出されませんでした (無音のみ)");
        return Verdict::Rejected(RejectReason::NoSpeech);
    }

    let average_level = average_level(stats.levels);
    if average_level < MIN_SPEECH_ENERGY_THRESHOLD {
        log::warn!("録音を破棄: 平均レベルが低すぎます: {:.5}", average_level);
        return Verdict::Rejected(RejectReason::LowAverageEnergy);
    }

    Verdict::Accepted { average_level }
}

/// 正規化レベルの平均 (空なら 0)
pub fn average_level(levels: &[LevelSample]) -> f64 {
    if levels.is_empty() {
        return 0.0;
    }
    levels.iter().map(|l| l.normalized_rms).sum::<f64>() / levels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(values: &[f64]) -> Vec<LevelSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| LevelSample {
                normalized_rms: v,
                rms: v * 32768.0,
                timestamp_ms: i as u64 * 20,
            })
            .collect()
    }

    #[test]
    fn test_too_short_is_rejected_regardless_of_content() {
        let loud = levels(&[0.5; 20]);
        let stats = SessionStats {
            duration_ms: 499,
            has_detected_speech: true,
            levels: &loud,
        };
        assert_eq!(evaluate(&stats), Verdict::Rejected(RejectReason::TooShort));
    }

    #[test]
    fn test_no_speech_flag() {
        let quiet = levels(&[0.0; 50]);
        let stats = SessionStats {
            duration_ms: 1000,
            has_detected_speech: false,
            levels: &quiet,
        };
        let verdict = evaluate(&stats);
        assert_eq!(verdict, Verdict::Rejected(RejectReason::NoSpeech));
        if let Verdict::Rejected(reason) = verdict {
            assert_eq!(reason.to_string(), "No speech detected");
        }
    }

    #[test]
    fn test_low_average_even_with_speech_chunk() {
        // 1チャンクだけ音声、残りは無音 → 平均は閾値未満
        let mut values = vec![0.0; 99];
        values.push(0.02);
        let mostly_quiet = levels(&values);
        let stats = SessionStats {
            duration_ms: 2000,
            has_detected_speech: true,
            levels: &mostly_quiet,
        };
        let verdict = evaluate(&stats);
        assert_eq!(verdict, Verdict::Rejected(RejectReason::LowAverageEnergy));
        assert_eq!(RejectReason::LowAverageEnergy.to_string(), "No speech detected");
    }

    #[test]
    fn test_accepts_speech() {
        let speech = levels(&[0.03, 0.05, 0.002, 0.04]);
        let stats = SessionStats {
            duration_ms: 500,
            has_detected_speech: true,
            levels: &speech,
        };
        match evaluate(&stats) {
            Verdict::Accepted { average_level } => {
                assert!((average_level - 0.0305).abs() < 1e-9)
            }
            other => panic!("Expected Accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_average_of_empty_is_zero() {
        assert_eq!(average_level(&[]), 0.0);
        let stats = SessionStats {
            duration_ms: 800,
            has_detected_speech: true,
            levels: &[],
        };
        assert_eq!(
            evaluate(&stats),
            Verdict::Rejected(RejectReason::LowAverageEnergy)
        );
    }
}
