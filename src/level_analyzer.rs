use crate::types::{
    AudioChunk, LevelClass, LevelSample, SampleI16, MIN_SPEECH_ENERGY_THRESHOLD,
    SILENCE_THRESHOLD,
};

/// 16ビット振幅の最大値 (正規化の分母)
pub const FULL_SCALE: f64 = 32768.0;

/// チャンク毎の音量解析
///
/// RMS (Root Mean Square) を計算し、最大振幅で正規化した値を
/// 音声/無音の閾値と比較する。呼び出し毎に独立しており状態を持たない。
///
/// # アルゴリズム
///
/// 1. `rms = sqrt(Σ sample² / n)`
/// 2. `normalized = rms / 32768` (0.0 ~ 1.0)
/// 3. `normalized >= 0.01` なら音声、`normalized < 0.005` なら無音、それ以外は中間
///
/// # Examples
///
/// ```
/// # use voice_recorder::level_analyzer::LevelAnalyzer;
/// # use voice_recorder::types::{AudioChunk, LevelClass};
/// let silence = vec![0i16; 960];
/// let level = LevelAnalyzer::analyze(&AudioChunk::new(&silence, 0));
/// assert_eq!(LevelAnalyzer::classify(level.normalized_rms), LevelClass::Silence);
///
/// let voice: Vec<i16> = (0..960)
///     .map(|i| ((i as f32 * 0.1).sin() * 10000.0) as i16)
///     .collect();
/// let level = LevelAnalyzer::analyze(&AudioChunk::new(&voice, 20));
/// assert_eq!(LevelAnalyzer::classify(level.normalized_rms), LevelClass::Speech);
/// ```
pub struct LevelAnalyzer;

impl LevelAnalyzer {
    /// チャンクのレベルを測定
    pub fn analyze(chunk: &AudioChunk<'_>) -> LevelSample {
        let rms = Self::calculate_rms(chunk.samples);
        LevelSample {
            normalized_rms: (rms / FULL_SCALE).clamp(0.0, 1.0),
            rms,
            timestamp_ms: chunk.timestamp_ms,
        }
    }

    /// 正規化レベルを分類
    pub fn classify(normalized_rms: f64) -> LevelClass {
        if normalized_rms >= MIN_SPEECH_ENERGY_THRESHOLD {
            LevelClass::Speech
        } else if normalized_rms < SILENCE_THRESHOLD {
            LevelClass::Silence
        } else {
            LevelClass::Neutral
        }
    }

    /// RMS を計算 (空のチャンクは 0)
    pub fn calculate_rms(samples: &[SampleI16]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_of_squares: f64 = samples
            .iter()
            .map(|&s| {
                let s = s as f64;
                s * s
            })
            .sum();

        (sum_of_squares / samples.len() as f64).sqrt()
    }
}
