use crate::types::SampleI16;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// RIFF/WAVE ヘッダのバイト長
pub const WAV_HEADER_LEN: usize = 44;

/// データ部の最大バイト数 (RIFFサイズ = データ + 36 が u32 に収まる範囲)
pub const MAX_DATA_SIZE: u32 = u32::MAX - 36;

/// PCM・モノラル・16ビットの44バイトヘッダを生成
///
/// # Examples
///
/// ```
/// # use voice_recorder::wav_writer::encode_header;
/// let header = encode_header(96000, 48000);
/// assert_eq!(&header[0..4], b"RIFF");
/// assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 96036);
/// ```
pub fn encode_header(data_size: u32, sample_rate: u32) -> [u8; WAV_HEADER_LEN] {
    debug_assert!(data_size <= MAX_DATA_SIZE);
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

    let mut header = [0u8; WAV_HEADER_LEN];

    // RIFF チャンク
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&data_size.saturating_add(36).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt チャンク
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&(sample_rate * BLOCK_ALIGN as u32).to_le_bytes());
    header[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data チャンク
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// 既存ファイルの先頭44バイトをヘッダで上書き
///
/// 45バイト目以降には触れない。
pub fn write_header<P: AsRef<Path>>(path: P, data_size: u32, sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    if data_size > MAX_DATA_SIZE {
        anyhow::bail!("データサイズがWAVの上限を超えています: {} バイト", data_size);
    }
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("WAVファイルを開けません: {:?}", path))?;

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&encode_header(data_size, sample_rate))
        .with_context(|| format!("WAVヘッダの書き込みに失敗: {:?}", path))?;
    file.flush()?;

    Ok(())
}

/// 録音中のPCM書き出し
///
/// 作成時に44バイトのゼロ埋めプレースホルダを書き、以降はサンプルを
/// リトルエンディアンで追記する。ヘッダは `write_header` で後から確定する。
pub struct PcmFileWriter {
    current_file: Option<BufWriter<fs::File>>,
    bytes_written: u64,
}

impl PcmFileWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // 出力ディレクトリが存在しない場合は作成
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("出力ディレクトリの作成に失敗: {:?}", parent))?;
            }
        }

        let file = fs::File::create(&path)
            .with_context(|| format!("WAVファイルの作成に失敗: {:?}", path))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&[0u8; WAV_HEADER_LEN])
            .with_context(|| "WAVヘッダのプレースホルダ書き込みに失敗")?;

        log::debug!("WAVファイル作成: {:?}", path);

        Ok(Self {
            current_file: Some(writer),
            bytes_written: 0,
        })
    }

    /// サンプルを書き込み
    pub fn write_samples(&mut self, samples: &[SampleI16]) -> Result<()> {
        let writer = self
            .current_file
            .as_mut()
            .context("WAVファイルはすでに閉じられています")?;

        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        writer
            .write_all(&bytes)
            .with_context(|| "WAVファイルへのサンプル書き込みに失敗")?;
        self.bytes_written += bytes.len() as u64;

        Ok(())
    }

    /// ファイルを閉じ、データ部のバイト数を返す
    pub fn close(&mut self) -> Result<u64> {
        if let Some(mut writer) = self.current_file.take() {
            writer
                .flush()
                .with_context(|| "WAVファイルのフラッシュに失敗")?;
        }
        Ok(self.bytes_written)
    }

    /// 書き込んだデータ部のバイト数
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for PcmFileWriter {
    fn drop(&mut self) {
        if self.current_file.is_some() {
            if let Err(e) = self.close() {
                log::error!("PcmFileWriter のドロップ時にエラー: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn le_u32(bytes: &[u8]) -> u32 {
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    fn le_u16(bytes: &[u8]) -> u16 {
        u16::from_le_bytes(bytes.try_into().unwrap())
    }

    #[test]
    fn test_header_layout() {
        let header = encode_header(96000, 48000);

        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(le_u32(&header[4..8]), 96036);
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(le_u32(&header[16..20]), 16);
        assert_eq!(le_u16(&header[20..22]), 1);
        assert_eq!(le_u16(&header[22..24]), 1);
        assert_eq!(le_u32(&header[24..28]), 48000);
        assert_eq!(le_u32(&header[28..32]), 96000);
        assert_eq!(le_u16(&header[32..34]), 2);
        assert_eq!(le_u16(&header[34..36]), 16);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(le_u32(&header[40..44]), 96000);
    }

    #[test]
    fn test_placeholder_then_header() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("out.wav");

        let mut writer = PcmFileWriter::create(&path)?;
        writer.write_samples(&[1, -2, 0x1234])?;
        let data_size = writer.close()?;
        assert_eq!(data_size, 6);

        let raw = fs::read(&path)?;
        assert_eq!(raw.len(), WAV_HEADER_LEN + 6);
        assert!(raw[..WAV_HEADER_LEN].iter().all(|&b| b == 0));
        assert_eq!(&raw[WAV_HEADER_LEN..], &[0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);

        write_header(&path, data_size as u32, 16000)?;

        let raw = fs::read(&path)?;
        assert_eq!(raw.len(), WAV_HEADER_LEN + 6);
        assert_eq!(&raw[..WAV_HEADER_LEN], &encode_header(6, 16000));
        assert_eq!(&raw[WAV_HEADER_LEN..], &[0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);

        Ok(())
    }

    #[test]
    fn test_output_is_readable_wav() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("tone.wav");

        let samples: Vec<i16> = (0..16000)
            .map(|i| ((i as f32 * 0.1).sin() * 10000.0) as i16)
            .collect();

        let mut writer = PcmFileWriter::create(&path)?;
        writer.write_samples(&samples)?;
        let data_size = writer.close()?;
        write_header(&path, data_size as u32, 16000)?;

        let mut reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let read_back: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
        assert_eq!(read_back, samples);

        Ok(())
    }

    #[test]
    fn test_header_rejects_oversized_data() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("big.wav");
        let mut writer = PcmFileWriter::create(&path)?;
        writer.close()?;

        assert!(write_header(&path, MAX_DATA_SIZE + 1, 16000).is_err());
        assert!(fs::read(&path)?.iter().all(|&b| b == 0));

        write_header(&path, MAX_DATA_SIZE, 16000)?;
        let raw = fs::read(&path)?;
        assert_eq!(le_u32(&raw[4..8]), u32::MAX);
        Ok(())
    }

    #[test]
    fn test_write_after_close_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut writer = PcmFileWriter::create(temp_dir.path().join("a.wav"))?;
        writer.close()?;
        assert!(writer.write_samples(&[0]).is_err());
        assert_eq!(writer.close()?, 0);
        Ok(())
    }
}
