use anyhow::Result;
use std::path::Path;

/// 空き容量の問い合わせ
pub trait StorageProbe: Send + Sync {
    fn available_bytes(&self, dir: &Path) -> Result<u64>;
}

/// statvfs による空き容量取得
#[derive(Clone, Copy, Debug, Default)]
pub struct FsStorageProbe;

impl StorageProbe for FsStorageProbe {
    #[cfg(unix)]
    fn available_bytes(&self, dir: &Path) -> Result<u64> {
        let stat = nix::sys::statvfs::statvfs(dir)
            .map_err(|e| anyhow::anyhow!("空き容量を取得できません ({:?}): {}", dir, e))?;
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }

    #[cfg(not(unix))]
    fn available_bytes(&self, dir: &Path) -> Result<u64> {
        anyhow::bail!("このプラットフォームでは空き容量を取得できません: {:?}", dir)
    }
}

/// 出力先の空き容量チェック結果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageCheck {
    Sufficient(u64),
    Insufficient(u64),
    /// 取得できなかった (録音は続行する)
    Unknown,
}

/// 出力ファイルの親ディレクトリに `required` バイト以上の空きがあるか調べる
pub fn check_free_space(probe: &dyn StorageProbe, output_path: &Path, required: u64) -> StorageCheck {
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    match probe.available_bytes(dir) {
        Ok(available) if available < required => {
            log::error!("空き容量不足: {} MB", available / (1024 * 1024));
            StorageCheck::Insufficient(available)
        }
        Ok(available) => {
            log::debug!("空き容量チェックOK: {} MB", available / (1024 * 1024));
            StorageCheck::Sufficient(available)
        }
        Err(e) => {
            log::warn!("空き容量を確認できませんでした: {:#}", e);
            StorageCheck::Unknown
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// 固定値を返す
    pub struct FixedProbe(pub Option<u64>);

    impl StorageProbe for FixedProbe {
        fn available_bytes(&self, _dir: &Path) -> Result<u64> {
            self.0.ok_or_else(|| anyhow::anyhow!("unavailable"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FixedProbe;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_free_space() {
        let path = Path::new("/tmp/out.wav");
        assert_eq!(
            check_free_space(&FixedProbe(Some(100)), path, 200),
            StorageCheck::Insufficient(100)
        );
        assert_eq!(
            check_free_space(&FixedProbe(Some(200)), path, 200),
            StorageCheck::Sufficient(200)
        );
        assert_eq!(
            check_free_space(&FixedProbe(None), path, 200),
            StorageCheck::Unknown
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_fs_probe_reads_existing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FsStorageProbe.available_bytes(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_fs_probe_missing_dir_is_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("out.wav");
        assert_eq!(
            check_free_space(&FsStorageProbe, &path, 1),
            StorageCheck::Unknown
        );
    }
}
