use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Flat on-disk store for uploaded materials.
///
/// Each file lives at `{dir}/{stored_name}`; the stored name is generated
/// server-side and recorded in the material row.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn file_path(&self, stored_name: &str) -> PathBuf {
        self.dir.join(stored_name)
    }

    /// Write a new stored file. A write that fails part way removes whatever
    /// reached the disk.
    pub async fn write_file(&self, stored_name: &str, data: &[u8]) -> Result<()> {
        let path = self.file_path(stored_name);
        let file = fs::File::create(&path).await?;
        write_or_remove(&path, file, data).await
    }

    pub async fn exists(&self, stored_name: &str) -> bool {
        fs::try_exists(self.file_path(stored_name)).await.unwrap_or(false)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn delete_file(&self, stored_name: &str) -> Result<()> {
        let path = self.file_path(stored_name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted stored file {}", stored_name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Stored file {} already gone", stored_name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_or_remove<W>(path: &Path, mut out: W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        out.write_all(data).await?;
        out.flush().await
    }
    .await;
    drop(out);

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(path).await {
            warn!("Failed to remove partial file {}: {}", path.display(), cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

/// `{16 hex chars}_{unix millis}_{sanitized original name}`. Anything outside
/// `[A-Za-z0-9.]` becomes `_`, so the result never contains a path separator.
pub fn stored_file_name(original: &str) -> String {
    let prefix = hex::encode(rand::random::<[u8; 8]>());
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}_{}_{}", prefix, millis, sanitize(original))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}
