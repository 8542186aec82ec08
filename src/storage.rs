//! 键值存储：目录后端（每个键一个文件）与内存后端。

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::ErrorKind;
use tokio::sync::RwLock;

use crate::atomic::AtomicFile;

const KEY_FILE_EXT: &str = "json";

#[derive(Debug)]
pub enum KvStore {
    Dir(DirStore),
    Memory(MemoryStore),
}

impl KvStore {
    pub fn dir(root: PathBuf) -> Self {
        KvStore::Dir(DirStore::new(root))
    }

    pub fn memory() -> Self {
        KvStore::Memory(MemoryStore::default())
    }

    pub async fn ensure_ready(&self) -> io::Result<()> {
        match self {
            KvStore::Dir(store) => store.ensure_root().await,
            KvStore::Memory(_) => Ok(()),
        }
    }

    /// 读取键对应的原始字节，不存在时返回 `None`。
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        match self {
            KvStore::Dir(store) => store.get(key).await,
            KvStore::Memory(store) => Ok(store.entries.read().await.get(key).cloned()),
        }
    }

    /// 整体覆盖写入键对应的值。
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        match self {
            KvStore::Dir(store) => store.put(key, bytes).await,
            KvStore::Memory(store) => {
                store
                    .entries
                    .write()
                    .await
                    .insert(key.to_string(), bytes.to_vec());
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{KEY_FILE_EXT}"))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.key_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut atomic = AtomicFile::new(&self.key_path(key)).await?;
        if let Err(err) = atomic.write_all(bytes).await {
            atomic.cleanup().await;
            return Err(StorageError::Io(err));
        }
        atomic.finalize().await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

/// 键必须是单个普通路径段。
fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.contains(['/', '\\']) {
        return Err(StorageError::InvalidKey);
    }
    let mut components = Path::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if !segment.to_string_lossy().starts_with('.') => {
            Ok(())
        }
        _ => Err(StorageError::InvalidKey),
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidKey,
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidKey => f.write_str("invalid key"),
            StorageError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
