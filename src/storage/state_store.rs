use std::{future::Future, io::ErrorKind, path::PathBuf};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use super::entities::{Settings, TimeData};

/// Interface for abstracting the persistent key-value state. Two logical
/// documents exist: user settings and accumulated per-site totals.
pub trait StateStore {
    fn load_settings(&self) -> impl Future<Output = Result<Option<Settings>>> + Send;

    fn save_settings(&self, settings: &Settings) -> impl Future<Output = Result<()>> + Send;

    /// Missing data is not an error, it resolves to an empty mapping.
    fn load_time_data(&self) -> impl Future<Output = Result<TimeData>> + Send;

    fn save_time_data(&self, data: &TimeData) -> impl Future<Output = Result<()>> + Send;
}

const SETTINGS_FILE: &str = "settings.json";
const TIME_DATA_FILE: &str = "time_data.json";

/// The main realization of [StateStore]. Each document lives in its own json
/// file inside the application directory. Files are shared with the cli
/// process, so reads take a shared lock and writes an exclusive one.
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    async fn read_document<T: DeserializeOwned>(&self, file_name: &str) -> Result<Option<T>> {
        let path = self.dir.join(file_name);
        debug!("Reading state document {path:?}");

        let file = match File::open(&path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        file.lock_shared()?;
        let mut contents = String::new();
        let mut file = file;
        let read_result = file.read_to_string(&mut contents).await;
        file.unlock_async().await?;
        read_result?;

        match serde_json::from_str::<T>(&contents) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                // Might happen after a shutdown cutting off a write. Treat the
                // document as absent rather than failing the caller.
                warn!("State document {path:?} is corrupted, ignoring it: {e}");
                Ok(None)
            }
        }
    }

    async fn write_document<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file_name);
        debug!("Writing state document {path:?}");

        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        file.lock_exclusive()?;
        let write_result = Self::overwrite_with(&mut file, value).await;
        file.unlock_async().await?;
        write_result
    }

    async fn overwrite_with<T: Serialize>(file: &mut File, value: &T) -> Result<()> {
        let buffer = serde_json::to_vec(value)?;
        file.set_len(0).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    async fn load_settings(&self) -> Result<Option<Settings>> {
        self.read_document(SETTINGS_FILE).await
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.write_document(SETTINGS_FILE, settings).await
    }

    async fn load_time_data(&self) -> Result<TimeData> {
        Ok(self
            .read_document::<TimeData>(TIME_DATA_FILE)
            .await?
            .unwrap_or_default())
    }

    async fn save_time_data(&self, data: &TimeData) -> Result<()> {
        self.write_document(TIME_DATA_FILE, data).await
    }
}
