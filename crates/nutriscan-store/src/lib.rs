use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tracing::warn;

use nutriscan_schema::{ChatMessage, ScanRecord, UserProfile};

pub const OBJECTIVES_SLOT: &str = "health_objectives.json";
pub const USER_PROFILE_SLOT: &str = "user_profile.json";
pub const SCAN_HISTORY_SLOT: &str = "scan_history.json";
pub const CONVERSATION_SLOT: &str = "current_conversation.json";

const ALL_SLOTS: [&str; 4] = [
    OBJECTIVES_SLOT,
    USER_PROFILE_SLOT,
    SCAN_HISTORY_SLOT,
    CONVERSATION_SLOT,
];

/// File-backed store with one JSON document per slot.
///
/// Slots are independent: each is written whole on every mutation and read
/// back leniently, so a missing or corrupt file degrades to the empty
/// value instead of failing initialization.
pub struct DataStore {
    data_dir: PathBuf,
}

impl DataStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub async fn load_objectives(&self) -> Result<Vec<String>> {
        self.read_slot(OBJECTIVES_SLOT).await
    }

    pub async fn save_objectives(&self, objectives: &[String]) -> Result<()> {
        self.write_slot(OBJECTIVES_SLOT, &objectives).await
    }

    pub async fn load_profile(&self) -> Result<UserProfile> {
        self.read_slot(USER_PROFILE_SLOT).await
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        self.write_slot(USER_PROFILE_SLOT, profile).await
    }

    pub async fn load_history(&self) -> Result<Vec<ScanRecord>> {
        self.read_slot(SCAN_HISTORY_SLOT).await
    }

    pub async fn save_history(&self, history: &[ScanRecord]) -> Result<()> {
        self.write_slot(SCAN_HISTORY_SLOT, &history).await
    }

    pub async fn load_conversation(&self) -> Result<Vec<ChatMessage>> {
        self.read_slot(CONVERSATION_SLOT).await
    }

    pub async fn save_conversation(&self, conversation: &[ChatMessage]) -> Result<()> {
        self.write_slot(CONVERSATION_SLOT, &conversation).await
    }

    /// Delete every slot unconditionally. In-memory state built from this
    /// store must be re-initialized afterwards.
    pub async fn reset(&self) -> Result<()> {
        for slot in ALL_SLOTS {
            self.remove_slot(slot).await?;
        }
        Ok(())
    }

    async fn read_slot<T: DeserializeOwned + Default>(&self, slot: &str) -> Result<T> {
        let path = self.data_dir.join(slot);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!(slot, %error, "unparsable slot, falling back to empty");
                Ok(T::default())
            }
        }
    }

    async fn write_slot<T: Serialize + ?Sized>(&self, slot: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.data_dir).await?;
        let raw = serde_json::to_string(value)?;
        fs::write(self.data_dir.join(slot), raw).await?;
        Ok(())
    }

    async fn remove_slot(&self, slot: &str) -> Result<()> {
        match fs::remove_file(self.data_dir.join(slot)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
