use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::db::InterruptionReason;

/// How paused wall-clock time is treated when computing elapsed time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PausePolicy {
    /// Elapsed only counts running segments: pause at `e`, resume for `d`, total `e + d`.
    #[default]
    ExcludePaused,
    /// Elapsed is `now - start` of the run, paused time included.
    IncludePaused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
struct UserSettings {
    voice_prompt_enabled: bool,
    custom_interruption_reasons: Vec<String>,
    pause_policy: PausePolicy,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn voice_prompt_enabled(&self) -> bool {
        self.read().voice_prompt_enabled
    }

    pub fn set_voice_prompt_enabled(&self, enabled: bool) -> Result<()> {
        let mut guard = self.write();
        guard.voice_prompt_enabled = enabled;
        self.persist(&guard)
    }

    pub fn pause_policy(&self) -> PausePolicy {
        self.read().pause_policy
    }

    pub fn set_pause_policy(&self, policy: PausePolicy) -> Result<()> {
        let mut guard = self.write();
        guard.pause_policy = policy;
        self.persist(&guard)
    }

    pub fn custom_interruption_reasons(&self) -> Vec<String> {
        self.read().custom_interruption_reasons.clone()
    }

    /// Built-in reasons first, then the user's own in insertion order.
    pub fn all_interruption_reasons(&self) -> Vec<InterruptionReason> {
        InterruptionReason::BUILT_IN
            .into_iter()
            .chain(
                self.read()
                    .custom_interruption_reasons
                    .iter()
                    .cloned()
                    .map(InterruptionReason::Custom),
            )
            .collect()
    }

    pub fn add_custom_interruption_reason(&self, reason: &str) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            bail!("interruption reason must not be empty");
        }
        if InterruptionReason::from(reason).is_built_in() {
            bail!("'{reason}' is already a built-in interruption reason");
        }

        let mut guard = self.write();
        if guard
            .custom_interruption_reasons
            .iter()
            .any(|existing| existing == reason)
        {
            bail!("interruption reason '{reason}' already exists");
        }
        guard.custom_interruption_reasons.push(reason.to_string());
        self.persist(&guard)
    }

    pub fn remove_custom_interruption_reason(&self, reason: &str) -> Result<()> {
        let mut guard = self.write();
        guard
            .custom_interruption_reasons
            .retain(|existing| existing != reason);
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
