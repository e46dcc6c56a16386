use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{
    ApplyRecord, ApplyReport, DestroyReport, ResourceId, ResourceOutcome, ResourceState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name inside the state directory
pub const STATE_FILE: &str = "state.toml";

// ============================================================================
// State Structures
// ============================================================================

/// Everything skyplan remembers between runs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SkyplanState {
    /// State for each stack, keyed by stack name
    #[serde(default)]
    pub stacks: BTreeMap<String, StackState>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// State for a single stack
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StackState {
    /// Declaration fingerprint at the last apply
    pub fingerprint: Option<String>,

    pub last_apply: Option<DateTime<Utc>>,

    pub last_destroy: Option<DateTime<Utc>>,

    /// Last known state per resource, keyed by `kind/name`
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,

    /// Last provider error per failed resource
    #[serde(default)]
    pub errors: BTreeMap<String, String>,

    /// What the applies so far attempted, in plan order
    #[serde(default)]
    pub record: ApplyRecord,
}

// ============================================================================
// SkyplanState Implementation
// ============================================================================

impl SkyplanState {
    fn state_file(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::state_file(dir);

        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;

        let path = Self::state_file(dir);
        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(&path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, dir: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(dir)
    }

    pub fn stack(&self, name: &str) -> Option<&StackState> {
        self.stacks.get(name)
    }

    /// Get or create stack state
    pub fn stack_mut(&mut self, name: &str) -> &mut StackState {
        self.stacks.entry(name.to_string()).or_default()
    }
}

impl Default for SkyplanState {
    fn default() -> Self {
        Self {
            stacks: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// StackState Implementation
// ============================================================================

impl StackState {
    /// Recorded state of a resource; `NotCreated` if never seen
    pub fn state_of(&self, id: &ResourceId) -> ResourceState {
        self.resources
            .get(&id.to_string())
            .copied()
            .unwrap_or_default()
    }

    pub fn error_of(&self, id: &ResourceId) -> Option<&str> {
        self.errors.get(&id.to_string()).map(String::as_str)
    }

    /// Fold an apply run into the stack
    ///
    /// Resources the run never attempted keep whatever was recorded
    /// before; a partial run must not forget earlier creations.
    pub fn record_apply(&mut self, report: &ApplyReport, fingerprint: &str) {
        for outcome in &report.outcomes {
            if outcome.state != ResourceState::NotCreated {
                self.set_outcome(outcome);
            }
        }
        self.record = ApplyRecord::from_apply(report, Some(&self.record));
        if report.is_success() {
            self.fingerprint = Some(fingerprint.to_string());
        }
        self.last_apply = Some(Utc::now());
    }

    /// Fold a destroy run into the stack
    pub fn record_destroy(&mut self, report: &DestroyReport) {
        for outcome in &report.outcomes {
            if matches!(outcome.state, ResourceState::Deleted | ResourceState::Failed) {
                self.set_outcome(outcome);
            }
        }
        self.record = self.record.after_destroy(report);
        if self.record.is_empty() {
            self.fingerprint = None;
        }
        self.last_destroy = Some(Utc::now());
    }

    /// Whether the declarations changed since the last successful apply
    pub fn is_drifted_from(&self, fingerprint: &str) -> Option<bool> {
        self.fingerprint.as_deref().map(|f| f != fingerprint)
    }

    fn set_outcome(&mut self, outcome: &ResourceOutcome) {
        let key = outcome.id.to_string();
        self.resources.insert(key.clone(), outcome.state);
        match &outcome.error {
            Some(e) => {
                self.errors.insert(key, e.message.clone());
            }
            None => {
                self.errors.remove(&key);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
