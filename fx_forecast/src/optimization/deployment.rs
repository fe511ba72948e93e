//! Deployment of model configurations
//!
//! A deployment swaps the active configuration of one horizon. The previous
//! configuration is backed up first so it can be rolled back, and the swap is
//! a single rename so readers never observe a half-written file. A rollback
//! archives the configuration it replaces, so no deployed version is lost and
//! version numbers are never reused.

use crate::error::{ForecastError, Result};
use crate::horizon::Horizon;
use crate::models::ModelConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ACTIVE_FILE: &str = "active.json";
const BACKUP_DIR: &str = "backups";
const ARCHIVE_DIR: &str = "archive";

/// Configuration currently serving a horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedConfig {
    pub config: ModelConfig,
    pub horizon_days: u32,
    pub deployed_at: DateTime<Utc>,
    /// Walk-forward RMSE that justified the deployment
    pub validation_rmse: Option<f64>,
    /// Per-horizon counter, strictly increasing across deploys and rollbacks
    pub version: u32,
}

/// Outcome of a deployment attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub success: bool,
    pub version: Option<u32>,
    pub backup_path: Option<PathBuf>,
    pub message: String,
    pub deployed_at: Option<DateTime<Utc>>,
}

impl DeploymentReport {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            version: None,
            backup_path: None,
            message,
            deployed_at: None,
        }
    }
}

/// Transactional store of the deployed configuration per horizon
pub trait DeploymentManager: Send + Sync {
    /// Active configuration, if one was ever deployed
    fn get_current_config(&self, horizon: Horizon) -> Result<Option<DeployedConfig>>;

    /// Back up the active configuration and swap in `config`
    ///
    /// A failed deployment leaves the previous configuration active.
    fn deploy(
        &self,
        horizon: Horizon,
        config: &ModelConfig,
        validation_rmse: Option<f64>,
    ) -> DeploymentReport;

    /// Restore the most recent backup; `None` when there is nothing to restore
    fn rollback(&self, horizon: Horizon) -> Result<Option<DeployedConfig>>;
}

/// Deployment store on the local filesystem
///
/// Layout: `root/<horizon>/active.json`,
/// `root/<horizon>/backups/v<version>_<timestamp>.json` for configurations a
/// rollback can restore, and `root/<horizon>/archive/` for configurations a
/// rollback replaced.
#[derive(Debug)]
pub struct FileDeploymentManager {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileDeploymentManager {
    /// Manager rooted at `root`, created if missing
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    /// Backup files of a horizon, oldest first
    pub fn backups(&self, horizon: Horizon) -> Result<Vec<PathBuf>> {
        list_json(&self.horizon_dir(horizon).join(BACKUP_DIR))
    }

    /// Configurations replaced by a rollback, oldest first
    pub fn archived(&self, horizon: Horizon) -> Result<Vec<PathBuf>> {
        list_json(&self.horizon_dir(horizon).join(ARCHIVE_DIR))
    }

    /// Read one stored configuration file
    pub fn read_config<P: AsRef<Path>>(&self, path: P) -> Result<DeployedConfig> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn horizon_dir(&self, horizon: Horizon) -> PathBuf {
        self.root.join(horizon.label())
    }

    fn read_active(&self, horizon: Horizon) -> Result<Option<DeployedConfig>> {
        let path = self.horizon_dir(horizon).join(ACTIVE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write_active(&self, horizon: Horizon, deployed: &DeployedConfig) -> Result<()> {
        let dir = self.horizon_dir(horizon);
        fs::create_dir_all(&dir)?;
        let tmp = dir.join(format!("{}.tmp", ACTIVE_FILE));
        fs::write(&tmp, serde_json::to_string_pretty(deployed)?)?;
        fs::rename(&tmp, dir.join(ACTIVE_FILE))?;
        Ok(())
    }

    /// Highest version ever issued for the horizon, 0 when none
    fn latest_version(&self, horizon: Horizon) -> Result<u32> {
        let mut latest = self.read_active(horizon)?.map_or(0, |c| c.version);
        for path in self
            .backups(horizon)?
            .into_iter()
            .chain(self.archived(horizon)?)
        {
            latest = latest.max(self.read_config(&path)?.version);
        }
        Ok(latest)
    }

    fn backup(&self, horizon: Horizon, current: &DeployedConfig) -> Result<PathBuf> {
        self.store(horizon, BACKUP_DIR, current)
    }

    fn store(&self, horizon: Horizon, kind: &str, current: &DeployedConfig) -> Result<PathBuf> {
        let dir = self.horizon_dir(horizon).join(kind);
        fs::create_dir_all(&dir)?;
        // Zero-padded version first so lexical order is deployment order
        let path = dir.join(format!(
            "v{:06}_{}.json",
            current.version,
            current.deployed_at.format("%Y%m%dT%H%M%S%.f")
        ));
        fs::write(&path, serde_json::to_string_pretty(current)?)?;
        Ok(path)
    }

    fn try_deploy(
        &self,
        horizon: Horizon,
        config: &ModelConfig,
        validation_rmse: Option<f64>,
    ) -> Result<DeploymentReport> {
        config.validate()?;

        let version = self.latest_version(horizon)? + 1;
        let current = self.read_active(horizon)?;
        let backup_path = match &current {
            Some(c) => Some(self.backup(horizon, c)?),
            None => None,
        };

        let deployed = DeployedConfig {
            config: config.clone(),
            horizon_days: horizon.days(),
            deployed_at: Utc::now(),
            validation_rmse,
            version,
        };
        self.write_active(horizon, &deployed)?;

        Ok(DeploymentReport {
            success: true,
            version: Some(deployed.version),
            backup_path,
            message: format!("Deployed version {} for {}", deployed.version, horizon),
            deployed_at: Some(deployed.deployed_at),
        })
    }
}

impl DeploymentManager for FileDeploymentManager {
    fn get_current_config(&self, horizon: Horizon) -> Result<Option<DeployedConfig>> {
        let _guard = self.lock.lock();
        self.read_active(horizon)
    }

    fn deploy(
        &self,
        horizon: Horizon,
        config: &ModelConfig,
        validation_rmse: Option<f64>,
    ) -> DeploymentReport {
        let _guard = self.lock.lock();
        match self.try_deploy(horizon, config, validation_rmse) {
            Ok(report) => {
                info!(horizon = %horizon, version = ?report.version, "configuration deployed");
                report
            }
            Err(e) => {
                warn!(horizon = %horizon, error = %e, "deployment failed");
                DeploymentReport::failed(format!("Deployment for {} failed: {}", horizon, e))
            }
        }
    }

    fn rollback(&self, horizon: Horizon) -> Result<Option<DeployedConfig>> {
        let _guard = self.lock.lock();
        let latest = match self.backups(horizon)?.pop() {
            Some(path) => path,
            None => return Ok(None),
        };

        let restored = self.read_config(&latest)?;
        if restored.horizon_days != horizon.days() {
            return Err(ForecastError::Deployment(format!(
                "Backup {} belongs to horizon {}d",
                latest.display(),
                restored.horizon_days
            )));
        }

        if let Some(outgoing) = self.read_active(horizon)? {
            let archived = self.store(horizon, ARCHIVE_DIR, &outgoing)?;
            debug!(horizon = %horizon, path = %archived.display(), "outgoing configuration archived");
        }
        self.write_active(horizon, &restored)?;
        fs::remove_file(&latest)?;
        info!(horizon = %horizon, version = restored.version, "configuration rolled back");
        Ok(Some(restored))
    }
}

fn list_json(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_deploy_then_rollback() {
        let dir = tempdir().unwrap();
        let manager = FileDeploymentManager::new(dir.path()).unwrap();
        let horizon = Horizon::new(7).unwrap();

        assert!(manager.get_current_config(horizon).unwrap().is_none());
        assert!(manager.rollback(horizon).unwrap().is_none());

        let first = ModelConfig::default();
        let report = manager.deploy(horizon, &first, Some(0.5));
        assert!(report.success);
        assert_eq!(report.version, Some(1));
        assert!(report.backup_path.is_none());

        let mut second = ModelConfig::default();
        second.boosted_trees.n_estimators = 42;
        let report = manager.deploy(horizon, &second, Some(0.4));
        assert!(report.success);
        assert_eq!(report.version, Some(2));
        assert!(report.backup_path.is_some());

        let active = manager.get_current_config(horizon).unwrap().unwrap();
        assert_eq!(active.config, second);

        let restored = manager.rollback(horizon).unwrap().unwrap();
        assert_eq!(restored.config, first);
        assert_eq!(restored.version, 1);
        assert!(manager.backups(horizon).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_archives_outgoing_and_never_reuses_versions() {
        let dir = tempdir().unwrap();
        let manager = FileDeploymentManager::new(dir.path()).unwrap();
        let horizon = Horizon::new(7).unwrap();

        let mut second = ModelConfig::default();
        second.boosted_trees.n_estimators = 42;
        manager.deploy(horizon, &ModelConfig::default(), None);
        manager.deploy(horizon, &second, None);
        manager.rollback(horizon).unwrap();

        let archived = manager.archived(horizon).unwrap();
        assert_eq!(archived.len(), 1);
        let rolled_back = manager.read_config(&archived[0]).unwrap();
        assert_eq!(rolled_back.version, 2);
        assert_eq!(rolled_back.config, second);

        let mut third = ModelConfig::default();
        third.boosted_trees.n_estimators = 77;
        let report = manager.deploy(horizon, &third, None);
        assert!(report.success);
        assert_eq!(report.version, Some(3));

        // Version 1 went back to the backups when version 3 replaced it
        let backups = manager.backups(horizon).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(manager.read_config(&backups[0]).unwrap().version, 1);
        assert_eq!(manager.archived(horizon).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_config_keeps_previous() {
        let dir = tempdir().unwrap();
        let manager = FileDeploymentManager::new(dir.path()).unwrap();
        let horizon = Horizon::new(30).unwrap();

        manager.deploy(horizon, &ModelConfig::default(), None);

        let mut broken = ModelConfig::default();
        broken.boosted_trees.learning_rate = 0.0;
        let report = manager.deploy(horizon, &broken, None);

        assert!(!report.success);
        let active = manager.get_current_config(horizon).unwrap().unwrap();
        assert_eq!(active.config, ModelConfig::default());
        assert_eq!(active.version, 1);
    }
}
