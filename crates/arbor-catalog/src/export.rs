//! Export configuration and export state of branches.
//!
//! A branch can be configured to be exported to an external location. The
//! export state records which commit was last exported and how that went;
//! exporters move it forward through [`InMemoryCatalog::export_state_set`].

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{field, info, info_span};

use crate::catalog::InMemoryCatalog;
use crate::error::{CatalogError, CatalogResult};

/// Where and how a branch is exported.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    pub path: String,
    pub status_path: String,
    /// Regular expressions matching the last key written under a prefix;
    /// exporters use them to mark a prefix complete.
    #[serde(default)]
    pub last_keys_in_prefix_regexp: Vec<String>,
    #[serde(default)]
    pub is_continuous: bool,
}

impl ExportConfiguration {
    /// Check that every `last_keys_in_prefix_regexp` compiles.
    pub fn validate(&self) -> CatalogResult<()> {
        for (index, pattern) in self.last_keys_in_prefix_regexp.iter().enumerate() {
            Regex::new(pattern).map_err(|source| CatalogError::InvalidExportRegexp {
                index,
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// An export configuration together with the branch it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfigurationForBranch {
    pub repository: String,
    pub branch: String,
    #[serde(flatten)]
    pub configuration: ExportConfiguration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportStatus {
    InProgress,
    #[serde(rename = "exported-successfully")]
    Success,
    #[serde(rename = "export-failed")]
    Failed,
    #[serde(rename = "export-repaired")]
    Repaired,
    /// No export has been recorded.
    #[default]
    Unknown,
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "in-progress",
            Self::Success => "exported-successfully",
            Self::Failed => "export-failed",
            Self::Repaired => "export-repaired",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportState {
    /// The ref (commit) the export last started or finished.
    pub current_ref: String,
    pub state: ExportStatus,
    pub error_message: Option<String>,
}

/// The new state an export state callback asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportTransition {
    pub new_ref: String,
    pub new_status: ExportStatus,
    pub message: Option<String>,
}

impl ExportTransition {
    pub fn new(new_ref: impl Into<String>, new_status: ExportStatus) -> Self {
        Self {
            new_ref: new_ref.into(),
            new_status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl InMemoryCatalog {
    /// Set the export configuration of a branch, replacing any previous one.
    ///
    /// Fails before touching the catalog if any regexp does not compile.
    pub fn put_export_configuration(
        &self,
        repository: &str,
        branch: &str,
        configuration: ExportConfiguration,
    ) -> CatalogResult<()> {
        configuration.validate()?;
        let mut state = self.write()?;
        let id = state.branch_id(repository, branch)?;
        state.exports.insert(id, configuration);
        info!(repository, branch, "stored export configuration");
        Ok(())
    }

    pub fn get_export_configuration(
        &self,
        repository: &str,
        branch: &str,
    ) -> CatalogResult<ExportConfiguration> {
        let state = self.read()?;
        let id = state.branch_id(repository, branch)?;
        state
            .exports
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::ExportConfigurationNotFound {
                repository: repository.to_string(),
                branch: branch.to_string(),
            })
    }

    /// Every export configuration in the catalog, ordered by repository
    /// and branch.
    pub fn export_configurations(&self) -> CatalogResult<Vec<ExportConfigurationForBranch>> {
        let state = self.read()?;
        let mut all = state
            .exports
            .iter()
            .map(|(id, configuration)| {
                let record = state.branch(*id)?;
                Ok(ExportConfigurationForBranch {
                    repository: record.repository.clone(),
                    branch: record.name.clone(),
                    configuration: configuration.clone(),
                })
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        all.sort_by(|a, b| (&a.repository, &a.branch).cmp(&(&b.repository, &b.branch)));
        Ok(all)
    }

    pub fn get_export_state(&self, repository: &str, branch: &str) -> CatalogResult<ExportState> {
        let state = self.read()?;
        let id = state.branch_id(repository, branch)?;
        state
            .export_states
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogError::ExportStateNotFound {
                repository: repository.to_string(),
                branch: branch.to_string(),
            })
    }

    /// Read-modify-write of a branch's export state.
    ///
    /// `callback` receives the current ref and status (empty and
    /// [`ExportStatus::Unknown`] when no state exists yet) and returns the
    /// transition to apply. The catalog stays locked for the whole call, so
    /// concurrent exporters see each other's transitions in order. An error
    /// from the callback leaves the state unchanged.
    pub fn export_state_set<F>(&self, repository: &str, branch: &str, callback: F) -> CatalogResult<()>
    where
        F: FnOnce(&str, ExportStatus) -> CatalogResult<ExportTransition>,
    {
        let mut state = self.write()?;
        let id = state.branch_id(repository, branch)?;
        let existing = state.export_states.get(&id).cloned();
        let old = existing.clone().unwrap_or_default();

        let span = info_span!(
            "export_state_set",
            repository,
            branch,
            branch_id = id.0,
            old_ref = %old.current_ref,
            old_status = %old.state,
            new_ref = field::Empty,
            new_status = field::Empty,
        );
        let _guard = span.enter();

        let transition = callback(&old.current_ref, old.state)?;
        span.record("new_ref", transition.new_ref.as_str());
        span.record("new_status", field::display(transition.new_status));

        if existing.is_some() {
            info!("update export state");
        } else {
            info!("insert export state");
        }
        state.export_states.insert(
            id,
            ExportState {
                current_ref: transition.new_ref,
                state: transition.new_status,
                error_message: transition.message,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog.create_repository("repo", "s3://ns", "main").unwrap();
        catalog.create_branch("repo", "dev", "main").unwrap();
        catalog
    }

    #[test]
    fn status_serializes_as_displayed() {
        for status in [
            ExportStatus::InProgress,
            ExportStatus::Success,
            ExportStatus::Failed,
            ExportStatus::Repaired,
            ExportStatus::Unknown,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(serde_json::from_str::<ExportStatus>(&json).unwrap(), status);
        }
    }

    fn config(regexps: &[&str]) -> ExportConfiguration {
        ExportConfiguration {
            path: "s3://export/main".into(),
            status_path: "s3://export/status".into(),
            last_keys_in_prefix_regexp: regexps.iter().map(|r| r.to_string()).collect(),
            is_continuous: true,
        }
    }

    #[test]
    fn put_and_get_configuration() {
        let catalog = catalog();
        assert!(matches!(
            catalog.get_export_configuration("repo", "main"),
            Err(CatalogError::ExportConfigurationNotFound { .. })
        ));
        let conf = config(&[r".*/_SUCCESS$", r"^done\d+"]);
        catalog.put_export_configuration("repo", "main", conf.clone()).unwrap();
        assert_eq!(catalog.get_export_configuration("repo", "main").unwrap(), conf);

        let replaced = ExportConfiguration {
            is_continuous: false,
            ..conf
        };
        catalog.put_export_configuration("repo", "main", replaced.clone()).unwrap();
        assert_eq!(catalog.get_export_configuration("repo", "main").unwrap(), replaced);
    }

    #[test]
    fn invalid_regexp_names_its_position() {
        let catalog = catalog();
        let err = catalog
            .put_export_configuration("repo", "main", config(&["ok", "(unclosed"]))
            .unwrap_err();
        match err {
            CatalogError::InvalidExportRegexp { index, pattern, .. } => {
                assert_eq!(index, 1);
                assert_eq!(pattern, "(unclosed");
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(catalog.export_configurations().unwrap().is_empty());
    }

    #[test]
    fn lists_configurations_across_branches() {
        let catalog = catalog();
        catalog.put_export_configuration("repo", "main", config(&[])).unwrap();
        catalog.put_export_configuration("repo", "dev", config(&[])).unwrap();
        let all = catalog.export_configurations().unwrap();
        let branches: Vec<&str> = all.iter().map(|c| c.branch.as_str()).collect();
        assert_eq!(branches, vec!["dev", "main"]);
    }

    #[test]
    fn state_insert_then_update() {
        let catalog = catalog();
        assert!(matches!(
            catalog.get_export_state("repo", "main"),
            Err(CatalogError::ExportStateNotFound { .. })
        ));

        catalog
            .export_state_set("repo", "main", |old_ref, old_status| {
                assert_eq!(old_ref, "");
                assert_eq!(old_status, ExportStatus::Unknown);
                Ok(ExportTransition::new("c1", ExportStatus::InProgress))
            })
            .unwrap();
        catalog
            .export_state_set("repo", "main", |old_ref, old_status| {
                assert_eq!(old_ref, "c1");
                assert_eq!(old_status, ExportStatus::InProgress);
                Ok(ExportTransition::new("c1", ExportStatus::Failed).with_message("disk full"))
            })
            .unwrap();

        let state = catalog.get_export_state("repo", "main").unwrap();
        assert_eq!(state.current_ref, "c1");
        assert_eq!(state.state, ExportStatus::Failed);
        assert_eq!(state.error_message.as_deref(), Some("disk full"));
    }

    #[test]
    fn rejected_transition_keeps_state() {
        let catalog = catalog();
        catalog
            .export_state_set("repo", "main", |_, _| {
                Ok(ExportTransition::new("c1", ExportStatus::InProgress))
            })
            .unwrap();
        let err = catalog
            .export_state_set("repo", "main", |_, status| {
                Err(CatalogError::ExportRejected(format!("export already {status}")))
            })
            .unwrap_err();
        assert!(matches!(err, CatalogError::ExportRejected(_)));
        assert_eq!(
            catalog.get_export_state("repo", "main").unwrap().state,
            ExportStatus::InProgress
        );
    }
}
