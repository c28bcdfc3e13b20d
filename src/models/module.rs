use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::backup::BackupType;

/// A named subset of the application's data domain, used to scope selective
/// backup and restore. Closed set; the tag strings are part of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataModule {
    PatientRecords,
    PrenatalMonitoring,
    ChildRecords,
    ImmunizationRecords,
    VaccineManagement,
}

impl DataModule {
    /// All recognized modules, in canonical order
    pub const ALL: [DataModule; 5] = [
        DataModule::PatientRecords,
        DataModule::PrenatalMonitoring,
        DataModule::ChildRecords,
        DataModule::ImmunizationRecords,
        DataModule::VaccineManagement,
    ];

    /// The API tag for this module
    pub fn tag(&self) -> &'static str {
        match self {
            DataModule::PatientRecords => "patient_records",
            DataModule::PrenatalMonitoring => "prenatal_monitoring",
            DataModule::ChildRecords => "child_records",
            DataModule::ImmunizationRecords => "immunization_records",
            DataModule::VaccineManagement => "vaccine_management",
        }
    }

    /// Human-readable name shown in user-facing messages
    pub fn display_name(&self) -> &'static str {
        match self {
            DataModule::PatientRecords => "Patient Records",
            DataModule::PrenatalMonitoring => "Prenatal Monitoring",
            DataModule::ChildRecords => "Child Records",
            DataModule::ImmunizationRecords => "Immunization Records",
            DataModule::VaccineManagement => "Vaccine Management",
        }
    }

    /// Database tables owned by this module.
    /// Single source of truth consulted by both the dump producer and the
    /// selective-restore filter.
    pub fn tables(&self) -> &'static [&'static str] {
        match self {
            DataModule::PatientRecords => &["patients"],
            DataModule::PrenatalMonitoring => &["prenatal_visits"],
            DataModule::ChildRecords => &["children"],
            DataModule::ImmunizationRecords => &["immunizations"],
            DataModule::VaccineManagement => &["vaccines", "vaccine_stocks"],
        }
    }

    /// Parse an API tag into a module
    pub fn parse(tag: &str) -> Result<DataModule> {
        DataModule::ALL
            .iter()
            .copied()
            .find(|m| m.tag() == tag)
            .ok_or_else(|| AppError::Validation(format!("Unknown module: {}", tag)))
    }

    /// Parse a comma-joined tag list (the storage representation).
    /// Duplicates collapse; order is normalized to canonical.
    pub fn parse_list(joined: &str) -> Result<Vec<DataModule>> {
        let mut modules: Vec<DataModule> = Vec::new();
        for tag in joined.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let module = DataModule::parse(tag)?;
            if !modules.contains(&module) {
                modules.push(module);
            }
        }
        modules.sort();
        Ok(modules)
    }

    /// Join modules into the comma-separated storage representation
    pub fn join(modules: &[DataModule]) -> String {
        let mut sorted: Vec<DataModule> = modules.to_vec();
        sorted.sort();
        sorted.dedup();
        sorted
            .iter()
            .map(|m| m.tag())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// All tables covered by the given modules
    pub fn tables_for(modules: &[DataModule]) -> Vec<&'static str> {
        let mut tables: Vec<&'static str> = modules.iter().flat_map(|m| m.tables()).copied().collect();
        tables.sort();
        tables.dedup();
        tables
    }

    /// Derive the backup type: `full` iff the selection covers every module
    pub fn backup_type_for(modules: &[DataModule]) -> BackupType {
        let mut distinct: Vec<DataModule> = modules.to_vec();
        distinct.sort();
        distinct.dedup();
        if distinct.len() == DataModule::ALL.len() {
            BackupType::Full
        } else {
            BackupType::Selective
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tags() {
        for module in DataModule::ALL {
            assert_eq!(DataModule::parse(module.tag()).unwrap(), module);
        }
    }

    #[test]
    fn test_parse_unknown_tag() {
        assert!(DataModule::parse("billing_records").is_err());
    }

    #[test]
    fn test_join_parse_roundtrip() {
        let modules = vec![DataModule::VaccineManagement, DataModule::ChildRecords];
        let joined = DataModule::join(&modules);
        assert_eq!(joined, "child_records,vaccine_management");
        let parsed = DataModule::parse_list(&joined).unwrap();
        assert_eq!(
            parsed,
            vec![DataModule::ChildRecords, DataModule::VaccineManagement]
        );
    }

    #[test]
    fn test_backup_type_full_iff_all_modules() {
        assert_eq!(
            DataModule::backup_type_for(&DataModule::ALL),
            BackupType::Full
        );
        // Duplicates of the full set still count as full
        let mut with_dup = DataModule::ALL.to_vec();
        with_dup.push(DataModule::PatientRecords);
        assert_eq!(DataModule::backup_type_for(&with_dup), BackupType::Full);

        // Every strict subset is selective
        for module in DataModule::ALL {
            let subset: Vec<DataModule> =
                DataModule::ALL.iter().copied().filter(|m| *m != module).collect();
            assert_eq!(
                DataModule::backup_type_for(&subset),
                BackupType::Selective
            );
        }
        assert_eq!(
            DataModule::backup_type_for(&[DataModule::ChildRecords]),
            BackupType::Selective
        );
    }

    #[test]
    fn test_tables_for_dedups_and_sorts() {
        let tables = DataModule::tables_for(&[
            DataModule::VaccineManagement,
            DataModule::VaccineManagement,
            DataModule::PatientRecords,
        ]);
        assert_eq!(tables, vec!["patients", "vaccine_stocks", "vaccines"]);
    }
}
