use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a [`Batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an [`Execution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// DataType
// ---------------------------------------------------------------------------

/// Role of a file attached to a catalogued feature.
///
/// Process definitions declare which of these they need as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Rawdata,
    Thumbnail,
    QuicklookSd,
    QuicklookMd,
    QuicklookHd,
    Document,
    Description,
    Aip,
    Other,
}

impl DataType {
    /// Upper-case name used in configuration strings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rawdata => "RAWDATA",
            Self::Thumbnail => "THUMBNAIL",
            Self::QuicklookSd => "QUICKLOOK_SD",
            Self::QuicklookMd => "QUICKLOOK_MD",
            Self::QuicklookHd => "QUICKLOOK_HD",
            Self::Document => "DOCUMENT",
            Self::Description => "DESCRIPTION",
            Self::Aip => "AIP",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`DataType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data type: {0}")]
pub struct DataTypeParseError(pub String);

impl FromStr for DataType {
    type Err = DataTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RAWDATA" => Ok(Self::Rawdata),
            "THUMBNAIL" => Ok(Self::Thumbnail),
            "QUICKLOOK_SD" => Ok(Self::QuicklookSd),
            "QUICKLOOK_MD" => Ok(Self::QuicklookMd),
            "QUICKLOOK_HD" => Ok(Self::QuicklookHd),
            "DOCUMENT" => Ok(Self::Document),
            "DESCRIPTION" => Ok(Self::Description),
            "AIP" => Ok(Self::Aip),
            "OTHER" => Ok(Self::Other),
            other => Err(DataTypeParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution parameters
// ---------------------------------------------------------------------------

/// Value type accepted by an execution parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionParameterType {
    String,
    Integer,
    Float,
    Boolean,
}

/// Declares one parameter a process accepts from the submitting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParameterDescriptor {
    pub name: String,
    pub param_type: ExecutionParameterType,
    pub description: String,
    /// When `false`, a batch without a value for this parameter is rejected.
    pub optional: bool,
}

/// A user-supplied value for an execution parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParameterValue {
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Size statistics for the files a batch takes from one dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatsByDataset {
    pub files_count: u64,
    pub total_bytes: u64,
}

/// One accepted unit of submitted work against a named process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub correlation_id: String,
    /// Business id of the process this batch runs.
    pub process_business_id: Uuid,
    pub process_name: String,
    pub tenant: String,
    pub user: String,
    pub user_role: String,
    pub parameters: Vec<ExecutionParameterValue>,
    /// Keyed by dataset identifier.
    pub files_stats_by_dataset: BTreeMap<String, FileStatsByDataset>,
    pub persisted: bool,
}

impl Batch {
    /// Dataset identifiers the batch takes input files from.
    #[must_use]
    pub fn datasets(&self) -> Vec<String> {
        self.files_stats_by_dataset.keys().cloned().collect()
    }

    /// Total input size across all datasets.
    #[must_use]
    pub fn total_input_bytes(&self) -> u64 {
        self.files_stats_by_dataset
            .values()
            .fold(0_u64, |acc, stats| acc.saturating_add(stats.total_bytes))
    }

    /// Looks up a user-supplied parameter value by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Returns a copy flagged as persisted.
    #[must_use]
    pub fn into_persisted(mut self) -> Self {
        self.persisted = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One input file handed to an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Name of the parameter this file is bound to.
    pub parameter_name: String,
    pub url: String,
    pub bytes: u64,
    pub checksum: Option<String>,
    /// Correlates the file with the caller's own input reference.
    pub input_correlation_id: String,
    pub metadata: BTreeMap<String, String>,
}

/// What a caller asks for when submitting a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Caller-assigned id; a random one is generated when `None`.
    pub execution_id: Option<ExecutionId>,
    pub correlation_id: Option<String>,
    pub input_files: Vec<InputFile>,
}

/// One attempt to run a [`Batch`].
///
/// Identity fields never change after creation; progress lives entirely in
/// the execution's step sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub batch_id: BatchId,
    pub correlation_id: String,
    pub batch_correlation_id: String,
    pub tenant: String,
    pub user: String,
    pub process_business_id: Uuid,
    pub input_files: Vec<InputFile>,
    /// Expected running duration, used as the execution timeout.
    pub timeout: Duration,
    pub created_at_ms: u64,
    pub persisted: bool,
}

impl Execution {
    /// Time after which the execution is overdue if it has not finished.
    #[must_use]
    pub fn deadline_ms(&self) -> u64 {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        self.created_at_ms.saturating_add(timeout_ms)
    }

    /// Returns a copy flagged as persisted.
    #[must_use]
    pub fn into_persisted(mut self) -> Self {
        self.persisted = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_with_stats(stats: &[(&str, u64)]) -> Batch {
        Batch {
            id: BatchId::random(),
            correlation_id: "corr".to_string(),
            process_business_id: Uuid::new_v4(),
            process_name: "proc".to_string(),
            tenant: "project1".to_string(),
            user: "user@example.com".to_string(),
            user_role: "REGISTERED_USER".to_string(),
            parameters: vec![ExecutionParameterValue {
                name: "level".to_string(),
                value: "2".to_string(),
            }],
            files_stats_by_dataset: stats
                .iter()
                .map(|(ds, bytes)| {
                    (
                        (*ds).to_string(),
                        FileStatsByDataset {
                            files_count: 1,
                            total_bytes: *bytes,
                        },
                    )
                })
                .collect(),
            persisted: false,
        }
    }

    #[test]
    fn data_type_parses_case_insensitively() {
        assert_eq!("rawdata".parse::<DataType>(), Ok(DataType::Rawdata));
        assert_eq!(" QUICKLOOK_HD ".parse::<DataType>(), Ok(DataType::QuicklookHd));
        assert_eq!(
            "SOUND".parse::<DataType>(),
            Err(DataTypeParseError("SOUND".to_string()))
        );
    }

    #[test]
    fn data_type_serializes_upper_snake() {
        let json = serde_json::to_string(&DataType::QuicklookSd).unwrap();
        assert_eq!(json, "\"QUICKLOOK_SD\"");
    }

    #[test]
    fn batch_totals_and_datasets() {
        let batch = batch_with_stats(&[("D2", 20), ("D1", 10)]);
        assert_eq!(batch.total_input_bytes(), 30);
        assert_eq!(batch.datasets(), vec!["D1".to_string(), "D2".to_string()]);
        assert_eq!(batch.parameter("level"), Some("2"));
        assert_eq!(batch.parameter("missing"), None);
    }

    #[test]
    fn execution_deadline_adds_timeout() {
        let exec = Execution {
            id: ExecutionId::random(),
            batch_id: BatchId::random(),
            correlation_id: "c".to_string(),
            batch_correlation_id: "b".to_string(),
            tenant: "t".to_string(),
            user: "u".to_string(),
            process_business_id: Uuid::new_v4(),
            input_files: Vec::new(),
            timeout: Duration::from_secs(2),
            created_at_ms: 1_000,
            persisted: false,
        };
        assert_eq!(exec.deadline_ms(), 3_000);
        assert!(exec.into_persisted().persisted);
    }

    #[test]
    fn huge_timeout_saturates_deadline() {
        let timeout = "99999999999999d"
            .parse::<crate::DurationForecast>()
            .unwrap()
            .expected_running_duration(0);
        let exec = Execution {
            id: ExecutionId::random(),
            batch_id: BatchId::random(),
            correlation_id: "c".to_string(),
            batch_correlation_id: "b".to_string(),
            tenant: "t".to_string(),
            user: "u".to_string(),
            process_business_id: Uuid::new_v4(),
            input_files: Vec::new(),
            timeout,
            created_at_ms: 1_000,
            persisted: false,
        };
        assert_eq!(exec.deadline_ms(), u64::MAX);
    }
}
