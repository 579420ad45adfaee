use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ApiError;

/// Per-port facts reported by the scanner (`state`, `name`, `product`, ...),
/// always carrying a numeric `port` key once normalized.
pub type PortDetail = Map<String, Value>;

/// Normalized output of one scan: hosts in the order the scanner reported them.
pub type ScanResult = Vec<HostResult>;

/// The persisted history, newest entry first.
pub type HistoryLog = Vec<HistoryEntry>;

/// Body of `POST /scan`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub options: Option<String>,
}

impl ScanRequest {
    /// Validate the target and fill in `default_options` when options are omitted or blank.
    ///
    /// Target tokens beginning with `-` are refused so a target cannot be read as a scanner flag.
    /// Tokens are split with shell-style quoting, the same way the scanner splits them.
    pub fn resolve(self, default_options: &str) -> Result<(String, String), ApiError> {
        let target = self
            .target
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Validation("Target is required".into()))?;
        let hosts = shlex::split(&target).ok_or_else(|| {
            ApiError::Validation(format!("Target has unbalanced quoting: {target}"))
        })?;
        if hosts.iter().any(|t| t.starts_with('-')) {
            return Err(ApiError::Validation(format!(
                "Target must not contain scanner flags: {target}"
            )));
        }
        let options = self
            .options
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| default_options.to_string());
        Ok((target, options))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProtocolBlock {
    pub protocol: String,
    pub ports: Vec<PortDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HostResult {
    pub host: String,
    #[serde(default)]
    pub hostname: String,
    pub state: String,
    #[serde(default)]
    pub protocols: Vec<ProtocolBlock>,
}

/// One stored scan. Never modified after it is written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub target: String,
    pub options: String,
    pub timestamp: String,
    pub results: ScanResult,
}

/// Body of `POST /history`. Every field is optional here so missing ones can be
/// reported together instead of failing deserialization on the first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRequest {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default)]
    pub results: Option<ScanResult>,
}

/// A validated history submission, ready to be stamped with an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub target: String,
    pub options: String,
    pub results: ScanResult,
}

impl TryFrom<HistoryRequest> for NewHistoryEntry {
    type Error = ApiError;

    fn try_from(req: HistoryRequest) -> Result<Self, Self::Error> {
        match (req.target, req.options, req.results) {
            (Some(target), Some(options), Some(results)) => Ok(Self {
                target,
                options,
                results,
            }),
            (target, options, results) => {
                let missing: Vec<&str> = [
                    ("target", target.is_none()),
                    ("options", options.is_none()),
                    ("results", results.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(ApiError::Validation(format!(
                    "Missing data for history entry: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}
