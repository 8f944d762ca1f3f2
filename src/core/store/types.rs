use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// `completed` and `failed` have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Log,
    Result,
    Error,
}

impl OutputType {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputType::Log => "log",
            OutputType::Result => "result",
            OutputType::Error => "error",
        }
    }

    pub fn from_type(value: &str) -> Option<Self> {
        match value {
            "log" => Some(OutputType::Log),
            "result" => Some(OutputType::Result),
            "error" => Some(OutputType::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub agent_id: i64,
    pub input_text: String,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: i64,
    pub run_id: i64,
    pub output_type: OutputType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A run together with its outputs in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWithOutputs {
    #[serde(flatten)]
    pub run: RunRecord,
    pub outputs: Vec<OutputRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial agent update. Absent fields are left untouched; `description`
/// distinguishes "absent" (`None`) from "set to null" (`Some(None)`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub role: Option<String>,
    pub goal: Option<String>,
    pub backstory: Option<String>,
    pub is_active: Option<bool>,
}

/// Requested status change. Timestamp fields follow the same
/// absent / explicit-null split as [`AgentPatch::description`].
#[derive(Debug, Clone, Deserialize)]
pub struct RunStatusChange {
    pub status: RunStatus,
    #[serde(default, deserialize_with = "present")]
    pub started_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

/// Status and timestamps persisted for a run, decided against its stored row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStatusWrite {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunStatusChange {
    pub fn to(status: RunStatus) -> Self {
        Self {
            status,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOutput {
    pub output_type: OutputType,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Any value that reaches this deserializer was present in the payload,
/// including an explicit `null`.
fn present<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Current instant at the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width encoding so that lexical order in SQLite equals time order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.trunc_subsecs(6).to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn decode_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| decode_ts(idx, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::from_status(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::from_status("canceled"), None);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn status_change_distinguishes_absent_from_null() {
        let absent: RunStatusChange = serde_json::from_str(r#"{"status":"running"}"#).unwrap();
        assert_eq!(absent.status, RunStatus::Running);
        assert!(absent.started_at.is_none());

        let null: RunStatusChange =
            serde_json::from_str(r#"{"status":"pending","started_at":null}"#).unwrap();
        assert_eq!(null.started_at, Some(None));
        assert!(null.completed_at.is_none());
    }

    #[test]
    fn agent_patch_keeps_description_null_explicit() {
        let patch: AgentPatch = serde_json::from_str(r#"{"description":null}"#).unwrap();
        assert_eq!(patch.description, Some(None));
        let patch: AgentPatch = serde_json::from_str(r#"{"goal":"ship"}"#).unwrap();
        assert!(patch.description.is_none());
        assert_eq!(patch.goal.as_deref(), Some("ship"));
    }

    #[test]
    fn encoded_timestamps_sort_like_instants() {
        let early = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = early + chrono::Duration::microseconds(1500);
        assert!(encode_ts(&early) < encode_ts(&later));
        assert_eq!(decode_ts(0, &encode_ts(&later)).unwrap(), later);
    }

    #[test]
    fn new_agent_defaults_to_active() {
        let agent: NewAgent = serde_json::from_str(
            r#"{"name":"a","role":"r","goal":"g","backstory":"b"}"#,
        )
        .unwrap();
        assert!(agent.is_active);
        assert!(agent.description.is_none());
    }
}
