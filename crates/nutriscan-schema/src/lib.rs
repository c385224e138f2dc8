use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a single conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of the conversation log.
///
/// `System` entries are persisted and sent to the backend as flow markers
/// but are never rendered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Active conversational flow. Exactly one mode is active at a time; a
/// fresh session starts in `General` and only flow starts switch it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    General,
    DefineObjective,
    CollectMetrics,
    ScanFood,
}

impl SessionMode {
    /// Wire agent identifier for the orchestration endpoint. `General`
    /// sends no agent type so the server infers intent itself.
    pub fn agent_type(self) -> Option<&'static str> {
        match self {
            Self::General => None,
            Self::DefineObjective => Some("defineObjective"),
            Self::CollectMetrics => Some("collectHealthMetrics"),
            Self::ScanFood => Some("scanFood"),
        }
    }
}

/// One tracked health metric plus the objectives that justify tracking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub value: String,
    pub objective_ids: Vec<String>,
}

impl MetricRecord {
    pub fn new(value: impl Into<String>, objective_ids: Vec<String>) -> Self {
        Self {
            value: value.into(),
            objective_ids,
        }
    }
}

/// Mapping from metric name to its record.
///
/// Invariant: every record's `objective_ids` is non-empty. A record left
/// without any associated objective is removed, never kept dangling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(pub BTreeMap<String, MetricRecord>);

impl UserProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, metric: &str) -> Option<&MetricRecord> {
        self.0.get(metric)
    }

    pub fn insert(&mut self, metric: impl Into<String>, record: MetricRecord) {
        self.0.insert(metric.into(), record);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricRecord)> {
        self.0.iter()
    }

    /// Drop `objective` from every record, deleting records whose
    /// objective set becomes empty.
    pub fn remove_objective(&mut self, objective: &str) {
        self.0.retain(|_, record| {
            record.objective_ids.retain(|id| id != objective);
            !record.objective_ids.is_empty()
        });
    }
}

/// Food-scan verdict returned by the orchestration endpoint.
///
/// `food_item` is occasionally absent in backend responses; it defaults to
/// empty rather than failing the whole turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    #[serde(default)]
    pub food_item: String,
    pub is_allowed: bool,
    pub reason: String,
}

/// One entry of the bounded scan history (newest first, capped at 10).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub food_item: String,
    pub is_allowed: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl ScanRecord {
    pub fn from_outcome(outcome: ScanOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            food_item: outcome.food_item,
            is_allowed: outcome.is_allowed,
            reason: outcome.reason,
            timestamp,
        }
    }
}

/// Verdict of one label-analysis section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityStatus {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub status: CompatibilityStatus,
    pub details: Vec<String>,
}

/// Structured report for an analyzed ingredient label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelAnalysis {
    pub identified_ingredients: Vec<String>,
    pub health_benefits: Vec<String>,
    pub health_risks: Vec<String>,
    pub diet_compatibility: CompatibilityReport,
    pub health_impact: CompatibilityReport,
}

/// Declared health profile submitted alongside a label photo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPreferences {
    #[serde(default)]
    pub diet_type: String,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub health_conditions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"role": "assistant", "content": "hi"})
        );
    }

    #[test]
    fn chat_message_roundtrip() {
        let raw = serde_json::json!({"role": "system", "content": "Starting objective definition flow"});
        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.role, ChatRole::System);
        assert_eq!(msg.content, "Starting objective definition flow");
    }

    #[test]
    fn session_mode_defaults_to_general() {
        assert_eq!(SessionMode::default(), SessionMode::General);
    }

    #[test]
    fn session_mode_agent_type_mapping() {
        assert_eq!(SessionMode::General.agent_type(), None);
        assert_eq!(
            SessionMode::DefineObjective.agent_type(),
            Some("defineObjective")
        );
        assert_eq!(
            SessionMode::CollectMetrics.agent_type(),
            Some("collectHealthMetrics")
        );
        assert_eq!(SessionMode::ScanFood.agent_type(), Some("scanFood"));
    }

    #[test]
    fn metric_record_uses_camel_case_wire_names() {
        let record = MetricRecord::new("82kg", vec!["Lose 10 lbs".into()]);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"value": "82kg", "objectiveIds": ["Lose 10 lbs"]})
        );
    }

    #[test]
    fn user_profile_serializes_as_plain_map() {
        let mut profile = UserProfile::new();
        profile.insert("weight", MetricRecord::new("unknown", vec!["obj".into()]));
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"weight": {"value": "unknown", "objectiveIds": ["obj"]}})
        );
    }

    #[test]
    fn remove_objective_deletes_orphaned_metrics() {
        let mut profile = UserProfile::new();
        profile.insert("weight", MetricRecord::new("", vec!["a".into()]));
        profile.insert(
            "bloodSugar",
            MetricRecord::new("", vec!["a".into(), "b".into()]),
        );

        profile.remove_objective("a");

        assert!(profile.get("weight").is_none());
        let kept = profile.get("bloodSugar").expect("metric retained");
        assert_eq!(kept.objective_ids, vec!["b".to_string()]);
    }

    #[test]
    fn remove_objective_on_unrelated_profile_is_noop() {
        let mut profile = UserProfile::new();
        profile.insert("weight", MetricRecord::new("", vec!["a".into()]));

        profile.remove_objective("missing");

        assert_eq!(profile.len(), 1);
    }

    #[test]
    fn scan_outcome_tolerates_missing_food_item() {
        let raw = serde_json::json!({"isAllowed": false, "reason": "too much sugar"});
        let outcome: ScanOutcome = serde_json::from_value(raw).unwrap();
        assert_eq!(outcome.food_item, "");
        assert!(!outcome.is_allowed);
    }

    #[test]
    fn scan_record_timestamp_is_rfc3339() {
        let record = ScanRecord::from_outcome(
            ScanOutcome {
                food_item: "Apple".into(),
                is_allowed: true,
                reason: "fits your objective".into(),
            },
            Utc::now(),
        );
        let value = serde_json::to_value(&record).unwrap();
        let raw = value["timestamp"].as_str().expect("string timestamp");
        assert!(DateTime::parse_from_rfc3339(raw).is_ok());
        assert_eq!(value["foodItem"], "Apple");
    }

    #[test]
    fn compatibility_status_rejects_unknown_values() {
        let parsed: Result<CompatibilityStatus, _> = serde_json::from_str("\"neutral\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn label_analysis_parses_backend_shape() {
        let raw = serde_json::json!({
            "identified_ingredients": ["sugar", "wheat flour"],
            "health_benefits": ["source of energy"],
            "health_risks": ["high sugar content"],
            "diet_compatibility": {"status": "negative", "details": ["contains gluten"]},
            "health_impact": {"status": "positive", "details": ["low sodium"]}
        });
        let analysis: LabelAnalysis = serde_json::from_value(raw).unwrap();
        assert_eq!(analysis.identified_ingredients.len(), 2);
        assert_eq!(
            analysis.diet_compatibility.status,
            CompatibilityStatus::Negative
        );
        assert_eq!(analysis.health_impact.status, CompatibilityStatus::Positive);
    }

    #[test]
    fn analysis_preferences_wire_names() {
        let prefs = AnalysisPreferences {
            diet_type: "vegan".into(),
            allergies: vec!["nuts".into()],
            health_conditions: vec!["hypertension".into()],
        };
        let value = serde_json::to_value(&prefs).unwrap();
        assert_eq!(value["dietType"], "vegan");
        assert_eq!(value["healthConditions"][0], "hypertension");
    }
}
