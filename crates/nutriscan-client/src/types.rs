use nutriscan_schema::{ChatMessage, ScanOutcome, UserProfile};

/// Status value the backend uses for a successful call.
pub const STATUS_SUCCESS: &str = "success";

/// Validated result of one orchestration round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrateOutcome {
    /// The backend advanced the conversation. It is the source of truth
    /// for post-call conversation state; the caller replaces its copy
    /// wholesale rather than merging.
    Success {
        conversation: Vec<ChatMessage>,
        /// Finalized objective, when the define-objective agent extracted
        /// one. Empty strings from the wire are mapped to `None`.
        objective: Option<String>,
        updated_profile: Option<UserProfile>,
        scan: Option<ScanOutcome>,
    },
    /// The backend reported a non-success status for this turn.
    Failed { message: Option<String> },
}

/// Strip a `data:...;base64,` prefix from captured image data, leaving
/// bare base64 for transmission.
pub fn strip_data_url_prefix(data: &str) -> &str {
    if !data.starts_with("data:") {
        return data;
    }
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_data_url_prefix_removes_header() {
        assert_eq!(
            strip_data_url_prefix("data:image/jpeg;base64,AAAA"),
            "AAAA"
        );
    }

    #[test]
    fn strip_data_url_prefix_leaves_bare_base64_alone() {
        assert_eq!(strip_data_url_prefix("AAAA"), "AAAA");
    }

    #[test]
    fn strip_data_url_prefix_without_comma_is_untouched() {
        assert_eq!(strip_data_url_prefix("data:image/jpeg"), "data:image/jpeg");
    }
}
