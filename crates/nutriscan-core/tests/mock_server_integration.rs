use std::sync::Arc;

use nutriscan_client::{HttpOrchestratorClient, OrchestratorBackend};
use nutriscan_core::ChatSession;
use nutriscan_schema::{AnalysisPreferences, ChatRole, SessionMode};
use nutriscan_store::DataStore;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn make_session(server: &MockServer) -> (ChatSession, tempfile::TempDir) {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = DataStore::new(tmp.path());
    let backend = Arc::new(HttpOrchestratorClient::new(server.uri()));
    let session = ChatSession::load(store, backend).await.unwrap();
    (session, tmp)
}

fn success_body(conversation: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "updatedConversation": conversation
    })
}

#[tokio::test]
async fn mock_server_e2e_objective_flow() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orchestrate"))
        .and(body_partial_json(serde_json::json!({
            "agentType": "defineObjective",
            "objective": ""
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "updatedConversation": [
                {"role": "user", "content": "I want to lose 10 lbs"},
                {"role": "assistant", "content": "Based on our conversation, I've refined your health objective: Lose 10 lbs"}
            ],
            "objective": "Lose 10 lbs"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/define-health-profile"))
        .and(body_partial_json(
            serde_json::json!({"objective": "Lose 10 lbs"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "updatedUserProfile": {
                "weight": {"value": "unknown", "objectiveIds": ["Lose 10 lbs"]}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (mut session, _tmp) = make_session(&server).await;
    session.start_objective_definition().await.unwrap();

    let report = session
        .submit_message("I want to lose 10 lbs")
        .await
        .unwrap();

    assert_eq!(report.objective_added.as_deref(), Some("Lose 10 lbs"));
    assert_eq!(session.active_objective(), "Lose 10 lbs");
    assert_eq!(session.mode(), SessionMode::CollectMetrics);
    let weight = session.profile().get("weight").expect("metric added");
    assert_eq!(weight.objective_ids, vec!["Lose 10 lbs".to_string()]);
}

#[tokio::test]
async fn mock_server_e2e_scan_flow_strips_data_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orchestrate"))
        .and(body_partial_json(serde_json::json!({
            "agentType": "scanFood",
            "imageData": "QUJDRA=="
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "updatedConversation": [
                {"role": "assistant", "content": "Apples are a great choice."}
            ],
            "result": {"foodItem": "Apple", "isAllowed": true, "reason": "low calorie"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (mut session, _tmp) = make_session(&server).await;
    let report = session
        .scan_food("data:image/jpeg;base64,QUJDRA==")
        .await
        .unwrap();

    let scan = report.scan.expect("scan outcome");
    assert_eq!(scan.food_item, "Apple");
    assert!(scan.is_allowed);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history()[0].food_item, "Apple");
}

#[tokio::test]
async fn mock_server_general_mode_sends_null_agent_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orchestrate"))
        .and(body_partial_json(serde_json::json!({"agentType": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body(
            serde_json::json!([
                {"role": "user", "content": "hello"},
                {"role": "assistant", "content": "Hi! How can I help?"}
            ]),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (mut session, _tmp) = make_session(&server).await;
    session.submit_message("hello").await.unwrap();

    let last = session.conversation().last().unwrap();
    assert_eq!(last.role, ChatRole::Assistant);
    assert_eq!(last.content, "Hi! How can I help?");
}

#[tokio::test]
async fn mock_server_error_status_surfaces_processing_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orchestrate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "error",
            "message": "AI21 client not available"
        })))
        .mount(&server)
        .await;

    let (mut session, _tmp) = make_session(&server).await;
    session.submit_message("hello").await.unwrap();

    let last = session.conversation().last().unwrap();
    assert!(last.content.contains("error processing your message"));
    assert_eq!(session.conversation().len(), 2);
}

#[tokio::test]
async fn mock_server_http_500_surfaces_connection_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orchestrate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "status": "error",
            "message": "internal failure"
        })))
        .mount(&server)
        .await;

    let (mut session, _tmp) = make_session(&server).await;
    session.submit_message("hello").await.unwrap();

    let last = session.conversation().last().unwrap();
    assert!(last.content.contains("error connecting to the server"));
}

#[tokio::test]
async fn mock_server_profile_subcall_failure_is_silent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orchestrate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "updatedConversation": [],
            "objective": "Lose 10 lbs"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/define-health-profile"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (mut session, _tmp) = make_session(&server).await;
    session.start_objective_definition().await.unwrap();
    let report = session.submit_message("lose 10 lbs").await.unwrap();

    // objective still lands even though profile enrichment failed
    assert_eq!(report.objective_added.as_deref(), Some("Lose 10 lbs"));
    assert_eq!(session.mode(), SessionMode::CollectMetrics);
    assert!(session.profile().is_empty());
}

#[tokio::test]
async fn mock_server_label_analysis_roundtrip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_partial_json(serde_json::json!({
            "image": "QUJDRA==",
            "dietType": "vegan"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "analysis": {
                "identified_ingredients": ["oats", "almonds"],
                "health_benefits": ["high fiber"],
                "health_risks": ["contains tree nuts"],
                "diet_compatibility": {"status": "positive", "details": ["plant based"]},
                "health_impact": {"status": "negative", "details": ["allergen present"]}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpOrchestratorClient::new(server.uri());
    let preferences = AnalysisPreferences {
        diet_type: "vegan".into(),
        allergies: vec!["nuts".into()],
        health_conditions: vec![],
    };
    let analysis = client
        .analyze_label("data:image/jpeg;base64,QUJDRA==", &preferences)
        .await
        .unwrap();

    assert_eq!(analysis.identified_ingredients, vec!["oats", "almonds"]);
    assert_eq!(analysis.health_risks, vec!["contains tree nuts"]);
}

#[tokio::test]
async fn mock_server_label_analysis_failure_carries_backend_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "success": false,
            "error": "Invalid analysis format"
        })))
        .mount(&server)
        .await;

    let client = HttpOrchestratorClient::new(server.uri());
    let err = client
        .analyze_label("QUJDRA==", &AnalysisPreferences::default())
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Invalid analysis format"));
}

#[tokio::test]
async fn mock_server_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "healthy"})),
        )
        .mount(&server)
        .await;

    let client = HttpOrchestratorClient::new(server.uri());
    assert!(client.health().await.is_ok());
}
