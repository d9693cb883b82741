//! Claude backend, reasoner and agent against a mocked Messages API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bizflow_agent::{ClaudeBackend, LlmAgent, LlmBackend, LlmReasoner, ModelConfig};
use bizflow_core::{Agent, AgentId, AgentInput, PlanRequest, Reasoner};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> Arc<dyn LlmBackend> {
    let mut config = ModelConfig::new("claude-test", "test-key");
    config.api_base_url = Some(server.uri());
    Arc::new(ClaudeBackend::new(config))
}

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn"
    }))
}

#[tokio::test]
async fn test_complete_sends_headers_and_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({
            "model": "claude-test",
            "system": "be brief",
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(text_reply("hi"))
        .expect(1)
        .mount(&server)
        .await;

    let text = backend_for(&server)
        .complete(Some("be brief"), "hello")
        .await
        .unwrap();
    assert_eq!(text, "hi");
}

#[tokio::test]
async fn test_api_error_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let err = backend_for(&server).complete(None, "hello").await.unwrap_err();
    assert_eq!(err.code(), "http_error");
    assert!(err.to_string().contains("529"));
}

#[tokio::test]
async fn test_reasoner_parses_model_plan() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_reply(
            "```json\n{\"sequence\": [\"coordinator\", \"invoice\", \"analysis\"], \
             \"rationale\": {\"invoice\": \"find overdue bills\"}, \
             \"confidence\": 0.9, \"complexity\": \"moderate\"}\n```",
        ))
        .mount(&server)
        .await;

    let reasoner = LlmReasoner::new(backend_for(&server));
    let proposal = reasoner
        .propose(PlanRequest {
            task_description: "Summarize overdue invoices",
            history: &[],
            feedback: None,
        })
        .await
        .unwrap();

    assert_eq!(proposal.sequence, vec!["coordinator", "invoice", "analysis"]);
    assert_eq!(proposal.confidence, 0.9);
    assert_eq!(proposal.complexity.as_deref(), Some("moderate"));
}

#[tokio::test]
async fn test_reasoner_maps_transport_error_to_planning_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let err = LlmReasoner::new(backend_for(&server))
        .propose(PlanRequest {
            task_description: "anything",
            history: &[],
            feedback: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "planning_failure");
}

#[tokio::test]
async fn test_llm_agent_stores_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(text_reply("Matched 4 of 5 invoices.\nAcme #1182 is missing a PO."))
        .mount(&server)
        .await;

    let agent = LlmAgent::new(AgentId::Invoice, backend_for(&server));
    let results = BTreeMap::new();
    let out = agent
        .invoke(AgentInput {
            workflow_id: Uuid::new_v4(),
            iteration: 1,
            task_description: "Reconcile March invoices",
            accumulated_results: &results,
            execution_history: &[],
            feedback: None,
        })
        .await
        .unwrap();

    assert_eq!(agent.id(), AgentId::Invoice);
    assert_eq!(out.summary, "Matched 4 of 5 invoices.");
    assert!(out.data["text"].as_str().unwrap().contains("Acme #1182"));
}

#[tokio::test]
async fn test_llm_agent_failure_names_agent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "type": "error",
            "error": {"type": "authentication_error"}
        })))
        .mount(&server)
        .await;

    let results = BTreeMap::new();
    let err = LlmAgent::new(AgentId::Crm, backend_for(&server))
        .invoke(AgentInput {
            workflow_id: Uuid::new_v4(),
            iteration: 1,
            task_description: "update contacts",
            accumulated_results: &results,
            execution_history: &[],
            feedback: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "agent_failure");
    assert!(err.to_string().starts_with("Agent 'crm' failed"));
}

#[test]
fn test_default_agents_offline() {
    let agents = bizflow_agent::default_agents(None);
    let ids: Vec<AgentId> = agents.iter().map(|a| a.id()).collect();
    assert_eq!(ids, AgentId::ALL.to_vec());
}
