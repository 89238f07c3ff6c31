use async_trait::async_trait;
use dealflow_transport::{ApiRequest, HttpTransport, Transport, TransportError};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::catalog::ToolSpec;

/// Default endpoint for the OpenAI-compatible completion API. Any compatible
/// gateway works through `llm.base_url`.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are a helpful CRM assistant. Parse the user's request and call \
     the appropriate tools. Prefer creating contacts or deals when the user asks; update when \
     they request changes. After successful CRM actions, call send_notification summarizing what \
     was done. Be concise and include key identifiers like emails or IDs in the summary.";

/// One call selected by the engine: an operation name plus filled arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedCall {
    pub name: String,
    pub arguments: Value,
}

/// An ordered plan for one run. Consumed exactly once by the coordinator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    pub calls: Vec<PlannedCall>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("tool selection response was malformed: {0}")]
    Malformed(String),
}

/// The narrow boundary to the natural-language engine: a request plus the
/// operation catalog in, an ordered plan out. Nothing else crosses.
#[async_trait]
pub trait ToolSelector: Send + Sync {
    async fn select(&self, request: &str, tools: &[ToolSpec]) -> Result<Plan, SelectorError>;
}

/// Tool selection via a single OpenAI-compatible chat-completions round.
///
/// The model is offered the catalog as tool definitions and the user request
/// verbatim; whatever `tool_calls` it returns become the plan, in order.
/// There is no agentic loop: one request, one plan.
pub struct OpenAiToolSelector<T = HttpTransport> {
    transport: T,
    model: String,
}

impl<T> OpenAiToolSelector<T>
where
    T: Transport,
{
    pub fn new(transport: T, model: impl Into<String>) -> Self {
        Self { transport, model: model.into() }
    }

    fn build_request(&self, request: &str, tools: &[ToolSpec]) -> Value {
        let tools = tools
            .iter()
            .map(|spec| {
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.parameters,
                    }
                })
            })
            .collect::<Vec<_>>();

        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": request },
            ],
            "tools": tools,
            "tool_choice": "auto",
        })
    }
}

#[async_trait]
impl<T> ToolSelector for OpenAiToolSelector<T>
where
    T: Transport,
{
    async fn select(&self, request: &str, tools: &[ToolSpec]) -> Result<Plan, SelectorError> {
        let body = self.build_request(request, tools);
        let response =
            self.transport.execute(ApiRequest::post("/chat/completions").with_json(body)).await?;
        let body = response.json().ok_or_else(|| {
            SelectorError::Malformed("completion response body was not JSON".to_string())
        })?;

        let plan = plan_from_response(body)?;
        debug!(
            event_name = "selector.plan_received",
            model = %self.model,
            operations = plan.calls.len(),
            "tool selection round completed"
        );
        Ok(plan)
    }
}

fn plan_from_response(body: &Value) -> Result<Plan, SelectorError> {
    let message = body["choices"]
        .get(0)
        .map(|choice| &choice["message"])
        .ok_or_else(|| SelectorError::Malformed("response contained no choices".to_string()))?;

    let mut calls = Vec::new();
    if let Some(tool_calls) = message["tool_calls"].as_array() {
        for call in tool_calls {
            let function = &call["function"];
            let name = function["name"]
                .as_str()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    SelectorError::Malformed("tool call missing function name".to_string())
                })?
                .to_string();
            // Arguments usually arrive as a JSON-encoded string; some
            // gateways send the object directly.
            let arguments = match &function["arguments"] {
                Value::String(raw) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                }
                other => other.clone(),
            };
            calls.push(PlannedCall { name, arguments });
        }
    }

    Ok(Plan { calls })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dealflow_transport::{ApiRequest, ApiResponse, ResponseBody, Transport, TransportError};
    use serde_json::json;

    use crate::catalog::operation_specs;

    use super::{plan_from_response, OpenAiToolSelector, SelectorError, ToolSelector};

    struct MockTransport {
        responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl MockTransport {
        fn scripted(
            responses: impl IntoIterator<Item = Result<ApiResponse, TransportError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().expect("request log").push(request);
            self.responses
                .lock()
                .expect("response script")
                .pop_front()
                .expect("test script ran out of responses")
        }
    }

    fn completion_with_tool_calls(tool_calls: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status: 200,
            body: ResponseBody::Json(json!({
                "choices": [{
                    "message": { "tool_calls": tool_calls },
                    "finish_reason": "tool_calls"
                }]
            })),
        }
    }

    #[tokio::test]
    async fn selection_round_offers_the_full_catalog() {
        let transport = MockTransport::scripted([Ok(completion_with_tool_calls(json!([])))]);
        let selector = OpenAiToolSelector::new(transport, "gpt-4o-mini");

        let plan = selector
            .select("create a contact for ada@example.com", &operation_specs())
            .await
            .expect("selection should succeed");
        assert!(plan.is_empty());

        let requests = selector.transport.requests.lock().expect("request log");
        assert_eq!(requests[0].path, "/chat/completions");
        let body = requests[0].body.as_ref().expect("body");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"].as_array().expect("tools").len(), 5);
        assert_eq!(body["messages"][1]["content"], "create a contact for ada@example.com");
    }

    #[test]
    fn tool_calls_become_an_ordered_plan() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [
                        {
                            "id": "call_1",
                            "function": {
                                "name": "create_contact",
                                "arguments": "{\"email\": \"ada@example.com\"}"
                            }
                        },
                        {
                            "id": "call_2",
                            "function": {
                                "name": "create_deal",
                                "arguments": { "amount": 42.5 }
                            }
                        }
                    ]
                }
            }]
        });

        let plan = plan_from_response(&body).expect("plan should parse");
        assert_eq!(plan.calls.len(), 2);
        assert_eq!(plan.calls[0].name, "create_contact");
        assert_eq!(plan.calls[0].arguments, json!({"email": "ada@example.com"}));
        assert_eq!(plan.calls[1].name, "create_deal");
        assert_eq!(plan.calls[1].arguments, json!({"amount": 42.5}));
    }

    #[test]
    fn text_only_completion_yields_an_empty_plan() {
        let body = json!({
            "choices": [{ "message": { "content": "Nothing to do." } }]
        });
        let plan = plan_from_response(&body).expect("text response is a valid empty plan");
        assert!(plan.is_empty());
    }

    #[test]
    fn missing_choices_is_malformed() {
        let error = plan_from_response(&json!({})).expect_err("no choices should fail");
        assert!(matches!(error, SelectorError::Malformed(_)));
    }

    #[test]
    fn unnamed_tool_call_is_malformed() {
        let body = json!({
            "choices": [{
                "message": { "tool_calls": [{ "function": { "arguments": "{}" } }] }
            }]
        });
        let error = plan_from_response(&body).expect_err("nameless call should fail");
        assert!(matches!(error, SelectorError::Malformed(_)));
    }
}
