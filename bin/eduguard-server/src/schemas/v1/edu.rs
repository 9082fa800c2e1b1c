use eduguard_core::{ChatMessage, ReplyRequest, ReplyResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Callable request envelope: `{"data": {...}}`.
///
/// `data` is kept as raw JSON so a payload of the wrong shape still reaches
/// the pipeline (as empty fields) instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CallableRequest {
    #[serde(default)]
    #[schema(value_type = ReplyRequest)]
    pub data: Value,
}

impl CallableRequest {
    pub fn into_reply_request(self) -> ReplyRequest {
        ReplyRequest::from_payload(self.data)
    }
}

/// Callable response envelope: `{"result": {...}}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CallableResponse {
    pub result: ReplyResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub role: Option<String>,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
    pub created_at: String,
}

impl From<ChatMessage> for MessageResponse {
    fn from(m: ChatMessage) -> Self {
        MessageResponse {
            id: m.id,
            role: m.role,
            content: m.content,
            model: m.model,
            tokens: m.tokens,
            created_at: m.created_at.to_rfc3339(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_unwraps_payload() {
        let req: CallableRequest =
            serde_json::from_value(json!({ "data": { "chatId": "c1", "message": "hi" } })).unwrap();
        let inner = req.into_reply_request();
        assert_eq!(inner.chat_id, "c1");
        assert_eq!(inner.message, "hi");
    }

    #[test]
    fn malformed_payload_becomes_empty_request() {
        for body in [
            json!({}),
            json!({ "data": null }),
            json!({ "data": "text" }),
            json!({ "data": ["c1", "who is messi?"] }),
        ] {
            let req: CallableRequest = serde_json::from_value(body).unwrap();
            let inner = req.into_reply_request();
            assert!(inner.chat_id.is_empty() && inner.message.is_empty());
        }
    }

    #[test]
    fn optional_result_fields_are_omitted() {
        let resp = CallableResponse {
            result: ReplyResponse {
                text: "hello".into(),
                ..ReplyResponse::default()
            },
        };
        assert_eq!(serde_json::to_value(&resp).unwrap(), json!({ "result": { "text": "hello" } }));
    }
}
