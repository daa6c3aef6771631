use serde::Serialize;

/// JSend-style success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            message: None,
            results: None,
            token: None,
            data: Some(data),
        }
    }

    /// List responses also report how many documents were returned.
    pub fn success_with_results(results: usize, data: T) -> Self {
        Self {
            results: Some(results),
            ..Self::success(data)
        }
    }

    pub fn with_token(token: String, data: T) -> Self {
        Self {
            token: Some(token),
            ..Self::success(data)
        }
    }
}

impl ApiResponse<serde_json::Value> {
    pub fn message(message: &str) -> Self {
        Self {
            status: "success",
            message: Some(message.to_string()),
            results: None,
            token: None,
            data: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            status: "success",
            message: None,
            results: None,
            token: None,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn omits_empty_members() {
        let body = serde_json::to_value(ApiResponse::success(json!({ "data": 1 }))).unwrap();
        assert_eq!(body, json!({ "status": "success", "data": { "data": 1 } }));

        let body = serde_json::to_value(ApiResponse::message("Token sent to email!")).unwrap();
        assert_eq!(body, json!({ "status": "success", "message": "Token sent to email!" }));
    }

    #[test]
    fn list_responses_carry_results() {
        let body = serde_json::to_value(ApiResponse::success_with_results(2, json!({ "data": [1, 2] }))).unwrap();
        assert_eq!(body["results"], 2);
    }
}
