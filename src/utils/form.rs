use axum::{
    Form, Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A request body that may arrive as JSON, an urlencoded form or multipart.
///
/// Text parts of a multipart body are read as JSON when they parse
/// (`price=497` becomes a number) and as plain strings otherwise, so the
/// same schema types deserialize from every encoding. Repeated keys collect
/// into an array.
#[derive(Debug, Default)]
pub struct FormPayload {
    pub fields: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

impl FormPayload {
    pub fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.fields.contains_key(*k))
    }

    pub fn files_named<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }

    pub fn parse<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| AppError::bad_request(format!("Invalid input data. {}", e)))
    }

    fn insert(&mut self, key: String, value: Value) {
        match self.fields.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.fields.insert(key, value);
            }
        }
    }
}

fn coerce(text: String) -> Value {
    match serde_json::from_str::<Value>(&text) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Array(_) | Value::Object(_))) => value,
        _ => Value::String(text),
    }
}

impl<S> FromRequest<S> for FormPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut payload = FormPayload::default();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state).await?;
            while let Some(field) = multipart.next_field().await? {
                let name = field.name().unwrap_or_default().to_string();
                if field.file_name().is_some() {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        payload.files.push(UploadedFile {
                            field: name,
                            content_type,
                            bytes,
                        });
                    }
                } else {
                    let text = field.text().await?;
                    payload.insert(name, coerce(text));
                }
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state).await?;
            for (key, value) in pairs {
                payload.insert(key, Value::String(value));
            }
        } else {
            let Json(value) = Json::<Value>::from_request(req, state).await?;
            match value {
                Value::Object(map) => payload.fields = map,
                _ => return Err(AppError::bad_request("Request body must be a JSON object")),
            }
        }

        Ok(payload)
    }
}
