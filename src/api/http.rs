//! HTTP implementation of the label backend contract

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::Form;
use serde_json::Value;
use tracing::debug;

use super::{ApiError, DownloadedExport, LabelApi};
use crate::config::ApiConfig;
use crate::domain::{EditCursor, ExportFormat};
use crate::events::EditArgs;

/// Label backend client over reqwest
pub struct HttpLabelApi {
    base_url: String,
    http: Client,
}

impl HttpLabelApi {
    /// Create a new client from configuration
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        debug!(?config, "from_config: called");
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::new(&config.base_url, http))
    }

    pub fn new(base_url: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_empty(&self, path: &str) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(%url, "post_empty: called");
        let response = self.http.post(&url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        check_response(status, &body)
    }
}

/// Form fields of an edit request: the action's arguments plus the cursor
///
/// Cursor fields win over arguments with the same name.
pub fn edit_form(args: &EditArgs, cursor: EditCursor) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = args
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "frame" | "feature" | "channel"))
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect();
    form.push(("frame".to_string(), cursor.frame.to_string()));
    form.push(("feature".to_string(), cursor.feature.to_string()));
    form.push(("channel".to_string(), cursor.channel.to_string()));
    form
}

/// Turn a response into the success value or a request error
///
/// Any non-2xx status is an error whose payload is the parsed body (or the
/// raw text when the body is not JSON). An empty success body is `null`.
pub fn check_response(status: u16, body: &[u8]) -> Result<Value, ApiError> {
    debug!(status, body_len = body.len(), "check_response: called");
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(Value::Null)
    } else {
        serde_json::from_slice::<Value>(body)
    };

    if (200..300).contains(&status) {
        return parsed.map_err(|e| ApiError::InvalidResponse(format!("Malformed JSON body: {}", e)));
    }

    let payload = parsed.unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
    Err(ApiError::Request { status, payload })
}

/// Extract the file name from a content-disposition header
///
/// Takes everything after `filename=`, strips quotes and any leading folders.
/// Falls back to `{project_id}.{format}` when the header is missing or empty.
pub fn filename_from_disposition(header: Option<&str>, project_id: &str, format: ExportFormat) -> String {
    let fallback = || format!("{}.{}", project_id, format);

    let Some(raw) = header.and_then(|h| h.find("filename=").map(|idx| &h[idx + "filename=".len()..])) else {
        return fallback();
    };

    let unquoted = raw.trim().replace('"', "");
    let name = match unquoted.rfind('/') {
        Some(idx) => &unquoted[idx + 1..],
        None => unquoted.as_str(),
    };

    if name.is_empty() { fallback() } else { name.to_string() }
}

#[async_trait]
impl LabelApi for HttpLabelApi {
    async fn edit(
        &self,
        project_id: &str,
        action: &str,
        args: &EditArgs,
        cursor: EditCursor,
    ) -> Result<Value, ApiError> {
        let url = self.url(&format!("/api/edit/{}/{}", project_id, action));
        debug!(%url, ?cursor, "edit: called");
        let response = self.http.post(&url).form(&edit_form(args, cursor)).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        check_response(status, &body)
    }

    async fn undo(&self, project_id: &str) -> Result<Value, ApiError> {
        self.post_empty(&format!("/api/undo/{}", project_id)).await
    }

    async fn redo(&self, project_id: &str) -> Result<Value, ApiError> {
        self.post_empty(&format!("/api/redo/{}", project_id)).await
    }

    async fn upload(&self, project_id: &str, bucket: &str, format: ExportFormat) -> Result<Value, ApiError> {
        let url = self.url("/api/upload");
        debug!(%url, %project_id, %bucket, %format, "upload: called");
        let form = Form::new()
            .text("id", project_id.to_string())
            .text("bucket", bucket.to_string())
            .text("format", format.as_str());
        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        check_response(status, &body)
    }

    async fn download(&self, project_id: &str, format: ExportFormat) -> Result<DownloadedExport, ApiError> {
        let url = self.url("/api/download");
        debug!(%url, %project_id, %format, "download: called");
        let response = self
            .http
            .get(&url)
            .query(&[("id", project_id), ("format", format.as_str())])
            .send()
            .await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body = response.bytes().await?;
            check_response(status, &body)?;
            return Err(ApiError::InvalidResponse(format!("Unexpected status {}", status)));
        }

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let filename = filename_from_disposition(disposition.as_deref(), project_id, format);
        let bytes = response.bytes().await?.to_vec();
        debug!(%filename, size = bytes.len(), "download: received export");

        Ok(DownloadedExport { filename, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filename_from_disposition_strips_quotes_and_folders() {
        let name = filename_from_disposition(
            Some(r#"attachment; filename="folder/my-proj.npz""#),
            "abc",
            ExportFormat::Npz,
        );
        assert_eq!(name, "my-proj.npz");
    }

    #[test]
    fn test_filename_from_disposition_plain() {
        let name = filename_from_disposition(Some("attachment; filename=tracks.trk"), "abc", ExportFormat::Trk);
        assert_eq!(name, "tracks.trk");
    }

    #[test]
    fn test_filename_from_disposition_fallback() {
        assert_eq!(filename_from_disposition(None, "abc", ExportFormat::Npz), "abc.npz");
        assert_eq!(
            filename_from_disposition(Some("attachment"), "abc", ExportFormat::Trk),
            "abc.trk"
        );
        assert_eq!(
            filename_from_disposition(Some(r#"attachment; filename="dir/""#), "abc", ExportFormat::Npz),
            "abc.npz"
        );
    }

    #[test]
    fn test_check_response_success() {
        let value = check_response(200, br#"{"imgs": {"seg": true}}"#).unwrap();
        assert_eq!(value["imgs"]["seg"], true);
        assert_eq!(check_response(204, b"").unwrap(), Value::Null);
    }

    #[test]
    fn test_check_response_error_payload() {
        let err = check_response(400, br#"{"error":"bad frame"}"#).unwrap_err();
        match &err {
            ApiError::Request { status, payload } => {
                assert_eq!(*status, 400);
                assert_eq!(payload, &json!({"error": "bad frame"}));
            }
            other => panic!("Expected request error, got {:?}", other),
        }
        assert_eq!(err.payload(), json!("bad frame"));
    }

    #[test]
    fn test_check_response_non_json_error() {
        let err = check_response(502, b"Bad Gateway").unwrap_err();
        assert_eq!(err.payload(), json!("Bad Gateway"));
    }

    #[test]
    fn test_check_response_malformed_success_body() {
        let err = check_response(200, b"{not json").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_edit_form_includes_cursor() {
        let mut args = EditArgs::new();
        args.insert("label".to_string(), json!(3));
        args.insert("mode".to_string(), json!("overwrite"));
        args.insert("frame".to_string(), json!(99));

        let cursor = EditCursor {
            frame: 2,
            feature: 1,
            channel: 0,
        };
        let form = edit_form(&args, cursor);

        assert!(form.contains(&("label".to_string(), "3".to_string())));
        assert!(form.contains(&("mode".to_string(), "overwrite".to_string())));
        assert!(form.contains(&("frame".to_string(), "2".to_string())));
        assert!(form.contains(&("feature".to_string(), "1".to_string())));
        assert!(form.contains(&("channel".to_string(), "0".to_string())));
        assert_eq!(form.iter().filter(|(k, _)| k == "frame").count(), 1);
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let api = HttpLabelApi::new("http://localhost:5000/", Client::new());
        assert_eq!(api.url("/api/undo/abc"), "http://localhost:5000/api/undo/abc");
    }
}
