use {
    chrono::{DateTime, Local},
    serde::{Deserialize, Serialize},
};

/// `strftime` layout of [`AggregatedResponse::timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    #[serde(rename = "texto")]
    Text,
    #[serde(rename = "archivo")]
    File,
}

/// The single published result of one dispatch.
///
/// Field names on the wire are the ones the web frontend reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub status: ResponseStatus,
    #[serde(rename = "texto")]
    pub text: String,
    #[serde(rename = "archivos", default)]
    pub files: Vec<String>,
    /// Always the first entry of `files`.
    #[serde(rename = "archivo", default)]
    pub primary_file: Option<String>,
    #[serde(rename = "tipo_respuesta", default = "default_kind")]
    pub kind: ResponseKind,
    #[serde(default)]
    pub timestamp: String,
}

fn default_kind() -> ResponseKind {
    ResponseKind::Text
}

impl AggregatedResponse {
    /// Successful response; kind and primary file follow from `files`.
    #[must_use]
    pub fn ok(text: impl Into<String>, files: Vec<String>) -> Self {
        let kind = if files.is_empty() {
            ResponseKind::Text
        } else {
            ResponseKind::File
        };
        Self {
            status: ResponseStatus::Ok,
            text: text.into(),
            primary_file: files.first().cloned(),
            files,
            kind,
            timestamp: format_timestamp(Local::now()),
        }
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            text: text.into(),
            files: Vec::new(),
            primary_file: None,
            kind: ResponseKind::Text,
            timestamp: format_timestamp(Local::now()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

#[must_use]
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    #[test]
    fn text_only_response_has_no_primary_file() {
        let resp = AggregatedResponse::ok("DNI 12345678", Vec::new());
        assert_eq!(resp.kind, ResponseKind::Text);
        assert_eq!(resp.primary_file, None);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["texto"], "DNI 12345678");
        assert_eq!(json["archivos"], serde_json::json!([]));
        assert!(json["archivo"].is_null());
        assert_eq!(json["tipo_respuesta"], "texto");
    }

    #[test]
    fn file_response_points_at_first_file() {
        let resp = AggregatedResponse::ok(
            "ficha",
            vec!["respuesta_1_0.pdf".into(), "respuesta_1_1.jpg".into()],
        );
        assert_eq!(resp.kind, ResponseKind::File);
        assert_eq!(resp.primary_file.as_deref(), Some("respuesta_1_0.pdf"));

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["tipo_respuesta"], "archivo");
        assert_eq!(json["archivo"], "respuesta_1_0.pdf");
    }

    #[test]
    fn error_response_shape() {
        let resp = AggregatedResponse::error("boom");
        assert!(!resp.is_ok());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["texto"], "boom");
    }

    #[test]
    fn timestamp_layout() {
        let at = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(format_timestamp(at), "2025-03-07 09:05:01");
    }

    #[test]
    fn parses_minimal_error_document() {
        let resp: AggregatedResponse =
            serde_json::from_str(r#"{"status":"error","texto":"x"}"#).unwrap();
        assert_eq!(resp.status, ResponseStatus::Error);
        assert!(resp.files.is_empty());
        assert_eq!(resp.kind, ResponseKind::Text);
    }
}
