//! Document OCR through the host's `ocr.*` operations.

use serde::Deserialize;
use serde_json::Value;

use researchkit_shared::Result;

use crate::response::decode;
use crate::transport::HostTransport;

/// Vision model used for structured extraction unless overridden.
pub const DEFAULT_OCR_MODEL: &str = "glm-ocr:latest";

/// Local model server used for structured extraction unless overridden.
pub const DEFAULT_OCR_BASE_URL: &str = "http://127.0.0.1:11434";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OcrText {
    pub text: String,
    pub ocr_engine: String,
    pub text_quality: f64,
    pub warnings: Vec<String>,
}

/// OCR text plus model-extracted fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OcrDocument {
    pub text: String,
    pub ocr_engine: String,
    pub text_quality: f64,
    pub warnings: Vec<String>,
    pub structured: Value,
    pub ollama_used: bool,
}

#[derive(Clone)]
pub struct Ocr<T> {
    transport: T,
}

impl<T: HostTransport> Ocr<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn extract_text(&self, pdf_path: &str) -> Result<OcrText> {
        let op = "ocr.extract_text";
        let raw = self
            .transport
            .invoke(op, vec![Value::String(pdf_path.to_string())])
            .await?;
        decode(op, &raw)
    }

    /// `model` and `base_url` fall back to the local defaults when `None`.
    pub async fn extract_document(
        &self,
        pdf_path: &str,
        model: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<OcrDocument> {
        let op = "ocr.extract_document";
        let args = vec![
            Value::String(pdf_path.to_string()),
            Value::String(model.unwrap_or(DEFAULT_OCR_MODEL).to_string()),
            Value::String(base_url.unwrap_or(DEFAULT_OCR_BASE_URL).to_string()),
        ];
        let raw = self.transport.invoke(op, args).await?;
        decode(op, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;

    #[tokio::test]
    async fn document_defaults_applied() {
        let host = ScriptedTransport::new();
        host.respond(
            "ocr.extract_document",
            r#"{"text":"Invoice","ocr_engine":"tesseract","text_quality":0.9,"warnings":[],"structured":{"amount":1200},"ollama_used":true}"#,
        );
        let ocr = Ocr::new(host.clone());

        let doc = ocr.extract_document("/tmp/a.pdf", None, None).await.unwrap();
        assert_eq!(doc.structured["amount"], 1200);
        assert!(doc.ollama_used);

        let call = &host.calls_to("ocr.extract_document")[0];
        assert_eq!(call.args[1], Value::from(DEFAULT_OCR_MODEL));
        assert_eq!(call.args[2], Value::from(DEFAULT_OCR_BASE_URL));
    }

    #[tokio::test]
    async fn text_decoded() {
        let host = ScriptedTransport::new();
        host.respond("ocr.extract_text", r#"{"text":"hello","ocr_engine":"pdf","text_quality":1.0}"#);
        let ocr = Ocr::new(host);
        let out = ocr.extract_text("/tmp/a.pdf").await.unwrap();
        assert_eq!(out.text, "hello");
        assert!(out.warnings.is_empty());
    }
}
