//! 請求書レコード
//!
//! ベンダーごとに異なる形式（リンク、バイト列、エンコード済み）で取得した請求書を
//! 共通の形で扱う。ペイロードは内部の列挙型で保持するため、`kind` と
//! link / bytes / payload の対応が崩れることはない。

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

/// ペイロードの保持形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvoiceKind {
    RemoteReference,
    RawBytes,
    EncodedPayload,
}

/// 金額（数値で取れないベンダーは表示文字列のまま）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Amount::Number(value)
    }
}

impl From<&str> for Amount {
    fn from(value: &str) -> Self {
        Amount::Text(value.to_string())
    }
}

impl From<String> for Amount {
    fn from(value: String) -> Self {
        Amount::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Link(String),
    Bytes(Vec<u8>),
    Encoded(String),
}

/// 正規化された請求書
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "InvoiceWire", try_from = "InvoiceWire")]
pub struct InvoiceRecord {
    id: String,
    timestamp: Option<DateTime<Utc>>,
    mime: String,
    amount: Option<Amount>,
    payload: Payload,
}

impl InvoiceRecord {
    fn new(id: impl Into<String>, mime: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            timestamp: None,
            mime: mime.into(),
            amount: None,
            payload,
        }
    }

    /// ダウンロードURLで表される請求書
    pub fn from_link(id: impl Into<String>, mime: impl Into<String>, link: impl Into<String>) -> Self {
        Self::new(id, mime, Payload::Link(link.into()))
    }

    /// メモリ上のバイト列で表される請求書
    pub fn from_bytes(id: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(id, mime, Payload::Bytes(bytes))
    }

    /// base64エンコード済みの請求書
    pub fn from_payload(
        id: impl Into<String>,
        mime: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, mime, Payload::Encoded(payload.into()))
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_amount(mut self, amount: impl Into<Amount>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> InvoiceKind {
        match self.payload {
            Payload::Link(_) => InvoiceKind::RemoteReference,
            Payload::Bytes(_) => InvoiceKind::RawBytes,
            Payload::Encoded(_) => InvoiceKind::EncodedPayload,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn amount(&self) -> Option<&Amount> {
        self.amount.as_ref()
    }

    pub fn link(&self) -> Option<&str> {
        match &self.payload {
            Payload::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&str> {
        match &self.payload {
            Payload::Encoded(payload) => Some(payload),
            _ => None,
        }
    }

    /// エンコード済みペイロードを元のバイト列に戻す
    pub fn decode_payload(&self) -> Result<Vec<u8>, CollectorError> {
        let payload = self.payload().ok_or_else(|| {
            CollectorError::InvalidRecord(format!("{}: ペイロードが未エンコードです", self.id))
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| CollectorError::InvalidRecord(format!("{}: {}", self.id, e)))
    }

    pub(crate) fn payload_ref(&self) -> &Payload {
        &self.payload
    }

    /// ペイロードをエンコード済みに置き換える（元のリンク/バイト列は破棄）
    pub(crate) fn set_encoded(&mut self, encoded: String) {
        self.payload = Payload::Encoded(encoded);
    }

    /// バイト列をその場でエンコードし、バッファを解放する
    pub(crate) fn encode_bytes_in_place(&mut self) {
        if let Payload::Bytes(bytes) = &mut self.payload {
            let bytes = std::mem::take(bytes);
            self.payload =
                Payload::Encoded(base64::engine::general_purpose::STANDARD.encode(bytes));
        }
    }
}

/// JSON上の表現: `{id, kind, timestamp, mime, amount, link, payload}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InvoiceWire {
    id: String,
    kind: InvoiceKind,
    timestamp: Option<DateTime<Utc>>,
    mime: String,
    amount: Option<Amount>,
    link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bytes: Option<Vec<u8>>,
    payload: Option<String>,
}

impl From<InvoiceRecord> for InvoiceWire {
    fn from(record: InvoiceRecord) -> Self {
        let kind = record.kind();
        let (link, bytes, payload) = match record.payload {
            Payload::Link(link) => (Some(link), None, None),
            Payload::Bytes(bytes) => (None, Some(bytes), None),
            Payload::Encoded(payload) => (None, None, Some(payload)),
        };
        Self {
            id: record.id,
            kind,
            timestamp: record.timestamp,
            mime: record.mime,
            amount: record.amount,
            link,
            bytes,
            payload,
        }
    }
}

impl TryFrom<InvoiceWire> for InvoiceRecord {
    type Error = CollectorError;

    fn try_from(wire: InvoiceWire) -> Result<Self, Self::Error> {
        if wire.id.is_empty() {
            return Err(CollectorError::InvalidRecord("idが空です".into()));
        }

        let payload = match (wire.kind, wire.link, wire.bytes, wire.payload) {
            (InvoiceKind::RemoteReference, Some(link), None, None) => Payload::Link(link),
            (InvoiceKind::RawBytes, None, Some(bytes), None) => Payload::Bytes(bytes),
            (InvoiceKind::EncodedPayload, None, None, Some(payload)) => Payload::Encoded(payload),
            (kind, ..) => {
                return Err(CollectorError::InvalidRecord(format!(
                    "{}: kind={:?} とペイロードが一致しません",
                    wire.id, kind
                )))
            }
        };

        Ok(Self {
            id: wire.id,
            timestamp: wire.timestamp,
            mime: wire.mime,
            amount: wire.amount,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_kind_follows_payload() {
        let link = InvoiceRecord::from_link("a", "application/pdf", "https://example.com/a.pdf");
        assert_eq!(link.kind(), InvoiceKind::RemoteReference);
        assert_eq!(link.link(), Some("https://example.com/a.pdf"));
        assert!(link.bytes().is_none());
        assert!(link.payload().is_none());

        let bytes = InvoiceRecord::from_bytes("b", "application/pdf", vec![1, 2, 3]);
        assert_eq!(bytes.kind(), InvoiceKind::RawBytes);
        assert_eq!(bytes.bytes(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_encode_bytes_round_trip() {
        let original = b"%PDF-1.4 invoice".to_vec();
        let mut record = InvoiceRecord::from_bytes("inv-1", "application/pdf", original.clone());
        record.encode_bytes_in_place();

        assert_eq!(record.kind(), InvoiceKind::EncodedPayload);
        assert!(record.bytes().is_none());
        assert_eq!(record.decode_payload().unwrap(), original);
    }

    #[test]
    fn test_decode_requires_encoded_payload() {
        let record = InvoiceRecord::from_link("a", "application/pdf", "https://example.com");
        assert!(matches!(
            record.decode_payload(),
            Err(CollectorError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_serialize_shape() {
        let record = InvoiceRecord::from_link("402-123", "application/pdf", "https://example.com/x")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
            .with_amount(12.5);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "402-123");
        assert_eq!(json["kind"], "remote-reference");
        assert_eq!(json["mime"], "application/pdf");
        assert_eq!(json["amount"], 12.5);
        assert_eq!(json["link"], "https://example.com/x");
        assert!(json["payload"].is_null());
        assert!(json.get("bytes").is_none());
    }

    #[test]
    fn test_serialize_nulls() {
        let record = InvoiceRecord::from_payload("x", "application/pdf", "AAAA");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["timestamp"].is_null());
        assert!(json["amount"].is_null());
        assert!(json["link"].is_null());
        assert_eq!(json["kind"], "encoded-payload");
    }

    #[test]
    fn test_deserialize_rejects_mismatched_kind() {
        let json = serde_json::json!({
            "id": "x",
            "kind": "encoded-payload",
            "timestamp": null,
            "mime": "application/pdf",
            "amount": null,
            "link": "https://example.com",
            "payload": null
        });
        assert!(serde_json::from_value::<InvoiceRecord>(json).is_err());
    }

    #[test]
    fn test_deserialize_rejects_empty_id() {
        let json = serde_json::json!({
            "id": "",
            "kind": "remote-reference",
            "timestamp": null,
            "mime": "application/pdf",
            "amount": "12,50 €",
            "link": "https://example.com",
            "payload": null
        });
        assert!(serde_json::from_value::<InvoiceRecord>(json).is_err());
    }

    #[test]
    fn test_deserialize_text_amount() {
        let json = serde_json::json!({
            "id": "x",
            "kind": "remote-reference",
            "timestamp": "2024-01-05T00:00:00Z",
            "mime": "application/pdf",
            "amount": "12,50 €",
            "link": "https://example.com",
            "payload": null
        });
        let record: InvoiceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.amount(), Some(&Amount::Text("12,50 €".into())));
        assert!(record.timestamp().is_some());
    }
}
