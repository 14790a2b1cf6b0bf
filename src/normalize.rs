//! ペイロード正規化
//!
//! リンク・バイト列の請求書をすべて base64 エンコード済みに揃え、
//! タイムスタンプ昇順に並べ替える。

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, info};

use crate::error::CollectorError;
use crate::invoice::{InvoiceRecord, Payload};

/// リンク先のバイナリ取得
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    async fn fetch(&self, link: &str) -> Result<Vec<u8>, CollectorError>;
}

/// reqwest による HTTP 取得
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Fetch(format!("HTTPクライアント作成失敗: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PayloadFetcher for HttpFetcher {
    async fn fetch(&self, link: &str) -> Result<Vec<u8>, CollectorError> {
        let response = self
            .client
            .get(link)
            .send()
            .await
            .map_err(|e| CollectorError::Fetch(format!("{}: {}", link, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Fetch(format!("{}: HTTP {}", link, status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CollectorError::Fetch(format!("{}: {}", link, e)))?;
        Ok(body.to_vec())
    }
}

/// 全レコードをエンコード済みにし、タイムスタンプ昇順（None は先頭）に安定ソートする
///
/// 途中で取得に失敗した場合はエラーを返し、それまでのレコードは変換済みのまま残る。
pub async fn normalize(
    records: &mut [InvoiceRecord],
    fetcher: &dyn PayloadFetcher,
) -> Result<(), CollectorError> {
    info!("Normalizing {} invoices", records.len());

    for record in records.iter_mut() {
        match record.payload_ref() {
            Payload::Link(link) => {
                debug!("Downloading invoice {} from {}", record.id(), link);
                let bytes = fetcher.fetch(link).await?;
                record.set_encoded(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
            Payload::Bytes(_) => record.encode_bytes_in_place(),
            Payload::Encoded(_) => {}
        }
    }

    records.sort_by_key(InvoiceRecord::timestamp);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::InvoiceKind;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapFetcher {
        bodies: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PayloadFetcher for MapFetcher {
        async fn fetch(&self, link: &str) -> Result<Vec<u8>, CollectorError> {
            self.calls.lock().unwrap().push(link.to_string());
            self.bodies
                .get(link)
                .cloned()
                .ok_or_else(|| CollectorError::Fetch(format!("{}: HTTP 404 Not Found", link)))
        }
    }

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_normalize_converges_to_encoded() {
        let mut fetcher = MapFetcher::default();
        fetcher
            .bodies
            .insert("https://example.com/a.pdf".into(), b"pdf-a".to_vec());

        let mut records = vec![
            InvoiceRecord::from_link("a", "application/pdf", "https://example.com/a.pdf"),
            InvoiceRecord::from_bytes("b", "application/pdf", b"pdf-b".to_vec()),
            InvoiceRecord::from_payload("c", "application/pdf", "cGRmLWM="),
        ];

        normalize(&mut records, &fetcher).await.unwrap();

        for record in &records {
            assert_eq!(record.kind(), InvoiceKind::EncodedPayload);
            assert!(record.link().is_none());
            assert!(record.bytes().is_none());
        }
        let decoded: Vec<Vec<u8>> = records.iter().map(|r| r.decode_payload().unwrap()).collect();
        assert!(decoded.contains(&b"pdf-a".to_vec()));
        assert!(decoded.contains(&b"pdf-b".to_vec()));
        assert!(decoded.contains(&b"pdf-c".to_vec()));
    }

    #[tokio::test]
    async fn test_normalize_is_idempotent_on_encoded() {
        let fetcher = MapFetcher::default();
        let mut records = vec![InvoiceRecord::from_payload("c", "application/pdf", "AAAA")];
        let before = records.clone();

        normalize(&mut records, &fetcher).await.unwrap();
        normalize(&mut records, &fetcher).await.unwrap();

        assert_eq!(records, before);
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_normalize_sorts_stably_with_missing_first() {
        let fetcher = MapFetcher::default();
        let mut records = vec![
            InvoiceRecord::from_payload("late", "application/pdf", "AA==").with_timestamp(at(20)),
            InvoiceRecord::from_payload("tie-1", "application/pdf", "AA==").with_timestamp(at(10)),
            InvoiceRecord::from_payload("undated", "application/pdf", "AA=="),
            InvoiceRecord::from_payload("tie-2", "application/pdf", "AA==").with_timestamp(at(10)),
            InvoiceRecord::from_payload("early", "application/pdf", "AA==").with_timestamp(at(1)),
        ];

        normalize(&mut records, &fetcher).await.unwrap();

        let ids: Vec<&str> = records.iter().map(InvoiceRecord::id).collect();
        assert_eq!(ids, vec!["undated", "early", "tie-1", "tie-2", "late"]);
    }

    #[tokio::test]
    async fn test_http_fetcher_times_out_on_stalled_server() {
        // 接続は受け付けるが応答しないサーバー
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let fetcher = HttpFetcher::new(Duration::from_millis(300)).unwrap();
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            fetcher.fetch(&format!("http://{}/invoice.pdf", addr)),
        )
        .await
        .expect("fetch should give up on its own");

        assert!(matches!(outcome, Err(CollectorError::Fetch(_))));
        server.abort();
    }

    #[tokio::test]
    async fn test_normalize_propagates_fetch_error() {
        let fetcher = MapFetcher::default();
        let mut records = vec![
            InvoiceRecord::from_bytes("b", "application/pdf", vec![1, 2]),
            InvoiceRecord::from_link("a", "application/pdf", "https://example.com/gone.pdf"),
        ];

        let err = normalize(&mut records, &fetcher).await.unwrap_err();
        assert!(matches!(err, CollectorError::Fetch(_)));
        // 失敗前のレコードは変換済みのまま
        assert_eq!(records[0].kind(), InvoiceKind::EncodedPayload);
        assert_eq!(records[1].kind(), InvoiceKind::RemoteReference);
    }
}
