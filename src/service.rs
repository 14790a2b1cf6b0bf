use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::invoice::InvoiceRecord;
use crate::params::Credentials;

/// 収集リクエスト
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub credentials: Credentials,
    pub download: bool,
    /// 指定時は新規分のみを返す
    pub previously_seen: Option<HashSet<String>>,
}

impl CollectRequest {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            download: true,
            previously_seen: None,
        }
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    pub fn with_previously_seen(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.previously_seen = Some(ids.into_iter().collect());
        self
    }
}

/// tower::Serviceを実装したコレクターサービス
#[derive(Debug, Clone)]
pub struct CollectorService {
    collector: Arc<Collector>,
}

impl CollectorService {
    pub fn new(collector: Arc<Collector>) -> Self {
        Self { collector }
    }
}

impl Service<CollectRequest> for CollectorService {
    type Response = Vec<InvoiceRecord>;
    type Error = CollectorError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CollectRequest) -> Self::Future {
        let collector = self.collector.clone();
        info!(
            "Collect request received: collector={}, download={}",
            collector.config().id,
            req.download
        );

        Box::pin(async move {
            let invoices = match &req.previously_seen {
                Some(seen) => {
                    collector
                        .collect_new(&req.credentials, req.download, seen)
                        .await?
                }
                None => collector.collect(&req.credentials, req.download).await?,
            };

            info!(
                "Collect completed: collector={}, invoices={}",
                collector.config().id,
                invoices.len()
            );
            Ok(invoices)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;

    #[test]
    fn test_collect_request_builder() {
        let creds = Credentials::new().with("username", "me").with("password", "pw");
        let req = CollectRequest::new(creds)
            .with_download(false)
            .with_previously_seen(vec!["a".to_string(), "b".to_string()]);

        assert!(!req.download);
        let seen = req.previously_seen.unwrap();
        assert!(seen.contains("a"));
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_service_surfaces_unimplemented() {
        let collector = Collector::sketch(CollectorConfig::new(
            "decathlon",
            "Decathlon",
            "1",
            "https://www.decathlon.fr/fr/loginPage",
        ));
        let mut service = CollectorService::new(Arc::new(collector));
        let creds = Credentials::new().with("username", "me").with("password", "pw");

        let err = service.call(CollectRequest::new(creds)).await.unwrap_err();
        assert!(matches!(err, CollectorError::Unimplemented { .. }));
    }

    #[tokio::test]
    async fn test_service_validates_before_dispatch() {
        let collector = Collector::sketch(CollectorConfig::new("x", "X", "1", "https://example.com"));
        let mut service = CollectorService::new(Arc::new(collector));

        let err = service
            .call(CollectRequest::new(Credentials::new().with("username", "me")))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::MissingField(f) if f == "password"));
    }
}
