//! 収集オーケストレーター
//!
//! ベンダーアダプターの login / run を、次の順序の収集処理として実行する。
//!
//! 1. 必須パラメータの確認
//! 2. セッション取得
//! 3. エントリURLへ移動
//! 4. メンテナンス判定
//! 5. ログイン
//! 6. 認証エラー判定
//! 7. スクレイピング
//! 8. 未完了判定（ページのスナップショットを取得）
//! 9. セッション解放（どの経路でも1回だけ）
//!
//! どの段階で失敗しても、セッションを解放してから型付きのエラーを返す。

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::adapter::{
    ApiAdapter, AuthenticationCheck, LoginOutcome, MaintenanceCheck, ScrapeOutcome, VendorAdapter,
};
use crate::config::{CollectorConfig, SessionConfig};
use crate::driver::Driver;
use crate::error::CollectorError;
use crate::invoice::InvoiceRecord;
use crate::normalize::{normalize, HttpFetcher, PayloadFetcher};
use crate::novelty::filter_new;
use crate::params::{self, Credentials};
use crate::session::SessionProvider;

/// リンク形式の請求書ダウンロードのタイムアウト（秒）
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
enum Backend {
    Scraper {
        adapter: Arc<dyn VendorAdapter>,
        sessions: Arc<dyn SessionProvider>,
    },
    Api(Arc<dyn ApiAdapter>),
    /// 宣言のみで未実装のベンダー
    Sketch,
}

/// 1ベンダー分のコレクター
#[derive(Clone)]
pub struct Collector {
    config: CollectorConfig,
    backend: Backend,
    maintenance: Option<Arc<dyn MaintenanceCheck>>,
    authentication: Option<Arc<dyn AuthenticationCheck>>,
    authentication_error: Option<String>,
    session_config: SessionConfig,
    /// 未指定なら収集時に HttpFetcher を作る
    fetcher: Option<Arc<dyn PayloadFetcher>>,
    fetch_timeout: Duration,
}

impl Collector {
    fn with_backend(config: CollectorConfig, backend: Backend) -> Self {
        Self {
            config,
            backend,
            maintenance: None,
            authentication: None,
            authentication_error: None,
            session_config: SessionConfig::default(),
            fetcher: None,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// ブラウザを操作するコレクター
    pub fn scraper(
        config: CollectorConfig,
        adapter: Arc<dyn VendorAdapter>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self::with_backend(config, Backend::Scraper { adapter, sessions })
    }

    /// API を呼び出すコレクター
    pub fn api(config: CollectorConfig, adapter: Arc<dyn ApiAdapter>) -> Self {
        Self::with_backend(config, Backend::Api(adapter))
    }

    /// 未実装のコレクター（collect は Unimplemented で失敗する）
    pub fn sketch(config: CollectorConfig) -> Self {
        Self::with_backend(config, Backend::Sketch)
    }

    pub fn with_maintenance_check(mut self, check: Arc<dyn MaintenanceCheck>) -> Self {
        self.maintenance = Some(check);
        self
    }

    pub fn with_authentication_check(mut self, check: Arc<dyn AuthenticationCheck>) -> Self {
        self.authentication = Some(check);
        self
    }

    /// 認証チェック未指定時に返すメッセージ
    pub fn with_authentication_error(mut self, message: impl Into<String>) -> Self {
        self.authentication_error = Some(message.into());
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn PayloadFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// デフォルトの HttpFetcher のダウンロードタイムアウト
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// 請求書を収集する。`should_download` なら全件を正規化して返し、
    /// そうでなければアダプタの結果をそのまま返す
    pub async fn collect(
        &self,
        credentials: &Credentials,
        should_download: bool,
    ) -> Result<Vec<InvoiceRecord>, CollectorError> {
        let mut invoices = self.collect_raw(credentials).await?;
        if should_download {
            normalize(&mut invoices, self.fetcher()?.as_ref()).await?;
        }
        Ok(invoices)
    }

    /// 既知IDにない請求書だけを返す。ダウンロードは新規分に限る
    pub async fn collect_new(
        &self,
        credentials: &Credentials,
        should_download: bool,
        previously_seen: &HashSet<String>,
    ) -> Result<Vec<InvoiceRecord>, CollectorError> {
        let invoices = self.collect_raw(credentials).await?;
        let total = invoices.len();
        let mut new_invoices = filter_new(invoices, previously_seen);

        if new_invoices.is_empty() {
            info!("[{}] Found {} invoices but none are new", self.config.id, total);
            return Ok(new_invoices);
        }

        info!(
            "[{}] Found {} invoices, {} are new",
            self.config.id,
            total,
            new_invoices.len()
        );

        if should_download {
            info!("[{}] Downloading {} invoices", self.config.id, new_invoices.len());
            normalize(&mut new_invoices, self.fetcher()?.as_ref()).await?;
        } else {
            info!("[{}] Download skipped by caller", self.config.id);
        }

        Ok(new_invoices)
    }

    fn fetcher(&self) -> Result<Arc<dyn PayloadFetcher>, CollectorError> {
        match &self.fetcher {
            Some(fetcher) => Ok(fetcher.clone()),
            None => Ok(Arc::new(HttpFetcher::new(self.fetch_timeout)?)),
        }
    }

    async fn collect_raw(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<InvoiceRecord>, CollectorError> {
        params::validate(&self.config.params, credentials)?;
        info!(
            "[{}] Starting collection (v{})",
            self.config.id, self.config.version
        );

        let invoices = match &self.backend {
            Backend::Scraper { adapter, sessions } => {
                self.collect_with_session(adapter.as_ref(), sessions.as_ref(), credentials)
                    .await?
            }
            Backend::Api(adapter) => match adapter.fetch(credentials).await? {
                ScrapeOutcome::Invoices(invoices) => invoices,
                ScrapeOutcome::Failed(message) => return Err(self.scrape_failed(message)),
                ScrapeOutcome::Unfinished => {
                    return Err(CollectorError::UnfinishedCollector {
                        vendor: self.config.name.clone(),
                        version: self.config.version.clone(),
                        location: self.config.entry_url.clone(),
                        content: String::new(),
                        screenshot: String::new(),
                    })
                }
            },
            Backend::Sketch => {
                return Err(CollectorError::Unimplemented {
                    vendor: self.config.name.clone(),
                    capability: "collect".into(),
                })
            }
        };

        let invoices = self.check_ids(invoices)?;
        info!("[{}] Collected {} invoices", self.config.id, invoices.len());
        Ok(invoices)
    }

    async fn collect_with_session(
        &self,
        adapter: &dyn VendorAdapter,
        sessions: &dyn SessionProvider,
        credentials: &Credentials,
    ) -> Result<Vec<InvoiceRecord>, CollectorError> {
        let mut session = sessions.acquire(&self.session_config).await?;

        // アダプターが panic してもセッションは解放する
        let result = AssertUnwindSafe(self.drive(adapter, session.as_driver(), credentials))
            .catch_unwind()
            .await;

        if let Err(e) = session.close().await {
            warn!("[{}] Failed to release session: {}", self.config.id, e);
        }

        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn drive(
        &self,
        adapter: &dyn VendorAdapter,
        driver: &dyn Driver,
        credentials: &Credentials,
    ) -> Result<Vec<InvoiceRecord>, CollectorError> {
        debug!("[{}] Navigating to {}", self.config.id, self.config.entry_url);
        driver.goto(&self.config.entry_url).await?;

        if let Some(check) = &self.maintenance {
            if check.is_in_maintenance(driver, credentials).await? {
                warn!("[{}] Vendor is in maintenance", self.config.id);
                return Err(CollectorError::InMaintenance {
                    vendor: self.config.name.clone(),
                    version: self.config.version.clone(),
                });
            }
        }

        info!("[{}] Logging in...", self.config.id);
        if let LoginOutcome::Rejected(message) = adapter.login(driver, credentials).await? {
            if !message.is_empty() {
                return Err(self.not_authenticated(message));
            }
        }

        let auth_error = match &self.authentication {
            Some(check) => check.authentication_error(driver, credentials).await?,
            None => self.authentication_error.clone(),
        };
        if let Some(message) = auth_error.filter(|m| !m.is_empty()) {
            return Err(self.not_authenticated(message));
        }

        info!("[{}] Login successful, collecting invoices...", self.config.id);
        match adapter.run(driver, credentials).await? {
            ScrapeOutcome::Invoices(invoices) => Ok(invoices),
            ScrapeOutcome::Failed(message) => Err(self.scrape_failed(message)),
            ScrapeOutcome::Unfinished => Err(self.unfinished(driver).await),
        }
    }

    /// 現在のページを記録した UnfinishedCollector を作る。取得に失敗した項目は空にする
    async fn unfinished(&self, driver: &dyn Driver) -> CollectorError {
        warn!(
            "[{}] Adapter produced no result, capturing page snapshot",
            self.config.id
        );
        let engine = base64::engine::general_purpose::STANDARD;

        let location = driver.url().await.unwrap_or_else(|e| {
            warn!("[{}] Failed to read location: {}", self.config.id, e);
            String::new()
        });
        let content = match driver.content().await {
            Ok(html) => engine.encode(html),
            Err(e) => {
                warn!("[{}] Failed to capture content: {}", self.config.id, e);
                String::new()
            }
        };
        let screenshot = match driver.screenshot().await {
            Ok(png) => engine.encode(png),
            Err(e) => {
                warn!("[{}] Failed to capture screenshot: {}", self.config.id, e);
                String::new()
            }
        };

        CollectorError::UnfinishedCollector {
            vendor: self.config.name.clone(),
            version: self.config.version.clone(),
            location,
            content,
            screenshot,
        }
    }

    fn not_authenticated(&self, message: String) -> CollectorError {
        warn!("[{}] Authentication failed: {}", self.config.id, message);
        CollectorError::NotAuthenticated {
            message,
            vendor: self.config.name.clone(),
            version: self.config.version.clone(),
        }
    }

    fn scrape_failed(&self, message: String) -> CollectorError {
        CollectorError::Scrape {
            message,
            vendor: self.config.name.clone(),
            version: self.config.version.clone(),
        }
    }

    /// 空IDは不正、重複IDは最初の1件だけを残す
    fn check_ids(&self, invoices: Vec<InvoiceRecord>) -> Result<Vec<InvoiceRecord>, CollectorError> {
        let mut seen = HashSet::with_capacity(invoices.len());
        let mut unique = Vec::with_capacity(invoices.len());

        for invoice in invoices {
            if invoice.id().is_empty() {
                return Err(CollectorError::InvalidRecord(format!(
                    "{}: idが空の請求書が返されました",
                    self.config.name
                )));
            }
            if seen.insert(invoice.id().to_string()) {
                unique.push(invoice);
            } else {
                warn!(
                    "[{}] Duplicate invoice id dropped: {}",
                    self.config.id,
                    invoice.id()
                );
            }
        }

        Ok(unique)
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Scraper { .. } => "scraper",
            Backend::Api(_) => "api",
            Backend::Sketch => "sketch",
        };
        f.debug_struct("Collector")
            .field("id", &self.config.id)
            .field("version", &self.config.version)
            .field("backend", &backend)
            .finish()
    }
}
