//! 請求書コレクターライブラリ
//!
//! - ベンダーごとのログイン/スクレイピング手順（アダプター）を共通の収集処理として実行
//! - メンテナンス・認証失敗・未完了を型付きエラーとして検出
//! - 請求書ペイロードを base64 に正規化し、既知IDにない請求書だけを返す
//!
//! # 使用例
//!
//! ```rust,ignore
//! use std::collections::HashSet;
//! use std::sync::Arc;
//! use invoice_collector::{ChromiumProvider, Collector, CollectorConfig, Credentials};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CollectorConfig::new("shop", "Shop", "1", "https://shop.example.com/orders");
//!     let collector = Collector::scraper(config, Arc::new(ShopAdapter), Arc::new(ChromiumProvider::new()));
//!
//!     let credentials = Credentials::new()
//!         .with("username", "user")
//!         .with("password", "pass");
//!
//!     let seen: HashSet<String> = HashSet::new();
//!     let invoices = collector.collect_new(&credentials, true, &seen).await.unwrap();
//!     println!("New invoices: {}", invoices.len());
//! }
//! ```

pub mod adapter;
pub mod collector;
pub mod config;
pub mod driver;
pub mod error;
pub mod invoice;
pub mod normalize;
pub mod novelty;
pub mod params;
pub mod registry;
pub mod service;
pub mod session;

// 主要な型をリエクスポート
pub use adapter::{
    ApiAdapter, AuthenticationCheck, LoginOutcome, MaintenanceCheck, ScrapeOutcome,
    SelectorAuthenticationError, SelectorMaintenance, VendorAdapter,
};
pub use collector::Collector;
pub use config::{CollectorConfig, CollectorState, SessionConfig};
pub use driver::{ChromeDriver, Driver};
pub use error::CollectorError;
pub use invoice::{Amount, InvoiceKind, InvoiceRecord};
pub use normalize::{normalize, HttpFetcher, PayloadFetcher};
pub use novelty::filter_new;
pub use params::{Credentials, ParamKind, ParamSpec};
pub use registry::CollectorRegistry;
pub use service::{CollectRequest, CollectorService};
pub use session::{ChromiumProvider, ChromiumSession, Session, SessionProvider};
