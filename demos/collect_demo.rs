//! ブラウザでログインして請求書一覧を取得するデモ
//!
//! cargo run --example collect_demo
//! (COLLECTOR_USERNAME / COLLECTOR_PASSWORD / COLLECTOR_HEADLESS を参照)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use invoice_collector::{
    ChromiumProvider, Collector, CollectorConfig, CollectorError, Credentials, Driver,
    InvoiceRecord, LoginOutcome, ScrapeOutcome, SelectorAuthenticationError, SessionConfig,
    VendorAdapter,
};

const FIELD_USERNAME: &str = "input[name='username']";
const FIELD_PASSWORD: &str = "input[name='password']";
const BUTTON_SUBMIT: &str = "button[type='submit']";
const CONTAINER_LOGIN_ALERT: &str = ".flash.error";
const CONTAINER_INVOICE_LINK: &str = "a.invoice";

/// the-internet.herokuapp.com のログインフォームを使った練習用アダプター
struct DemoAdapter;

#[async_trait]
impl VendorAdapter for DemoAdapter {
    async fn login(
        &self,
        driver: &dyn Driver,
        credentials: &Credentials,
    ) -> Result<LoginOutcome, CollectorError> {
        driver
            .input_text(FIELD_USERNAME, credentials.require("username")?)
            .await?;
        driver
            .input_text(FIELD_PASSWORD, credentials.require("password")?)
            .await?;
        driver.left_click(BUTTON_SUBMIT).await?;

        // ユーザー名/パスワード誤りのバナー
        let alert = driver
            .element_text(CONTAINER_LOGIN_ALERT, false, Duration::from_secs(2))
            .await?;
        Ok(match alert {
            Some(message) => LoginOutcome::Rejected(message),
            None => LoginOutcome::Success,
        })
    }

    async fn run(
        &self,
        driver: &dyn Driver,
        _credentials: &Credentials,
    ) -> Result<ScrapeOutcome, CollectorError> {
        let links = driver
            .get_all_attributes(CONTAINER_INVOICE_LINK, "href", false, Duration::from_secs(5))
            .await?;

        // このサイトに請求書はないため、一覧が取れなければ未完了として診断情報を残す
        if links.is_empty() {
            return Ok(ScrapeOutcome::Unfinished);
        }

        let invoices = links
            .into_iter()
            .map(|link| {
                let id = link.rsplit('/').next().unwrap_or_default().to_string();
                InvoiceRecord::from_link(id, "application/pdf", link)
            })
            .collect();
        Ok(ScrapeOutcome::Invoices(invoices))
    }
}

#[tokio::main]
async fn main() {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter("info,invoice_collector=debug")
        .init();

    let username = std::env::var("COLLECTOR_USERNAME").unwrap_or_else(|_| "tomsmith".into());
    let password =
        std::env::var("COLLECTOR_PASSWORD").unwrap_or_else(|_| "SuperSecretPassword!".into());

    let config = CollectorConfig::new(
        "demo",
        "The Internet",
        "1",
        "https://the-internet.herokuapp.com/login",
    );
    let collector = Collector::scraper(config, Arc::new(DemoAdapter), Arc::new(ChromiumProvider::new()))
        .with_session_config(SessionConfig::from_env())
        .with_authentication_check(Arc::new(SelectorAuthenticationError {
            selector: CONTAINER_LOGIN_ALERT.into(),
            timeout: Duration::from_secs(1),
        }));

    let credentials = Credentials::new()
        .with("username", username)
        .with("password", password);

    println!("=== Invoice Collector Demo ===");

    match collector
        .collect_new(&credentials, false, &HashSet::new())
        .await
    {
        Ok(invoices) => {
            println!("成功! 新規請求書: {}", invoices.len());
            for invoice in &invoices {
                println!("  - {} ({:?})", invoice.id(), invoice.kind());
            }
        }
        Err(CollectorError::UnfinishedCollector { location, screenshot, .. }) => {
            println!(
                "未完了: {} (スクリーンショット {} bytes base64)",
                location,
                screenshot.len()
            );
        }
        Err(e) => {
            eprintln!("エラー: {}", e);
        }
    }
}
