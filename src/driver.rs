//! ドライバー: アダプターが使うブラウザ操作の窓口
//!
//! オーケストレーターはこのトレイトにのみ依存し、chromiumoxide の詳細は
//! [`ChromeDriver`] に閉じ込める。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use tokio::time::sleep;
use tracing::debug;

use crate::error::CollectorError;

/// 要素待機のポーリング間隔（ミリ秒）
const ELEMENT_POLL_INTERVAL_MS: u64 = 100;

#[async_trait]
pub trait Driver: Send + Sync {
    /// URLへ移動
    async fn goto(&self, url: &str) -> Result<(), CollectorError>;

    /// 現在のURL
    async fn url(&self) -> Result<String, CollectorError>;

    /// レンダリング済みHTML
    async fn content(&self) -> Result<String, CollectorError>;

    /// ページ全体のスクリーンショット (PNG)
    async fn screenshot(&self) -> Result<Vec<u8>, CollectorError>;

    /// 要素の出現を待つ。`required` が false ならタイムアウトは `Ok(false)`
    async fn wait_for_element(
        &self,
        selector: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<bool, CollectorError>;

    /// 要素のテキスト。`required` が false なら見つからない場合 `Ok(None)`
    async fn element_text(
        &self,
        selector: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<Option<String>, CollectorError>;

    /// テキスト入力
    async fn input_text(&self, selector: &str, text: &str) -> Result<(), CollectorError>;

    /// 左クリック
    async fn left_click(&self, selector: &str) -> Result<(), CollectorError>;

    /// 一致する全要素から属性（またはプロパティ）を取得
    async fn get_all_attributes(
        &self,
        selector: &str,
        attribute: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<Vec<String>, CollectorError>;
}

/// chromiumoxide の Page を使ったドライバー
#[derive(Clone)]
pub struct ChromeDriver {
    page: Page,
    element_timeout: Duration,
}

impl ChromeDriver {
    pub fn new(page: Page, element_timeout: Duration) -> Self {
        Self {
            page,
            element_timeout,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// タイムアウトまで要素を探し続ける
    async fn poll_element(&self, selector: &str, timeout: Duration) -> Option<Element> {
        let start = Instant::now();
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Some(element),
                Err(e) => debug!("Element {} not yet present: {}", selector, e),
            }
            if start.elapsed() >= timeout {
                return None;
            }
            sleep(Duration::from_millis(ELEMENT_POLL_INTERVAL_MS)).await;
        }
    }

    async fn required_element(&self, selector: &str) -> Result<Element, CollectorError> {
        self.poll_element(selector, self.element_timeout)
            .await
            .ok_or_else(|| CollectorError::ElementNotFound(selector.to_string()))
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn goto(&self, url: &str) -> Result<(), CollectorError> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| CollectorError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn url(&self) -> Result<String, CollectorError> {
        self.page
            .url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| CollectorError::Navigation(e.to_string()))
    }

    async fn content(&self) -> Result<String, CollectorError> {
        self.page
            .content()
            .await
            .map_err(|e| capture_error("HTML", e))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, CollectorError> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| capture_error("スクリーンショット", e))
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<bool, CollectorError> {
        match self.poll_element(selector, timeout).await {
            Some(_) => Ok(true),
            None if required => Err(CollectorError::ElementNotFound(selector.to_string())),
            None => Ok(false),
        }
    }

    async fn element_text(
        &self,
        selector: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<Option<String>, CollectorError> {
        let Some(element) = self.poll_element(selector, timeout).await else {
            if required {
                return Err(CollectorError::ElementNotFound(selector.to_string()));
            }
            return Ok(None);
        };

        let text = element
            .inner_text()
            .await
            .map_err(|e| CollectorError::JavaScript(format!("{}: {}", selector, e)))?;
        Ok(Some(text.unwrap_or_default().trim().to_string()))
    }

    async fn input_text(&self, selector: &str, text: &str) -> Result<(), CollectorError> {
        let element = self.required_element(selector).await?;
        element
            .click()
            .await
            .map_err(|e| CollectorError::Navigation(format!("{}: {}", selector, e)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| CollectorError::JavaScript(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    async fn left_click(&self, selector: &str) -> Result<(), CollectorError> {
        self.required_element(selector)
            .await?
            .click()
            .await
            .map_err(|e| CollectorError::Navigation(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    async fn get_all_attributes(
        &self,
        selector: &str,
        attribute: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<Vec<String>, CollectorError> {
        if !self.wait_for_element(selector, required, timeout).await? {
            return Ok(Vec::new());
        }

        let script = attributes_script(selector, attribute);
        let values = self
            .page
            .evaluate(script.as_str())
            .await
            .map_err(|e| CollectorError::JavaScript(e.to_string()))?
            .into_value::<Vec<String>>()
            .map_err(|e| CollectorError::JavaScript(e.to_string()))?;

        debug!("{} values for {}[{}]", values.len(), selector, attribute);
        Ok(values)
    }
}

/// 起動済みブラウザからのHTML・スクリーンショット取得失敗
fn capture_error(what: &str, e: impl std::fmt::Display) -> CollectorError {
    CollectorError::Capture(format!("{}: {}", what, e))
}

/// セレクタと属性名は JSON 文字列として埋め込む
fn attributes_script(selector: &str, attribute: &str) -> String {
    let selector = serde_json::Value::from(selector).to_string();
    let attribute = serde_json::Value::from(attribute).to_string();
    format!(
        r#"
        (function() {{
            var attr = {attribute};
            return Array.from(document.querySelectorAll({selector})).map(function(e) {{
                var v = (attr in e) ? e[attr] : e.getAttribute(attr);
                return v == null ? "" : String(v).trim();
            }});
        }})()
        "#
    )
}
