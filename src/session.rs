//! ブラウザセッションの取得と解放

use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::driver::{ChromeDriver, Driver};
use crate::error::CollectorError;

/// ブラウザプロセス終了待ちの上限
const BROWSER_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

/// 1回の収集が専有するセッション
#[async_trait]
pub trait Session: Driver {
    fn as_driver(&self) -> &dyn Driver;

    /// リソース解放。2回目以降の呼び出しは何もしない
    async fn close(&mut self) -> Result<(), CollectorError>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, config: &SessionConfig) -> Result<Box<dyn Session>, CollectorError>;
}

/// Chromium を起動してセッションを提供する
#[derive(Debug, Clone, Default)]
pub struct ChromiumProvider;

impl ChromiumProvider {
    pub fn new() -> Self {
        Self
    }
}

fn browser_config(config: &SessionConfig) -> Result<BrowserConfig, CollectorError> {
    let (width, height) = config.viewport;

    let mut builder = BrowserConfig::builder()
        .window_size(width, height)
        .viewport(Viewport {
            width,
            height,
            ..Default::default()
        })
        .request_timeout(config.request_timeout);

    if !config.headless {
        builder = builder.with_head();
    }

    if let Some(path) = &config.chrome_path {
        builder = builder.chrome_executable(path);
    }

    for arg in &config.args {
        builder = builder.arg(arg.as_str());
    }

    builder.build().map_err(CollectorError::BrowserInit)
}

/// プロセス終了待ちの結果から警告メッセージを作る（正常終了なら None）
fn exit_problem(
    exit: Result<std::io::Result<Option<ExitStatus>>, Elapsed>,
) -> Option<String> {
    match exit {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(format!("Failed to wait for browser process: {}", e)),
        Err(e) => Some(format!("Browser process did not exit in time: {}", e)),
    }
}

#[async_trait]
impl SessionProvider for ChromiumProvider {
    async fn acquire(&self, config: &SessionConfig) -> Result<Box<dyn Session>, CollectorError> {
        info!("Launching browser (headless={})", config.headless);

        let (browser, mut handler) = Browser::launch(browser_config(config)?)
            .await
            .map_err(|e| CollectorError::BrowserInit(e.to_string()))?;

        // ハンドラータスクを起動
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut session = ChromiumSession {
                    browser: Some(browser),
                    driver: None,
                    handler_task: Some(handler_task),
                };
                session.shutdown().await;
                return Err(CollectorError::BrowserInit(e.to_string()));
            }
        };

        info!("Browser session ready");
        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            driver: Some(ChromeDriver::new(page, config.element_timeout)),
            handler_task: Some(handler_task),
        }))
    }
}

/// Chromium のブラウザとページ
pub struct ChromiumSession {
    browser: Option<Browser>,
    driver: Option<ChromeDriver>,
    handler_task: Option<JoinHandle<()>>,
}

impl ChromiumSession {
    fn driver(&self) -> Result<&ChromeDriver, CollectorError> {
        self.driver
            .as_ref()
            .ok_or_else(|| CollectorError::BrowserInit("セッションは既に終了しています".into()))
    }

    async fn shutdown(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.page().clone().close().await {
                debug!("Failed to close page: {}", e);
            }
        }

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            let exit = tokio::time::timeout(BROWSER_EXIT_TIMEOUT, browser.wait()).await;
            if let Some(message) = exit_problem(exit) {
                warn!("{}", message);
            }
        }

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Driver for ChromiumSession {
    async fn goto(&self, url: &str) -> Result<(), CollectorError> {
        self.driver()?.goto(url).await
    }

    async fn url(&self) -> Result<String, CollectorError> {
        self.driver()?.url().await
    }

    async fn content(&self) -> Result<String, CollectorError> {
        self.driver()?.content().await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, CollectorError> {
        self.driver()?.screenshot().await
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<bool, CollectorError> {
        self.driver()?
            .wait_for_element(selector, required, timeout)
            .await
    }

    async fn element_text(
        &self,
        selector: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<Option<String>, CollectorError> {
        self.driver()?.element_text(selector, required, timeout).await
    }

    async fn input_text(&self, selector: &str, text: &str) -> Result<(), CollectorError> {
        self.driver()?.input_text(selector, text).await
    }

    async fn left_click(&self, selector: &str) -> Result<(), CollectorError> {
        self.driver()?.left_click(selector).await
    }

    async fn get_all_attributes(
        &self,
        selector: &str,
        attribute: &str,
        required: bool,
        timeout: Duration,
    ) -> Result<Vec<String>, CollectorError> {
        self.driver()?
            .get_all_attributes(selector, attribute, required, timeout)
            .await
    }
}

#[async_trait]
impl Session for ChromiumSession {
    fn as_driver(&self) -> &dyn Driver {
        self
    }

    async fn close(&mut self) -> Result<(), CollectorError> {
        if self.browser.is_none() {
            return Ok(());
        }
        info!("Closing browser session...");
        self.shutdown().await;
        info!("Browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_config_builds() {
        let config = SessionConfig::default().with_chrome_path("/usr/bin/chromium");
        assert!(browser_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_exit_problem_reports_both_layers() {
        assert!(exit_problem(Ok(Ok(None))).is_none());

        let wait_failed = exit_problem(Ok(Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "no child process",
        ))))
        .unwrap();
        assert!(wait_failed.contains("no child process"));

        let elapsed = tokio::time::timeout(
            Duration::from_millis(10),
            std::future::pending::<std::io::Result<Option<ExitStatus>>>(),
        )
        .await;
        let timed_out = exit_problem(elapsed).unwrap();
        assert!(timed_out.contains("did not exit in time"));
    }

    #[tokio::test]
    #[ignore] // Chrome/Chromium が必要: cargo test -- --ignored
    async fn test_chromium_session_lifecycle() {
        let provider = ChromiumProvider::new();
        let mut session = provider
            .acquire(&SessionConfig::from_env())
            .await
            .expect("Failed to launch browser");

        session.goto("https://example.com").await.unwrap();
        assert!(session.url().await.unwrap().contains("example.com"));
        assert!(session.content().await.unwrap().contains("Example Domain"));
        assert!(!session.screenshot().await.unwrap().is_empty());
        assert_eq!(
            session
                .element_text("h1", true, Duration::from_secs(5))
                .await
                .unwrap()
                .as_deref(),
            Some("Example Domain")
        );
        assert!(!session
            .wait_for_element("#missing", false, Duration::from_millis(300))
            .await
            .unwrap());

        session.close().await.unwrap();
        session.close().await.unwrap();
    }
}
