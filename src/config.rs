use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::params::{ParamKind, ParamSpec};

/// コレクターの公開状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorState {
    Development,
    Active,
}

/// ベンダー（コレクター）のメタデータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub website: String,
    pub logo: String,
    pub params: Vec<ParamSpec>,
    pub entry_url: String,
    pub state: CollectorState,
}

impl CollectorConfig {
    /// username/password を必須とする設定を作成
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        entry_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: version.into(),
            website: String::new(),
            logo: String::new(),
            params: vec![
                ParamSpec::new("username", ParamKind::String)
                    .with_name("i18n.collectors.all.identifier"),
                ParamSpec::new("password", ParamKind::Password)
                    .with_name("i18n.collectors.all.password"),
            ],
            entry_url: entry_url.into(),
            state: CollectorState::Active,
        }
    }

    pub fn with_params(mut self, params: Vec<ParamSpec>) -> Self {
        self.params = params;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = website.into();
        self
    }

    pub fn with_logo(mut self, logo: impl Into<String>) -> Self {
        self.logo = logo.into();
        self
    }

    pub fn with_state(mut self, state: CollectorState) -> Self {
        self.state = state;
        self
    }
}

/// ブラウザセッションの起動設定
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub viewport: (u32, u32),
    pub args: Vec<String>,
    /// 未指定なら chromiumoxide の自動検出に任せる
    pub chrome_path: Option<String>,
    /// CDPリクエストのタイムアウト
    pub request_timeout: Duration,
    /// 要素待機のデフォルトタイムアウト
    pub element_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: (1920, 1080),
            args: vec!["--start-maximized".to_string(), "--no-sandbox".to_string()],
            chrome_path: None,
            request_timeout: Duration::from_secs(60),
            element_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// 環境変数 (CHROME_PATH / CHROMIUM_PATH / COLLECTOR_HEADLESS) から設定を読み込む
    pub fn from_env() -> Self {
        let chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .ok();
        let headless = std::env::var("COLLECTOR_HEADLESS")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        Self {
            chrome_path,
            headless,
            ..Default::default()
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false")
}
