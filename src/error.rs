use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("必須フィールドがありません: {0}")]
    MissingField(String),

    #[error("メンテナンス中: {vendor} (v{version})")]
    InMaintenance { vendor: String, version: String },

    #[error("認証エラー: {message} ({vendor} v{version})")]
    NotAuthenticated {
        message: String,
        vendor: String,
        version: String,
    },

    /// 結果もエラーも返さなかった収集。診断用にページのスナップショットを保持する
    #[error("収集が完了しませんでした: {vendor} (v{version}) at {location}")]
    UnfinishedCollector {
        vendor: String,
        version: String,
        location: String,
        /// レンダリング済みHTML (base64)
        content: String,
        /// スクリーンショットPNG (base64)
        screenshot: String,
    },

    #[error("スクレイピングエラー: {message} ({vendor} v{version})")]
    Scrape {
        message: String,
        vendor: String,
        version: String,
    },

    #[error("ダウンロードエラー: {0}")]
    Fetch(String),

    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("ページ取得エラー: {0}")]
    Capture(String),

    #[error("JavaScriptエラー: {0}")]
    JavaScript(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("未実装: {vendor} は {capability} を実装していません")]
    Unimplemented { vendor: String, capability: String },

    #[error("コレクターIDが重複しています: {0}")]
    DuplicateCollector(String),

    #[error("不正な請求書レコード: {0}")]
    InvalidRecord(String),
}

impl CollectorError {
    /// 時間をおいて再実行すれば成功しうるエラーか
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::InMaintenance { .. }
                | CollectorError::Fetch(_)
                | CollectorError::Timeout(_)
        )
    }
}
