//! ベンダーアダプターの契約
//!
//! 各ベンダーはログイン手順とスクレイピング手順だけを実装する。
//! メンテナンス判定・認証エラー判定は任意で、コレクター構築時に差し込む。

use async_trait::async_trait;

use crate::driver::Driver;
use crate::error::CollectorError;
use crate::invoice::InvoiceRecord;
use crate::params::Credentials;

/// ログイン結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// 画面上のエラー表示などから検出した失敗メッセージ
    Rejected(String),
}

/// スクレイピング結果
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    /// 空リストも正常な結果
    Invoices(Vec<InvoiceRecord>),
    Failed(String),
    /// 結果を確定できなかった（画面構成の変化などが疑われる）
    Unfinished,
}

/// ブラウザで操作するベンダー
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    async fn login(
        &self,
        driver: &dyn Driver,
        credentials: &Credentials,
    ) -> Result<LoginOutcome, CollectorError>;

    async fn run(
        &self,
        driver: &dyn Driver,
        credentials: &Credentials,
    ) -> Result<ScrapeOutcome, CollectorError>;
}

/// API で取得するベンダー（ブラウザセッションを使わない）
#[async_trait]
pub trait ApiAdapter: Send + Sync {
    async fn fetch(&self, credentials: &Credentials) -> Result<ScrapeOutcome, CollectorError>;
}

/// メンテナンス中かどうかの判定
#[async_trait]
pub trait MaintenanceCheck: Send + Sync {
    async fn is_in_maintenance(
        &self,
        driver: &dyn Driver,
        credentials: &Credentials,
    ) -> Result<bool, CollectorError>;
}

/// ログイン後の認証エラー検出。`Some` なら認証失敗
#[async_trait]
pub trait AuthenticationCheck: Send + Sync {
    async fn authentication_error(
        &self,
        driver: &dyn Driver,
        credentials: &Credentials,
    ) -> Result<Option<String>, CollectorError>;
}

/// 指定セレクタの要素が表示されていればメンテナンス中とみなす
#[derive(Debug, Clone)]
pub struct SelectorMaintenance {
    pub selector: String,
    pub timeout: std::time::Duration,
}

#[async_trait]
impl MaintenanceCheck for SelectorMaintenance {
    async fn is_in_maintenance(
        &self,
        driver: &dyn Driver,
        _credentials: &Credentials,
    ) -> Result<bool, CollectorError> {
        driver
            .wait_for_element(&self.selector, false, self.timeout)
            .await
    }
}

/// 指定セレクタの要素テキストを認証エラーメッセージとして返す
#[derive(Debug, Clone)]
pub struct SelectorAuthenticationError {
    pub selector: String,
    pub timeout: std::time::Duration,
}

#[async_trait]
impl AuthenticationCheck for SelectorAuthenticationError {
    async fn authentication_error(
        &self,
        driver: &dyn Driver,
        _credentials: &Credentials,
    ) -> Result<Option<String>, CollectorError> {
        let text = driver
            .element_text(&self.selector, false, self.timeout)
            .await?;
        Ok(text.filter(|t| !t.is_empty()))
    }
}
