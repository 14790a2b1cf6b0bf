//! ベンダーが宣言する入力パラメータと認証情報

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Email,
    Password,
}

/// 入力パラメータの宣言
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub key: String,
    pub kind: ParamKind,
    /// 表示名 (i18nキー)
    pub name: String,
    pub placeholder: String,
    pub mandatory: bool,
}

impl ParamSpec {
    pub fn new(key: impl Into<String>, kind: ParamKind) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            placeholder: String::new(),
            key,
            kind,
            mandatory: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }
}

/// 呼び出し側から渡される認証情報（パラメータ名 → 値）
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// 空文字は未指定として扱う
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, CollectorError> {
        self.get(key)
            .ok_or_else(|| CollectorError::MissingField(key.to_string()))
    }
}

impl std::fmt::Debug for Credentials {
    // パスワード等を出力しない
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();
        f.debug_struct("Credentials").field("keys", &keys).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// 必須パラメータが揃っているか確認する（宣言順で最初に欠けたものを返す）
pub fn validate(specs: &[ParamSpec], credentials: &Credentials) -> Result<(), CollectorError> {
    for spec in specs.iter().filter(|s| s.mandatory) {
        credentials.require(&spec.key)?;
    }
    Ok(())
}
