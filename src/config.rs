//! 環境変数からの設定読み込み

use crate::domain::policy::{LendingPolicy, MAX_LOAN_PERIOD_DAYS};
use std::path::PathBuf;
use thiserror::Error;

/// 設定の読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// スナップショット（library.json）を置くディレクトリ
    pub data_dir: PathBuf,
    pub port: u16,
    pub policy: LendingPolicy,
}

impl AppConfig {
    /// プロセスの環境変数から読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の参照関数から読み込む（未設定の項目は既定値）
    ///
    /// - `LIBRARY_DATA_DIR` (既定: `data`)
    /// - `PORT` (既定: 3000)
    /// - `LIBRARY_LOAN_PERIOD_DAYS` (1〜3650)
    /// - `LIBRARY_DAILY_FINE_RATE`
    /// - `LIBRARY_MAX_FINE`
    /// - `LIBRARY_BLOCK_BORROW_ON_UNPAID_FINE`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LendingPolicy::default();

        let data_dir = lookup("LIBRARY_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        let port = parse(&lookup, "PORT")?.unwrap_or(3000);

        let loan_period_days: i64 =
            parse(&lookup, "LIBRARY_LOAN_PERIOD_DAYS")?.unwrap_or(defaults.loan_period_days);
        if !(1..=MAX_LOAN_PERIOD_DAYS).contains(&loan_period_days) {
            return Err(ConfigError::InvalidValue {
                key: "LIBRARY_LOAN_PERIOD_DAYS",
                value: loan_period_days.to_string(),
                reason: format!("must be between 1 and {MAX_LOAN_PERIOD_DAYS}"),
            });
        }

        let policy = LendingPolicy {
            loan_period_days,
            daily_fine_rate: parse(&lookup, "LIBRARY_DAILY_FINE_RATE")?
                .unwrap_or(defaults.daily_fine_rate),
            max_fine: parse(&lookup, "LIBRARY_MAX_FINE")?.or(defaults.max_fine),
            block_borrow_on_unpaid_fine: parse(&lookup, "LIBRARY_BLOCK_BORROW_ON_UNPAID_FINE")?
                .unwrap_or(defaults.block_borrow_on_unpaid_fine),
            ..defaults
        };

        Ok(Self {
            data_dir,
            port,
            policy,
        })
    }

    /// スナップショットファイルのパス
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("library.json")
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
