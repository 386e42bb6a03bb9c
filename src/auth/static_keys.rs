//! 静态 API Key 表

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::common::auth::constant_time_eq;
use crate::model::config::ApiKeyEntry;

use super::{ApiKeyValidation, ApiKeyValidator};

/// 基于配置文件的 API Key 校验器
pub struct StaticKeyValidator {
    entries: Vec<ApiKeyEntry>,
}

impl StaticKeyValidator {
    pub fn new(entries: Vec<ApiKeyEntry>) -> Self {
        Self { entries }
    }

    /// 单个 key 的便捷构造（测试和本地开发用）
    pub fn single(key: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(vec![ApiKeyEntry {
            key: key.into(),
            user_id: user_id.into(),
            metadata: Value::Object(Map::new()),
        }])
    }
}

#[async_trait]
impl ApiKeyValidator for StaticKeyValidator {
    async fn validate(&self, key: &str) -> anyhow::Result<ApiKeyValidation> {
        // 遍历全部条目，不提前返回，避免耗时泄露匹配位置
        let mut matched: Option<&ApiKeyEntry> = None;
        for entry in &self.entries {
            if constant_time_eq(&entry.key, key) && matched.is_none() {
                matched = Some(entry);
            }
        }

        Ok(match matched {
            Some(entry) => ApiKeyValidation::Valid {
                user_id: entry.user_id.clone(),
                metadata: match &entry.metadata {
                    Value::Null => Value::Object(Map::new()),
                    other => other.clone(),
                },
            },
            None => ApiKeyValidation::Invalid { error: None },
        })
    }
}
