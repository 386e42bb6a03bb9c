//! API Key 提取与比较工具

use axum::{body::Body, http::Request};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// API Key 请求头名称
pub const API_KEY_HEADER: &str = "x-api-key";

/// 从请求中提取 API Key
///
/// 只接受 `x-api-key` header，空白值视为缺失
pub fn extract_api_key(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 常量时间字符串比较
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// API Key 指纹（SHA-256 前 12 位十六进制），仅用于日志
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..12].to_string()
}
