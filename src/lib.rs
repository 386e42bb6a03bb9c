//! Marrakesh 事件上报服务
//!
//! 接收 SDK 上报的工具调用、Prompt 元数据、Prompt 执行、测试运行和测试用例记录，
//! 校验并注入归属用户后转发到 Tinybird。

pub mod api;
pub mod auth;
pub mod common;
pub mod http_client;
pub mod model;
pub mod relay;
pub mod schema;
