//! 连接层消息处理
//!
//! 两个传输共用的入站消息处理：JSON 解码 → 格式切换控制消息 →
//! 解析链分发。格式切换是每连接状态，在这里就地生效，不进入链。

use crate::parser::ParserChain;
use serde_json::Value;
use simbot_core::AngleFormat;
use tracing::{debug, warn};

/// 从控制消息中提取格式切换请求
///
/// 协议形如 `{"socket": {"format": "absolute"}}`。
fn format_toggle(message: &Value) -> Option<AngleFormat> {
    AngleFormat::from_str(message.get("socket")?.get("format")?.as_str()?)
}

/// 处理一条入站原始消息
///
/// 返回需要写回客户端的回复（JSON 文本）。解码失败只记录日志——
/// 传输错误隔离在本连接内。`peer` 仅用于日志。
pub fn handle_client_message(
    chain: &ParserChain,
    raw: &str,
    format: &mut AngleFormat,
    peer: &str,
) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let message: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("fail to decode message from {}: {}", peer, e);
            return None;
        },
    };

    if let Some(new_format) = format_toggle(&message) {
        debug!("connection {} now uses format: {}", peer, new_format.as_str());
        *format = new_format;
        return None;
    }

    chain.dispatch(&message).map(|response| response.to_string())
}
