//! 网络层错误类型定义

use thiserror::Error;

/// 网络层错误
///
/// 只有服务器启动（绑定端口）是致命的；连接级错误隔离在各自的
/// 连接循环内部，表现为该连接被拆除。
#[derive(Error, Debug)]
pub enum NetError {
    /// 监听地址绑定失败
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// 其他 I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = NetError::Bind {
            addr: "127.0.0.1:65432".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("127.0.0.1:65432"));
    }
}
