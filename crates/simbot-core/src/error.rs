//! 运动控制层错误类型定义

use simbot_model::ConfigError;
use thiserror::Error;

/// 运动控制层错误
///
/// 配置类错误是致命的（初始化同步失败）；其余都是可恢复的请求错误，
/// 以返回值形式上报给调用方，不会中断任何周期性循环。
#[derive(Error, Debug)]
pub enum RobotError {
    /// 配置加载/校验错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 初始化参数非法
    #[error("Invalid parameter '{name}': {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// 未知舵机键
    #[error("Motor with key '{key}' not found")]
    MotorNotFound { key: String },

    /// 未知姿态名
    #[error("Pose '{name}' not found")]
    PoseNotFound { name: String },

    /// 录制进行中（回放前必须先 stop_recording）
    #[error("Recording in progress, stop recording first")]
    RecordingInProgress,

    /// twist 控制器未在配置中启用
    #[error("Twist controller not enabled in configuration")]
    TwistDisabled,

    /// 未配置运动文件路径，无法持久化
    #[error("No motion file configured")]
    NoMotionFile,

    /// 运动文件读写失败
    #[error("Motion file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 运动文件序列化/反序列化失败
    #[error("Motion file serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RobotError::MotorNotFound {
            key: "head_z".to_string(),
        };
        assert!(format!("{}", err).contains("head_z"));

        let err = RobotError::RecordingInProgress;
        assert!(format!("{}", err).contains("stop recording"));

        let err = RobotError::InvalidParameter {
            name: "ptp_rate_hz",
            value: -1.0,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ptp_rate_hz") && msg.contains("-1"));
    }
}
