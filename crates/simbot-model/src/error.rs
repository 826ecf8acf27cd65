//! 配置层错误类型定义

use thiserror::Error;

/// 配置加载/校验错误
///
/// 这些错误都是致命的：配置不合法时不会构造出部分可用的机器人对象。
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 解析失败（语法错误或缺少必填字段）
    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// 配置中没有定义任何舵机
    #[error("Configuration defines no motors")]
    NoMotors,

    /// 舵机引用了速度表中不存在的类型
    #[error("Motor '{motor}' references unknown motor type '{motor_type}'")]
    UnknownMotorType { motor: String, motor_type: String },

    /// 角度范围非法（min > max）
    #[error("Motor '{motor}' has invalid angle limit [{min}, {max}]")]
    InvalidAngleLimit { motor: String, min: f64, max: f64 },

    /// 速度表中的角速度必须为正
    #[error("Motor type '{motor_type}' has non-positive angle speed {angle_speed}")]
    NonPositiveAngleSpeed { motor_type: String, angle_speed: f64 },

    /// 舵机 id 重复
    #[error("Duplicate motor id '{id}'")]
    DuplicateMotorId { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::UnknownMotorType {
            motor: "head_z".to_string(),
            motor_type: "mx-28".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("head_z") && msg.contains("mx-28"));

        let err = ConfigError::InvalidAngleLimit {
            motor: "head_z".to_string(),
            min: 90.0,
            max: -90.0,
        };
        assert!(format!("{}", err).contains("invalid angle limit"));
    }
}
