//! 机器人配置
//!
//! 配置文件为 JSON 格式，加载一次后除姿态表外不可变
//! （姿态表的可变覆盖层在 `simbot-core` 中实现）。
//!
//! # 结构
//!
//! ```json
//! {
//!   "id": "khr-2hv-01",
//!   "version": "1",
//!   "name": "demo robot",
//!   "motors_type": { "servo-std": { "angle_speed": 60.0 } },
//!   "motors": {
//!     "head_z": {
//!       "id": "m1", "offset": 0.0, "angle_limit": [-90.0, 90.0],
//!       "orientation": "direct", "type": "servo-std"
//!     }
//!   },
//!   "sensors": { "battery": { "id": "s1", "offset": 0.0 } },
//!   "poses": { "standby": { "head_z": 0.0 } },
//!   "enable_twist_controller": true
//! }
//! ```
//!
//! 结构性错误（缺字段、空舵机表、未知舵机类型、非法角度范围等）在加载时
//! 同步返回 [`ConfigError`]，不会产生部分可用的配置。

use crate::error::ConfigError;
use crate::motor::Orientation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// 命名姿态：舵机键 → 相对目标角度
pub type Pose = BTreeMap<String, f64>;

/// 单个舵机的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// 唯一标识符
    pub id: String,
    /// 标定偏移量（度）
    pub offset: f64,
    /// 相对角度空间的运动范围 [min, max]
    pub angle_limit: [f64; 2],
    /// 安装方向
    pub orientation: Orientation,
    /// 舵机类型（速度表查找键）
    #[serde(rename = "type")]
    pub motor_type: String,
}

/// 舵机类型配置（速度表条目）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorTypeConfig {
    /// 角速度（度/秒）
    pub angle_speed: f64,
}

/// 单个传感器的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// 唯一标识符
    pub id: String,
    /// 标定偏移量
    #[serde(default)]
    pub offset: f64,
}

/// 机器人配置（加载后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// 机器人标识符
    pub id: String,
    /// 配置版本
    pub version: String,
    /// 机器人名称
    pub name: String,
    /// 舵机类型速度表
    pub motors_type: BTreeMap<String, MotorTypeConfig>,
    /// 舵机定义
    pub motors: BTreeMap<String, MotorConfig>,
    /// 传感器定义（可选）
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorConfig>,
    /// 初始姿态表（可选，运行期的可变覆盖层在上层维护）
    #[serde(default)]
    pub poses: BTreeMap<String, Pose>,
    /// 是否启用 twist 控制器
    #[serde(default)]
    pub enable_twist_controller: bool,
}

impl RobotConfig {
    /// 从 JSON 字符串加载并校验
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        debug!("loading robot configuration from {}", path.as_ref().display());
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// 结构校验
    ///
    /// serde 已经保证必填字段存在，这里校验语义规则：
    /// - 至少定义一个舵机
    /// - 每个舵机的类型必须在速度表中
    /// - 角度范围 min <= max
    /// - 角速度为正
    /// - 舵机 id 不重复
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.motors.is_empty() {
            return Err(ConfigError::NoMotors);
        }

        for (motor_type, type_config) in &self.motors_type {
            if type_config.angle_speed <= 0.0 {
                return Err(ConfigError::NonPositiveAngleSpeed {
                    motor_type: motor_type.clone(),
                    angle_speed: type_config.angle_speed,
                });
            }
        }

        let mut seen_ids = BTreeSet::new();
        for (key, motor) in &self.motors {
            if !self.motors_type.contains_key(&motor.motor_type) {
                return Err(ConfigError::UnknownMotorType {
                    motor: key.clone(),
                    motor_type: motor.motor_type.clone(),
                });
            }
            let [min, max] = motor.angle_limit;
            if min > max {
                return Err(ConfigError::InvalidAngleLimit {
                    motor: key.clone(),
                    min,
                    max,
                });
            }
            if !seen_ids.insert(motor.id.as_str()) {
                return Err(ConfigError::DuplicateMotorId {
                    id: motor.id.clone(),
                });
            }
        }

        Ok(())
    }

    /// 查询某个舵机类型的角速度（度/秒）
    pub fn angle_speed(&self, motor_type: &str) -> Option<f64> {
        self.motors_type.get(motor_type).map(|t| t.angle_speed)
    }
}
