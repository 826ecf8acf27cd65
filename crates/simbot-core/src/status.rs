//! 状态快照
//!
//! 广播层周期性序列化的机器人状态视图。角度按连接协商的格式
//! （relative / absolute）导出，数值四舍五入到 0.1 度。

use crate::robot::Robot;
use serde::{Deserialize, Serialize};
use simbot_model::Twist;
use std::time::{SystemTime, UNIX_EPOCH};

/// 角度导出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleFormat {
    /// 相对角度（默认，舵机标定坐标系）
    #[default]
    Relative,
    /// 绝对角度（内部表示）
    Absolute,
}

impl AngleFormat {
    /// 从协议字符串解析（未知字符串返回 None）
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "relative" => Some(Self::Relative),
            "absolute" => Some(Self::Absolute),
            _ => None,
        }
    }

    /// 协议字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Absolute => "absolute",
        }
    }
}

/// 舵机状态条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorStatus {
    pub id: String,
    pub key: String,
    pub goal_angle: f64,
    pub current_angle: f64,
}

/// 传感器状态条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub id: String,
    pub key: String,
    pub value: f64,
}

/// SDK 元信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkInfo {
    pub version: String,
    pub robot_speed: f64,
    pub motors_rate_hz: f64,
    pub ptp_rate_hz: f64,
}

/// 系统元信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Unix 时间戳（毫秒）
    pub timestamp_ms: u64,
}

/// 机器人状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub motors: Vec<MotorStatus>,
    pub sensors: Vec<SensorStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twist: Option<Twist>,
    pub format: AngleFormat,
    pub sdk: SdkInfo,
    pub system: SystemInfo,
}

/// 四舍五入到 0.1
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Robot {
    /// 生成一份状态快照
    ///
    /// 快照不是全局一致的瞬间：各舵机角度独立原子读取，这与周期广播
    /// 的 fire-and-forget 语义一致。
    pub fn status(&self, format: AngleFormat) -> RobotStatus {
        let motors = self
            .motors()
            .iter()
            .map(|m| {
                let (goal, current) = match format {
                    AngleFormat::Relative => (m.goal_angle(), m.current_angle()),
                    AngleFormat::Absolute => (m.abs_goal_angle(), m.abs_current_angle()),
                };
                MotorStatus {
                    id: m.id().to_string(),
                    key: m.key().to_string(),
                    goal_angle: round1(goal),
                    current_angle: round1(current),
                }
            })
            .collect();

        let sensors = self
            .sensors()
            .iter()
            .map(|s| SensorStatus {
                id: s.id().to_string(),
                key: s.key().to_string(),
                value: round1(s.value()),
            })
            .collect();

        RobotStatus {
            motors,
            sensors,
            twist: self.twist(),
            format,
            sdk: SdkInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                robot_speed: self.robot_speed(),
                motors_rate_hz: self.motors_rate_hz(),
                ptp_rate_hz: self.ptp_rate_hz(),
            },
            system: SystemInfo {
                timestamp_ms: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
            },
        }
    }
}
