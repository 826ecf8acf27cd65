//! 执行器数据模型层
//!
//! 本 crate 提供 Simbot 机器人的纯数据层，包括：
//! - 舵机模型（[`Motor`]）：角度空间转换与目标角度限幅
//! - 传感器模型（[`Sensor`]）：带偏移量的只读值模型
//! - Twist 模型（[`Twist`]）：ROS 风格的线速度/角速度向量
//! - 机器人配置（[`RobotConfig`]）：JSON 配置加载与结构校验
//!
//! 本层不包含任何线程或网络逻辑。角度字段使用原子 f64（bit-cast 到
//! `AtomicU64`）存储，保证并发写入遵循 last-writer-wins 且不会出现撕裂读。
//!
//! # 使用场景
//!
//! 大多数用户应该使用 `simbot-core` 提供的 `Robot` 接口，本 crate 适用于
//! 需要直接操作单个舵机或自行加载配置的场景。

mod atomic;
mod config;
mod error;
mod motor;
mod sensor;
mod twist;

pub use atomic::AtomicF64;
pub use config::{MotorConfig, MotorTypeConfig, Pose, RobotConfig, SensorConfig};
pub use error::ConfigError;
pub use motor::{Motor, Orientation};
pub use sensor::Sensor;
pub use twist::{Twist, TwistVector};
