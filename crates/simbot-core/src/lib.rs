//! 运动控制层
//!
//! 本 crate 提供 Simbot 机器人的有状态核心，包括：
//! - [`Robot`]：舵机/传感器/姿态表/twist 的共享状态容器
//! - [`MotionEngine`]：后台收敛循环，以限速步进把当前角度拉向目标角度
//! - 点到点控制器：多舵机同步轨迹、命名姿态、会话录制与回放
//! - 状态快照（[`RobotStatus`]）：广播层按客户端协商的角度格式序列化
//!
//! # 并发模型
//!
//! `Robot` 被 `Arc` 共享给引擎线程、点到点执行线程和广播层。舵机角度
//! 与全局速度倍率是原子 f64（last-writer-wins，无撕裂读）；姿态表和
//! 录制状态使用 `parking_lot` 锁；twist 使用 `ArcSwap` 整体替换。
//! 没有跨任务的顺序保证：相互冲突的点到点指令需要调用方自行串行化
//! （例如使用 blocking 调用）。
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use simbot_core::{MotionEngine, Robot, RobotParams};
//! use simbot_model::RobotConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RobotConfig::from_file("robot.json")?;
//! let robot = Robot::from_config(config, RobotParams::default())?;
//! let _engine = MotionEngine::start(robot.clone());
//!
//! let mut goals = std::collections::BTreeMap::new();
//! goals.insert("head_z".to_string(), 45.0);
//! robot.move_point_to_point(&goals, 2.0, true);
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod motion;
mod recording;
mod robot;
mod status;

#[cfg(test)]
mod test_support;

pub use engine::{MotionEngine, SLEEP_TICK_FRACTION};
pub use error::RobotError;
pub use motion::step_count;
pub use recording::{MotionConfig, PointToPointSession, SessionEntry};
pub use robot::{MIN_ROBOT_SPEED, Robot, RobotParams};
pub use status::{AngleFormat, MotorStatus, RobotStatus, SdkInfo, SensorStatus, SystemInfo};
