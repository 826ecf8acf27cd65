//! 单元测试共享夹具

use crate::robot::{Robot, RobotParams};
use simbot_model::RobotConfig;
use std::sync::Arc;

/// 两个舵机 + 一个传感器 + 一个姿态 + twist 的标准测试配置
pub fn sample_config() -> RobotConfig {
    RobotConfig::from_json_str(
        r#"{
            "id": "test-bot",
            "version": "1",
            "name": "test robot",
            "motors_type": {
                "servo-std": { "angle_speed": 60.0 }
            },
            "motors": {
                "head_z": {
                    "id": "m1", "offset": 0.0, "angle_limit": [-90.0, 90.0],
                    "orientation": "direct", "type": "servo-std"
                },
                "l_shoulder_x": {
                    "id": "m2", "offset": 10.0, "angle_limit": [-120.0, 120.0],
                    "orientation": "indirect", "type": "servo-std"
                }
            },
            "sensors": {
                "battery": { "id": "s1", "offset": 0.0 }
            },
            "poses": {
                "standby": { "head_z": 0.0, "l_shoulder_x": 0.0 }
            },
            "enable_twist_controller": true
        }"#,
    )
    .expect("sample config must be valid")
}

/// 从标准配置构造机器人
pub fn sample_robot(params: RobotParams) -> Arc<Robot> {
    Robot::from_config(sample_config(), params).expect("sample robot must build")
}
