//! Robot 状态容器
//!
//! `Robot` 持有从配置构造出的全部共享状态，并暴露查询/修改接口。
//! 实例始终以 `Arc<Robot>` 形式共享：引擎线程、点到点执行线程和
//! 广播层各自持有一个引用。

use crate::error::RobotError;
use crate::motion::RecordingState;
use crate::recording::MotionConfig;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use simbot_model::{
    AtomicF64, Motor, Pose, RobotConfig, Sensor, Twist, TwistVector,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 全局速度倍率下限
///
/// 过小的倍率会让所有周期循环近乎停摆，设置时钳制到该值。
pub const MIN_ROBOT_SPEED: f64 = 0.05;

/// Robot 初始化参数
#[derive(Debug, Clone)]
pub struct RobotParams {
    /// 全局速度倍率（>0，越小越慢）
    pub robot_speed: f64,
    /// MotionEngine 收敛频率（Hz）。<= 0 时不启动引擎，舵机进入 instant 模式
    pub motors_rate_hz: f64,
    /// 点到点轨迹步进频率（Hz）
    pub ptp_rate_hz: f64,
    /// 运动文件路径（姿态表持久化；None 表示不持久化）
    pub motion_file: Option<PathBuf>,
}

impl Default for RobotParams {
    fn default() -> Self {
        Self {
            robot_speed: 1.0,
            motors_rate_hz: 50.0,
            ptp_rate_hz: 10.0,
            motion_file: None,
        }
    }
}

/// 机器人共享状态
///
/// 配置加载后不可变，姿态表是唯一的可变覆盖层。角度与速度倍率的并发
/// 语义见 crate 文档。
pub struct Robot {
    config: RobotConfig,
    /// 舵机（配置顺序）
    motors: Vec<Arc<Motor>>,
    motors_by_key: HashMap<String, Arc<Motor>>,
    /// 传感器（配置顺序）
    sensors: Vec<Arc<Sensor>>,
    sensors_by_key: HashMap<String, Arc<Sensor>>,
    /// twist 槽位（配置未启用时为 None）
    twist: Option<ArcSwap<Twist>>,
    /// 姿态表（配置姿态 + 运动文件覆盖 + 运行期修改）
    poses: RwLock<BTreeMap<String, Pose>>,
    /// 全局速度倍率（每个循环每 tick 原子读取）
    robot_speed: AtomicF64,
    motors_rate_hz: f64,
    ptp_rate_hz: f64,
    motion_file: Option<PathBuf>,
    /// 录制状态（None = 未在录制）
    pub(crate) recording: Mutex<Option<RecordingState>>,
}

impl Robot {
    /// 从已加载的配置构造机器人
    ///
    /// 配置会再次校验；参数非法或配置结构非法时同步返回错误，
    /// 不会产生部分可用的实例。若配置了运动文件且文件存在，
    /// 其中的姿态表会覆盖配置中的同名姿态。
    pub fn from_config(config: RobotConfig, params: RobotParams) -> Result<Arc<Self>, RobotError> {
        config.validate()?;
        if params.robot_speed <= 0.0 {
            return Err(RobotError::InvalidParameter {
                name: "robot_speed",
                value: params.robot_speed,
            });
        }
        if params.ptp_rate_hz <= 0.0 {
            return Err(RobotError::InvalidParameter {
                name: "ptp_rate_hz",
                value: params.ptp_rate_hz,
            });
        }

        info!(
            "robot '{}' ({}) initializing, sdk version {}",
            config.name,
            config.id,
            env!("CARGO_PKG_VERSION")
        );

        // 引擎停用时所有舵机进入 instant 模式
        let instant_mode = params.motors_rate_hz <= 0.0;
        if instant_mode {
            debug!("motion engine disabled, motors operate in instant mode");
        }

        let mut motors = Vec::with_capacity(config.motors.len());
        let mut motors_by_key = HashMap::with_capacity(config.motors.len());
        for (key, motor_config) in &config.motors {
            let motor = Arc::new(Motor::from_config(key, motor_config, instant_mode));
            motors_by_key.insert(key.clone(), motor.clone());
            motors.push(motor);
        }
        debug!("motors initialized: {}", motors.len());

        let mut sensors = Vec::with_capacity(config.sensors.len());
        let mut sensors_by_key = HashMap::with_capacity(config.sensors.len());
        for (key, sensor_config) in &config.sensors {
            let sensor = Arc::new(Sensor::from_config(key, sensor_config));
            sensors_by_key.insert(key.clone(), sensor.clone());
            sensors.push(sensor);
        }
        if !sensors.is_empty() {
            debug!("sensors initialized: {}", sensors.len());
        }

        let twist = config
            .enable_twist_controller
            .then(|| ArcSwap::from_pointee(Twist::default()));

        let mut poses = config.poses.clone();
        if let Some(path) = &params.motion_file
            && path.exists()
        {
            match MotionConfig::load(path) {
                Ok(motion) => {
                    info!(
                        "loaded motion file {} ({} poses)",
                        path.display(),
                        motion.poses.len()
                    );
                    poses.extend(motion.poses);
                },
                Err(e) => warn!("failed to load motion file {}: {}", path.display(), e),
            }
        }

        Ok(Arc::new(Self {
            config,
            motors,
            motors_by_key,
            sensors,
            sensors_by_key,
            twist,
            poses: RwLock::new(poses),
            robot_speed: AtomicF64::new(params.robot_speed),
            motors_rate_hz: params.motors_rate_hz,
            ptp_rate_hz: params.ptp_rate_hz,
            motion_file: params.motion_file,
            recording: Mutex::new(None),
        }))
    }

    /// 加载后的机器人配置
    pub fn configuration(&self) -> &RobotConfig {
        &self.config
    }

    /// 全部舵机（配置顺序）
    pub fn motors(&self) -> &[Arc<Motor>] {
        &self.motors
    }

    /// 全部传感器（配置顺序）
    pub fn sensors(&self) -> &[Arc<Sensor>] {
        &self.sensors
    }

    /// 按键查找舵机
    pub fn get_motor(&self, key: &str) -> Option<Arc<Motor>> {
        self.motors_by_key.get(key).cloned()
    }

    /// 按唯一标识符查找舵机
    pub fn get_motor_by_id(&self, id: &str) -> Option<Arc<Motor>> {
        self.motors.iter().find(|m| m.id() == id).cloned()
    }

    /// 按键查找传感器
    pub fn get_sensor(&self, key: &str) -> Option<Arc<Sensor>> {
        self.sensors_by_key.get(key).cloned()
    }

    /// 按唯一标识符查找传感器
    pub fn get_sensor_by_id(&self, id: &str) -> Option<Arc<Sensor>> {
        self.sensors.iter().find(|s| s.id() == id).cloned()
    }

    /// 设置单个舵机的目标角度（相对空间），返回限幅后实际生效的角度
    pub fn set_goal_angle(&self, key: &str, angle: f64) -> Result<f64, RobotError> {
        let motor = self.get_motor(key).ok_or_else(|| RobotError::MotorNotFound {
            key: key.to_string(),
        })?;
        Ok(motor.set_goal_angle(angle))
    }

    /// 当前速度倍率
    pub fn robot_speed(&self) -> f64 {
        self.robot_speed.load()
    }

    /// 设置速度倍率（钳制到 [`MIN_ROBOT_SPEED`]），返回实际生效值
    ///
    /// 所有周期循环在下一个 tick 读取到新值。
    pub fn set_robot_speed(&self, speed: f64) -> f64 {
        let applied = speed.max(MIN_ROBOT_SPEED);
        if applied != speed {
            warn!("robot_speed {} clamped to {}", speed, applied);
        }
        self.robot_speed.store(applied);
        debug!("robot_speed set to {}", applied);
        applied
    }

    /// MotionEngine 收敛频率（Hz）
    pub fn motors_rate_hz(&self) -> f64 {
        self.motors_rate_hz
    }

    /// 点到点步进频率（Hz）
    pub fn ptp_rate_hz(&self) -> f64 {
        self.ptp_rate_hz
    }

    /// 舵机是否处于 instant 模式（引擎停用）
    pub fn instant_mode(&self) -> bool {
        self.motors_rate_hz <= 0.0
    }

    /// 查询舵机类型的角速度（度/秒）
    pub fn angle_speed(&self, motor_type: &str) -> Option<f64> {
        self.config.angle_speed(motor_type)
    }

    /// 当前 twist（未启用时为 None）
    pub fn twist(&self) -> Option<Twist> {
        self.twist.as_ref().map(|t| **t.load())
    }

    /// 整体替换 twist
    pub fn set_twist(&self, linear: TwistVector, angular: TwistVector) -> Result<(), RobotError> {
        let slot = self.twist.as_ref().ok_or(RobotError::TwistDisabled)?;
        let twist = Twist::new(linear, angular);
        debug!("set_twist: {}", twist);
        slot.store(Arc::new(twist));
        Ok(())
    }

    /// 姿态表快照
    pub fn poses(&self) -> BTreeMap<String, Pose> {
        self.poses.read().clone()
    }

    /// 按名称查找姿态
    pub fn get_pose(&self, name: &str) -> Option<Pose> {
        self.poses.read().get(name).cloned()
    }

    pub(crate) fn poses_lock(&self) -> &RwLock<BTreeMap<String, Pose>> {
        &self.poses
    }

    pub(crate) fn motion_file(&self) -> Option<&PathBuf> {
        self.motion_file.as_ref()
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("id", &self.config.id)
            .field("motors", &self.motors.len())
            .field("sensors", &self.sensors.len())
            .field("robot_speed", &self.robot_speed.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_robot;

    #[test]
    fn test_from_config_rejects_bad_params() {
        let config = crate::test_support::sample_config();
        assert!(matches!(
            Robot::from_config(
                config.clone(),
                RobotParams {
                    robot_speed: 0.0,
                    ..RobotParams::default()
                }
            ),
            Err(RobotError::InvalidParameter { name: "robot_speed", .. })
        ));
        assert!(matches!(
            Robot::from_config(
                config,
                RobotParams {
                    ptp_rate_hz: -1.0,
                    ..RobotParams::default()
                }
            ),
            Err(RobotError::InvalidParameter { name: "ptp_rate_hz", .. })
        ));
    }

    #[test]
    fn test_motor_lookup() {
        let robot = sample_robot(RobotParams::default());
        assert!(robot.get_motor("head_z").is_some());
        assert!(robot.get_motor("missing").is_none());
        assert_eq!(robot.get_motor_by_id("m1").unwrap().key(), "head_z");
        assert!(robot.get_motor_by_id("missing").is_none());
    }

    #[test]
    fn test_sensor_lookup() {
        let robot = sample_robot(RobotParams::default());
        assert!(robot.get_sensor("battery").is_some());
        assert_eq!(robot.get_sensor_by_id("s1").unwrap().key(), "battery");
        assert!(robot.get_sensor("missing").is_none());
    }

    #[test]
    fn test_set_goal_angle_by_key() {
        let robot = sample_robot(RobotParams::default());
        let applied = robot.set_goal_angle("head_z", 200.0).unwrap();
        assert_eq!(applied, 90.0); // 限幅到 [−90, 90]
        assert!(matches!(
            robot.set_goal_angle("missing", 0.0),
            Err(RobotError::MotorNotFound { .. })
        ));
    }

    #[test]
    fn test_robot_speed_clamped() {
        let robot = sample_robot(RobotParams::default());
        assert_eq!(robot.set_robot_speed(2.0), 2.0);
        assert_eq!(robot.robot_speed(), 2.0);
        // 低于下限被钳制
        assert_eq!(robot.set_robot_speed(0.001), MIN_ROBOT_SPEED);
        assert_eq!(robot.robot_speed(), MIN_ROBOT_SPEED);
    }

    #[test]
    fn test_twist_enabled() {
        let robot = sample_robot(RobotParams::default());
        assert_eq!(robot.twist(), Some(Twist::default()));

        robot
            .set_twist(TwistVector::new(0.1, 0.0, 0.0), TwistVector::new(0.0, 0.0, 0.5))
            .unwrap();
        let twist = robot.twist().unwrap();
        assert_eq!(twist.linear.x, 0.1);
        assert_eq!(twist.angular.z, 0.5);
    }

    #[test]
    fn test_twist_disabled() {
        let mut config = crate::test_support::sample_config();
        config.enable_twist_controller = false;
        let robot = Robot::from_config(config, RobotParams::default()).unwrap();
        assert_eq!(robot.twist(), None);
        assert!(matches!(
            robot.set_twist(TwistVector::default(), TwistVector::default()),
            Err(RobotError::TwistDisabled)
        ));
    }

    #[test]
    fn test_instant_mode_when_engine_disabled() {
        let robot = sample_robot(RobotParams {
            motors_rate_hz: 0.0,
            ..RobotParams::default()
        });
        assert!(robot.instant_mode());
        let motor = robot.get_motor("head_z").unwrap();
        motor.set_goal_angle(30.0);
        assert!((motor.current_angle() - 30.0).abs() < 1e-9);
    }
}
