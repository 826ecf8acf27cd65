//! 舵机模型
//!
//! 每个舵机有两套角度空间：
//! - **相对角度**：对外暴露的角度，位于舵机自身的标定坐标系
//!   （已应用 offset 和 orientation 变换），目标角度限幅也在这个空间进行。
//! - **绝对角度**：内部表示，MotionEngine 在这个空间做收敛插值。
//!
//! 转换关系（两个方向互为精确逆运算）：
//!
//! ```text
//! relative = if indirect { -(abs - offset) } else { abs - offset }
//! absolute = if indirect { offset - rel }   else { rel + offset }
//! ```
//!
//! 角度字段是原子 f64：目标角度可能同时被 API 调用和点到点执行线程写入，
//! 当前角度只由 MotionEngine 写入（instant 模式除外）。并发写入遵循
//! last-writer-wins，调用方需要自行串行化有冲突的指令。

use crate::atomic::AtomicF64;
use crate::config::MotorConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 舵机安装方向
///
/// `Indirect` 表示舵机反向安装，相对角度与绝对角度符号相反。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// 正向安装
    Direct,
    /// 反向安装
    Indirect,
}

/// 舵机
///
/// 由机器人初始化时从配置创建。目标角度通过 [`set_goal_angle`](Motor::set_goal_angle)
/// 修改；当前角度只由 MotionEngine 以限速步进逼近目标（instant 模式下
/// 目标写入立即同步到当前角度）。
#[derive(Debug)]
pub struct Motor {
    /// 唯一标识符
    id: String,
    /// 人类可读的键（同一动作在不同机器人上可以共用同一个键）
    key: String,
    /// 标定偏移量（度）
    offset: f64,
    /// 安装方向
    orientation: Orientation,
    /// 相对角度空间的运动范围 [min, max]
    angle_limit: [f64; 2],
    /// 舵机类型（速度表的查找键）
    motor_type: String,
    /// instant 模式：目标写入立即同步到当前角度（引擎停用时使用）
    instant_mode: bool,
    /// 目标角度（绝对空间）
    abs_goal_angle: AtomicF64,
    /// 当前角度（绝对空间，模拟的物理位置）
    abs_current_angle: AtomicF64,
}

impl Motor {
    /// 从配置创建舵机
    ///
    /// 初始目标角度为相对空间的 0 度（经限幅后生效），当前角度从绝对 0 开始，
    /// 由引擎逐步收敛到初始目标。
    pub fn from_config(key: &str, config: &MotorConfig, instant_mode: bool) -> Self {
        let motor = Self {
            id: config.id.clone(),
            key: key.to_string(),
            offset: config.offset,
            orientation: config.orientation,
            angle_limit: config.angle_limit,
            motor_type: config.motor_type.clone(),
            instant_mode,
            abs_goal_angle: AtomicF64::new(0.0),
            abs_current_angle: AtomicF64::new(0.0),
        };
        debug!("{}: motor initialized", motor.key);
        motor.set_goal_angle(0.0);
        motor
    }

    /// 唯一标识符
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 人类可读的键
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 舵机类型（速度表查找键）
    pub fn motor_type(&self) -> &str {
        &self.motor_type
    }

    /// 相对角度空间的运动范围
    pub fn angle_limit(&self) -> [f64; 2] {
        self.angle_limit
    }

    /// 是否处于 instant 模式
    pub fn instant_mode(&self) -> bool {
        self.instant_mode
    }

    /// 绝对角度 → 相对角度
    #[inline]
    pub fn to_relative(&self, abs: f64) -> f64 {
        match self.orientation {
            Orientation::Indirect => -(abs - self.offset),
            Orientation::Direct => abs - self.offset,
        }
    }

    /// 相对角度 → 绝对角度（[`to_relative`](Motor::to_relative) 的精确逆运算）
    #[inline]
    pub fn to_absolute(&self, rel: f64) -> f64 {
        match self.orientation {
            Orientation::Indirect => self.offset - rel,
            Orientation::Direct => rel + self.offset,
        }
    }

    /// 设置目标角度（相对空间）
    ///
    /// 超出 `angle_limit` 的角度被钳制到边界并记录警告。返回实际生效的
    /// 相对角度。instant 模式下当前角度同步更新。
    pub fn set_goal_angle(&self, angle: f64) -> f64 {
        let [min, max] = self.angle_limit;
        let applied = if angle < min {
            warn!("{}: set_goal_angle: {:.2} clamped to {:.2}", self.key, angle, min);
            min
        } else if angle > max {
            warn!("{}: set_goal_angle: {:.2} clamped to {:.2}", self.key, angle, max);
            max
        } else {
            angle
        };

        let abs = self.to_absolute(applied);
        self.abs_goal_angle.store(abs);
        if self.instant_mode {
            self.abs_current_angle.store(abs);
        }
        applied
    }

    /// 目标角度（相对空间）
    pub fn goal_angle(&self) -> f64 {
        self.to_relative(self.abs_goal_angle.load())
    }

    /// 当前角度（相对空间）
    pub fn current_angle(&self) -> f64 {
        self.to_relative(self.abs_current_angle.load())
    }

    /// 目标角度（绝对空间）
    pub fn abs_goal_angle(&self) -> f64 {
        self.abs_goal_angle.load()
    }

    /// 当前角度（绝对空间）
    pub fn abs_current_angle(&self) -> f64 {
        self.abs_current_angle.load()
    }

    /// 写入当前角度（绝对空间）
    ///
    /// 只应由 MotionEngine 的收敛循环调用。
    pub fn set_abs_current_angle(&self, abs: f64) {
        self.abs_current_angle.store(abs);
    }
}

impl std::fmt::Display for Motor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{} goal: {:.2} current: {:.2}>",
            self.key,
            self.goal_angle(),
            self.current_angle()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor(offset: f64, orientation: Orientation, limit: [f64; 2]) -> Motor {
        let config = MotorConfig {
            id: "m-1".to_string(),
            offset,
            angle_limit: limit,
            orientation,
            motor_type: "default".to_string(),
        };
        Motor::from_config("test_motor", &config, false)
    }

    #[test]
    fn test_conversion_inverse_direct() {
        let m = motor(12.5, Orientation::Direct, [-90.0, 90.0]);
        for rel in [-90.0, -33.3, 0.0, 45.0, 90.0] {
            let abs = m.to_absolute(rel);
            assert!((m.to_relative(abs) - rel).abs() < 1e-12);
        }
    }

    #[test]
    fn test_conversion_inverse_indirect() {
        let m = motor(12.5, Orientation::Indirect, [-90.0, 90.0]);
        for rel in [-90.0, -33.3, 0.0, 45.0, 90.0] {
            let abs = m.to_absolute(rel);
            assert!((m.to_relative(abs) - rel).abs() < 1e-12);
        }
    }

    #[test]
    fn test_set_goal_angle_roundtrip_law() {
        // 限幅往返律：set(x) 后 goal_angle() == clamp(x, min, max)，
        // 与 orientation/offset 无关
        for orientation in [Orientation::Direct, Orientation::Indirect] {
            for offset in [0.0, -7.0, 30.0] {
                let m = motor(offset, orientation, [-45.0, 60.0]);
                for x in [-100.0, -45.0, -10.0, 0.0, 59.9, 60.0, 120.0] {
                    let applied = m.set_goal_angle(x);
                    let expected = x.clamp(-45.0, 60.0);
                    assert!(
                        (applied - expected).abs() < 1e-9,
                        "applied {} expected {} (orientation {:?} offset {})",
                        applied,
                        expected,
                        orientation,
                        offset
                    );
                    assert!((m.goal_angle() - expected).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_clamp_below_and_above() {
        let m = motor(0.0, Orientation::Direct, [-30.0, 30.0]);
        assert_eq!(m.set_goal_angle(-100.0), -30.0);
        assert_eq!(m.set_goal_angle(100.0), 30.0);
    }

    #[test]
    fn test_instant_mode_propagates_to_current() {
        let config = MotorConfig {
            id: "m-2".to_string(),
            offset: 5.0,
            angle_limit: [-90.0, 90.0],
            orientation: Orientation::Direct,
            motor_type: "default".to_string(),
        };
        let m = Motor::from_config("instant_motor", &config, true);

        m.set_goal_angle(42.0);
        assert!((m.current_angle() - 42.0).abs() < 1e-9);
        assert_eq!(m.abs_current_angle(), m.abs_goal_angle());
    }

    #[test]
    fn test_non_instant_mode_leaves_current() {
        let m = motor(0.0, Orientation::Direct, [-90.0, 90.0]);
        m.set_goal_angle(42.0);
        // 当前角度由引擎负责移动，这里保持初始值
        assert_eq!(m.abs_current_angle(), 0.0);
    }

    #[test]
    fn test_indirect_absolute_sign() {
        let m = motor(0.0, Orientation::Indirect, [-90.0, 90.0]);
        m.set_goal_angle(30.0);
        assert!((m.abs_goal_angle() - (-30.0)).abs() < 1e-9);
        assert!((m.goal_angle() - 30.0).abs() < 1e-9);
    }
}
