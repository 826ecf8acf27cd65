//! MotionEngine - 舵机收敛引擎
//!
//! 后台线程以配置频率 F（`motors_rate_hz`）周期运行，每个 tick 把每个
//! 未到位舵机的当前角度向目标角度移动至多 `angle_speed / F` 度。
//! 保证单调收敛、不过冲，且无论目标角度被改写得多快，模拟的角速度
//! 始终有界。
//!
//! 全局速度倍率 S 在每个 tick 原子读取：S 缩放的是 tick 间隔
//! （更快/更慢地播放时间），单 tick 步长不变。
//!
//! F <= 0 时引擎不启动，舵机在构造时进入 instant 模式（目标写入立即
//! 同步到当前角度），用于不需要物理节奏的快速仿真场景。
//!
//! tick 内的任何单舵机错误（典型：速度表缺失该舵机类型）只记录日志，
//! 循环继续处理下一个舵机、下一个 tick。

use crate::robot::Robot;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// tick 之间的睡眠占 tick 周期的比例
///
/// 周期循环用「到期检查 + 短睡眠」节拍：睡得太久会拖慢实际频率，
/// 完全不睡则空转烧 CPU。
pub const SLEEP_TICK_FRACTION: f64 = 0.1;

/// 舵机收敛引擎句柄
///
/// [`start`](MotionEngine::start) 返回后引擎线程即开始运行；
/// [`shutdown`](MotionEngine::shutdown)（或 Drop）停止线程并 join。
pub struct MotionEngine {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MotionEngine {
    /// 启动收敛引擎
    ///
    /// `motors_rate_hz <= 0` 时不启动线程（instant 模式），返回的句柄
    /// 是空操作。
    pub fn start(robot: Arc<Robot>) -> Self {
        let rate = robot.motors_rate_hz();
        if rate <= 0.0 {
            debug!("[motion_engine]: disabled by motors_rate_hz parameter");
            return Self {
                running: Arc::new(AtomicBool::new(false)),
                handle: None,
            };
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = std::thread::Builder::new()
            .name("motion_engine".to_string())
            .spawn(move || {
                info!(
                    "[motion_engine]: start handling {} motors at {} Hz",
                    robot.motors().len(),
                    rate
                );
                engine_loop(&robot, &thread_running);
                info!("[motion_engine]: stopped");
            })
            .expect("failed to spawn motion_engine thread");

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// 引擎线程是否在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// 停止引擎并等待线程退出
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// 执行一次收敛步进
    ///
    /// 引擎线程每个 tick 调用一次；测试中可直接调用以获得确定性的
    /// 步进序列。
    pub fn tick(robot: &Robot) {
        let rate = robot.motors_rate_hz();
        for motor in robot.motors() {
            let goal = motor.abs_goal_angle();
            let current = motor.abs_current_angle();
            if goal == current {
                continue;
            }

            let Some(angle_speed) = robot.angle_speed(motor.motor_type()) else {
                // 速度表缺项：跳过该舵机，绝不中断循环
                error!(
                    "[motion_engine]: motor '{}' has unknown type '{}', skipped",
                    motor.key(),
                    motor.motor_type()
                );
                continue;
            };

            let max_step = angle_speed / rate;
            let delta = goal - current;
            trace!(
                "[motion_engine]: {}: {:.2} -> {:.2} [{:.2}]",
                motor.key(),
                current,
                goal,
                delta.clamp(-max_step, max_step)
            );
            if delta.abs() <= max_step {
                // 剩余误差小于单步上限：精确落到目标，避免浮点残差
                motor.set_abs_current_angle(goal);
            } else {
                motor.set_abs_current_angle(current + max_step.copysign(delta));
            }
        }
    }
}

impl Drop for MotionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn engine_loop(robot: &Robot, running: &AtomicBool) {
    let rate = robot.motors_rate_hz();
    let mut last_tick: Option<Instant> = None;

    while running.load(Ordering::Relaxed) {
        let speed = robot.robot_speed();
        let period = Duration::from_secs_f64(1.0 / rate / speed);

        let due = match last_tick {
            None => true,
            Some(t) => t.elapsed() >= period,
        };
        if due {
            last_tick = Some(Instant::now());
            MotionEngine::tick(robot);
        }

        // Avoid wasting CPU time
        spin_sleep::sleep(period.mul_f64(SLEEP_TICK_FRACTION));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::RobotParams;
    use crate::test_support::sample_robot;

    #[test]
    fn test_tick_moves_at_most_max_step() {
        let robot = sample_robot(RobotParams::default()); // 50 Hz, 60 度/秒 → 1.2 度/tick
        let motor = robot.get_motor("head_z").unwrap();
        motor.set_goal_angle(34.7);

        MotionEngine::tick(&robot);
        assert!((motor.abs_current_angle() - 1.2).abs() < 1e-9);

        MotionEngine::tick(&robot);
        assert!((motor.abs_current_angle() - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_tick_converges_exactly_without_overshoot() {
        let robot = sample_robot(RobotParams::default());
        let motor = robot.get_motor("head_z").unwrap();
        motor.set_goal_angle(34.7);

        // ⌈34.7 / 1.2⌉ = 29 个 tick 后必须精确到位
        let mut previous = motor.abs_current_angle();
        for _ in 0..29 {
            MotionEngine::tick(&robot);
            let now = motor.abs_current_angle();
            assert!(now >= previous, "must converge monotonically");
            assert!(now <= 34.7 + 1e-9, "must never overshoot");
            previous = now;
        }
        assert_eq!(motor.current_angle(), 34.7);

        // 到位后继续 tick 不再移动
        MotionEngine::tick(&robot);
        assert_eq!(motor.current_angle(), 34.7);
    }

    #[test]
    fn test_tick_negative_direction() {
        let robot = sample_robot(RobotParams::default());
        let motor = robot.get_motor("head_z").unwrap();
        motor.set_goal_angle(-10.0);

        MotionEngine::tick(&robot);
        assert!((motor.abs_current_angle() - (-1.2)).abs() < 1e-9);
    }

    #[test]
    fn test_engine_thread_converges_in_real_time() {
        // 例：head_z 限位 [−90, 90]、offset 0、direct、60 度/秒、50 Hz、S=1，
        // set_goal_angle(34.7) 后运行 600ms，当前角度应在一个 tick 步长
        // （1.2 度）以内
        let robot = sample_robot(RobotParams::default());
        let mut engine = MotionEngine::start(robot.clone());
        assert!(engine.is_running());

        let motor = robot.get_motor("head_z").unwrap();
        motor.set_goal_angle(34.7);

        std::thread::sleep(Duration::from_millis(600));
        let current = motor.current_angle();
        assert!(
            (current - 34.7).abs() <= 1.2,
            "after 600ms current {} must be within one step of 34.7",
            current
        );

        // 再留足余量后必须精确到位
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(motor.current_angle(), 34.7);

        engine.shutdown();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_disabled_engine_is_noop_handle() {
        let robot = sample_robot(RobotParams {
            motors_rate_hz: 0.0,
            ..RobotParams::default()
        });
        let mut engine = MotionEngine::start(robot);
        assert!(!engine.is_running());
        engine.shutdown(); // 不应 panic
    }

    #[test]
    fn test_tick_moves_all_motors() {
        let robot = sample_robot(RobotParams::default());
        let head = robot.get_motor("head_z").unwrap();
        let shoulder = robot.get_motor("l_shoulder_x").unwrap();
        head.set_goal_angle(10.0);
        shoulder.set_goal_angle(-10.0);

        MotionEngine::tick(&robot);
        assert!(head.abs_current_angle() != 0.0);
        assert!(shoulder.abs_current_angle() != 0.0);
    }
}
