//! 点到点控制器
//!
//! 多舵机同步轨迹：在给定时长内把一组舵机的**目标角度**从当前目标
//! 线性插值到请求值。控制器只生成设定点，物理位置由 MotionEngine
//! 独立地限速追踪——两个循环各有各的频率。
//!
//! 同一模块还包含命名姿态、会话录制/回放和姿态表持久化。
//!
//! # 并发语义
//!
//! 非阻塞调用在独立线程中执行。多个非阻塞轨迹可以并发运行；
//! 目标舵机重叠时每个 tick 后写者胜出（不做冲突检测），需要确定
//! 结果的调用方应使用阻塞调用自行串行化。进行中的轨迹不可取消：
//! 新指令只是开始写入新的设定点序列。

use crate::engine::SLEEP_TICK_FRACTION;
use crate::error::RobotError;
use crate::recording::{PointToPointSession, SessionEntry};
use crate::robot::Robot;
use simbot_model::{Motor, Pose};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 录制状态（进行中的会话）
pub(crate) struct RecordingState {
    started_at: Instant,
    entries: Vec<SessionEntry>,
}

/// 单个舵机的轨迹计划
struct PtpTarget {
    motor: Arc<Motor>,
    /// 起点：当前的**目标**角度（相对空间），不是物理位置
    start: f64,
    /// 每步增量
    increment: f64,
    /// 请求的终点角度（最后一步直接落点，避免浮点残差）
    goal: f64,
}

/// 轨迹步数：`max(1, round(duration × rate))`
///
/// `duration = 0` 退化为单步（目标立即跳变，物理上仍由引擎限速，
/// 除非舵机处于 instant 模式）。
pub fn step_count(duration: f64, rate_hz: f64) -> u32 {
    ((duration * rate_hz).round() as u32).max(1)
}

impl Robot {
    /// 同步移动多个舵机（点到点）
    ///
    /// `goals` 中不存在的舵机键记录警告后跳过（部分应用是预期行为）。
    /// 若录制会话激活，指令在执行前先追加到会话。`blocking = false`
    /// 时在独立线程中执行并立即返回。
    pub fn move_point_to_point(self: &Arc<Self>, goals: &Pose, duration: f64, blocking: bool) {
        info!("move_point_to_point: {:?} in {} sec", goals, duration);
        let steps = step_count(duration, self.ptp_rate_hz());

        let mut targets = Vec::with_capacity(goals.len());
        for (key, &goal) in goals {
            let Some(motor) = self.get_motor(key) else {
                warn!("move_point_to_point: motor with key '{}' not found", key);
                continue;
            };
            let start = motor.goal_angle();
            targets.push(PtpTarget {
                motor,
                start,
                increment: (goal - start) / steps as f64,
                goal,
            });
        }

        // 录制：无论执行模式如何，指令先进会话
        if let Some(state) = self.recording.lock().as_mut() {
            let elapsed = state.started_at.elapsed().as_secs_f64();
            state.entries.push(SessionEntry {
                goals: goals.clone(),
                duration,
                elapsed: (elapsed * 1000.0).round() / 1000.0,
            });
        }

        if blocking {
            debug!("exec_point_to_point with {} steps", steps);
            self.exec_point_to_point(&targets, steps);
        } else {
            debug!("exec_point_to_point thread with {} steps", steps);
            let robot = Arc::clone(self);
            let spawned = std::thread::Builder::new()
                .name("ptp_executor".to_string())
                .spawn(move || robot.exec_point_to_point(&targets, steps));
            if let Err(e) = spawned {
                warn!("failed to spawn ptp_executor thread: {}", e);
            }
        }
    }

    /// 轨迹执行循环
    ///
    /// 以 `ptp_rate_hz`（按速度倍率缩放）推进：第 i 步把每个目标舵机的
    /// 目标角度设为 `start + increment × i`，最后一步直接写请求终点。
    fn exec_point_to_point(&self, targets: &[PtpTarget], steps: u32) {
        if targets.is_empty() {
            return;
        }

        let rate = self.ptp_rate_hz();
        let mut step = 0u32;
        let mut last_tick: Option<Instant> = None;

        loop {
            let speed = self.robot_speed();
            let period = Duration::from_secs_f64(1.0 / rate / speed);

            let due = match last_tick {
                None => true, // 第一步立即执行
                Some(t) => t.elapsed() >= period,
            };
            if due {
                last_tick = Some(Instant::now());
                step += 1;
                for target in targets {
                    let angle = if step >= steps {
                        target.goal
                    } else {
                        target.start + target.increment * step as f64
                    };
                    target.motor.set_goal_angle(angle);
                }
                if step >= steps {
                    return;
                }
            }

            // Avoid wasting CPU time
            spin_sleep::sleep(period.mul_f64(SLEEP_TICK_FRACTION));
        }
    }

    /// 移动到命名姿态
    ///
    /// `duration = 0` 强制阻塞执行（没有可分摊的插值时间）。
    /// 姿态不存在时返回错误且不触碰任何舵机。
    pub fn go_to_pose(
        self: &Arc<Self>,
        name: &str,
        duration: f64,
        blocking: bool,
    ) -> Result<(), RobotError> {
        let Some(pose) = self.get_pose(name) else {
            warn!("go_to_pose: pose '{}' not found", name);
            return Err(RobotError::PoseNotFound {
                name: name.to_string(),
            });
        };
        info!("go_to_pose: {}", name);
        let blocking = blocking || duration == 0.0;
        self.move_point_to_point(&pose, duration, blocking);
        Ok(())
    }

    /// 开始录制点到点会话
    ///
    /// 清空缓冲并记录起始时间。已在录制时**重置**当前会话（而不是
    /// 忽略调用）——这是本 SDK 的约定，重置会记录警告。
    pub fn start_recording(&self) {
        let mut recording = self.recording.lock();
        if recording.is_some() {
            warn!("start_recording: already recording, resetting session");
        } else {
            debug!("start_recording: session started");
        }
        *recording = Some(RecordingState {
            started_at: Instant::now(),
            entries: Vec::new(),
        });
    }

    /// 是否正在录制
    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_some()
    }

    /// 停止录制并返回会话
    ///
    /// 未在录制时返回空会话。返回后录制标志清除，缓冲只能通过
    /// 返回值访问。
    pub fn stop_recording(&self) -> PointToPointSession {
        match self.recording.lock().take() {
            Some(state) => {
                debug!("stop_recording: {} entries recorded", state.entries.len());
                PointToPointSession {
                    entries: state.entries,
                }
            },
            None => {
                warn!("stop_recording: no recording in progress");
                PointToPointSession::new()
            },
        }
    }

    /// 回放录制的会话
    ///
    /// 按原始顺序重放条目：第 i 条分发前睡眠
    /// `entries[i].elapsed − entries[i−1].elapsed`（饱和减法），以还原
    /// 录制时的指令节奏；然后用条目原始的目标/时长调用
    /// [`move_point_to_point`](Robot::move_point_to_point)，`blocking`
    /// 参数作用于每一条指令。
    ///
    /// 录制进行中拒绝回放。包含非阻塞（重叠）指令的会话按原始节奏
    /// 重新下发，但不保证逐位复现原始物理轨迹——这是已知限制。
    pub fn play_recorded(
        self: &Arc<Self>,
        session: &PointToPointSession,
        blocking: bool,
    ) -> Result<(), RobotError> {
        if self.is_recording() {
            warn!("play_recorded: stop recording first");
            return Err(RobotError::RecordingInProgress);
        }

        info!("play_recorded: {} entries", session.len());
        let mut previous_elapsed = 0.0_f64;
        for entry in &session.entries {
            let gap = (entry.elapsed - previous_elapsed).max(0.0);
            if gap > 0.0 {
                spin_sleep::sleep(Duration::from_secs_f64(gap));
            }
            previous_elapsed = entry.elapsed;
            self.move_point_to_point(&entry.goals, entry.duration, blocking);
        }
        Ok(())
    }

    /// 创建或覆盖命名姿态
    ///
    /// 所有舵机键必须存在，否则返回错误且姿态表不变。覆盖已有姿态
    /// 记录警告。`persist = true` 时把完整姿态表写入运动文件。
    pub fn create_pose(&self, name: &str, pose: Pose, persist: bool) -> Result<(), RobotError> {
        for key in pose.keys() {
            if self.get_motor(key).is_none() {
                return Err(RobotError::MotorNotFound { key: key.clone() });
            }
        }

        {
            let mut poses = self.poses_lock().write();
            if poses.contains_key(name) {
                warn!("create_pose: overwriting existing pose '{}'", name);
            }
            poses.insert(name.to_string(), pose);
        }
        info!("create_pose: '{}' stored", name);

        if persist {
            self.persist_motion()?;
        }
        Ok(())
    }

    /// 删除命名姿态
    ///
    /// 姿态不存在时返回错误。`persist = true` 时把姿态表写回运动文件。
    pub fn delete_pose(&self, name: &str, persist: bool) -> Result<(), RobotError> {
        {
            let mut poses = self.poses_lock().write();
            if poses.remove(name).is_none() {
                return Err(RobotError::PoseNotFound {
                    name: name.to_string(),
                });
            }
        }
        info!("delete_pose: '{}' removed", name);

        if persist {
            self.persist_motion()?;
        }
        Ok(())
    }

    /// 当前运动配置（持久化视图）
    pub fn motion_configuration(&self) -> crate::MotionConfig {
        crate::MotionConfig {
            poses: self.poses(),
        }
    }

    /// 把姿态表写入配置的运动文件
    fn persist_motion(&self) -> Result<(), RobotError> {
        let path = self.motion_file().ok_or(RobotError::NoMotionFile)?;
        let motion = self.motion_configuration();
        motion.save(path)?;
        debug!("motion file {} updated ({} poses)", path.display(), motion.poses.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::RobotParams;
    use crate::test_support::{sample_config, sample_robot};

    /// instant 模式 + 高速步进的测试机器人
    fn instant_robot() -> Arc<Robot> {
        sample_robot(RobotParams {
            motors_rate_hz: 0.0,
            ptp_rate_hz: 100.0,
            ..RobotParams::default()
        })
    }

    fn goals(entries: &[(&str, f64)]) -> Pose {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_step_count() {
        assert_eq!(step_count(8.0, 10.0), 80);
        assert_eq!(step_count(0.0, 10.0), 1);
        assert_eq!(step_count(0.04, 10.0), 1); // round(0.4) = 0 → 至少 1 步
        assert_eq!(step_count(2.5, 10.0), 25);
    }

    #[test]
    fn test_zero_duration_blocking_jumps_goal() {
        let robot = instant_robot();
        robot.move_point_to_point(&goals(&[("head_z", 50.0)]), 0.0, true);

        let motor = robot.get_motor("head_z").unwrap();
        assert_eq!(motor.goal_angle(), 50.0);
        // instant 模式下当前角度同步
        assert_eq!(motor.current_angle(), 50.0);
    }

    #[test]
    fn test_goal_clamped_at_final_step() {
        let robot = instant_robot();
        robot.move_point_to_point(&goals(&[("head_z", 500.0)]), 0.0, true);
        assert_eq!(robot.get_motor("head_z").unwrap().goal_angle(), 90.0);
    }

    #[test]
    fn test_unknown_keys_skipped() {
        let robot = instant_robot();
        robot.move_point_to_point(
            &goals(&[("head_z", 10.0), ("no_such_motor", 99.0)]),
            0.0,
            true,
        );
        // 已知键仍然生效
        assert_eq!(robot.get_motor("head_z").unwrap().goal_angle(), 10.0);
    }

    #[test]
    fn test_blocking_move_reaches_exact_goal() {
        let robot = instant_robot();
        // 100 Hz × 0.05 s = 5 步
        robot.move_point_to_point(&goals(&[("head_z", 33.3), ("l_shoulder_x", -77.7)]), 0.05, true);
        assert_eq!(robot.get_motor("head_z").unwrap().goal_angle(), 33.3);
        assert_eq!(robot.get_motor("l_shoulder_x").unwrap().goal_angle(), -77.7);
    }

    #[test]
    fn test_nonblocking_move_returns_immediately() {
        let robot = instant_robot();
        let started = Instant::now();
        robot.move_point_to_point(&goals(&[("head_z", 45.0)]), 0.3, false);
        assert!(started.elapsed() < Duration::from_millis(100));

        // 最终必须收敛到请求目标
        let motor = robot.get_motor("head_z").unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while motor.goal_angle() != 45.0 {
            assert!(Instant::now() < deadline, "non-blocking move never finished");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_goal_interpolates_through_intermediate_values() {
        // 起点是当前目标而不是物理位置：先把目标拉到 −20，再用较长的
        // 轨迹移到 80，中途目标必须落在两者之间
        let robot = sample_robot(RobotParams {
            motors_rate_hz: 0.0,
            ptp_rate_hz: 20.0,
            ..RobotParams::default()
        });
        let motor = robot.get_motor("head_z").unwrap();
        robot.move_point_to_point(&goals(&[("head_z", -20.0)]), 0.0, true);

        robot.move_point_to_point(&goals(&[("head_z", 80.0)]), 0.5, false);
        std::thread::sleep(Duration::from_millis(200));
        let mid = motor.goal_angle();
        assert!(
            mid > -20.0 && mid < 80.0,
            "goal should be interpolating, got {}",
            mid
        );

        // 收尾
        let deadline = Instant::now() + Duration::from_secs(2);
        while motor.goal_angle() != 80.0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(motor.goal_angle(), 80.0);
    }

    #[test]
    fn test_go_to_pose() {
        let robot = instant_robot();
        robot.go_to_pose("standby", 0.0, false).unwrap();
        assert_eq!(robot.get_motor("head_z").unwrap().goal_angle(), 0.0);

        assert!(matches!(
            robot.go_to_pose("missing", 0.0, true),
            Err(RobotError::PoseNotFound { .. })
        ));
    }

    #[test]
    fn test_go_to_pose_absent_does_not_mutate() {
        let robot = instant_robot();
        robot.move_point_to_point(&goals(&[("head_z", 12.0)]), 0.0, true);
        let _ = robot.go_to_pose("missing", 0.0, true);
        assert_eq!(robot.get_motor("head_z").unwrap().goal_angle(), 12.0);
    }

    #[test]
    fn test_recording_captures_moves_in_order() {
        let robot = instant_robot();
        robot.start_recording();
        assert!(robot.is_recording());

        robot.move_point_to_point(&goals(&[("head_z", 10.0)]), 0.0, true);
        robot.move_point_to_point(&goals(&[("head_z", 20.0)]), 1.5, true);

        let session = robot.stop_recording();
        assert!(!robot.is_recording());
        assert_eq!(session.len(), 2);
        assert_eq!(session.entries[0].goals["head_z"], 10.0);
        assert_eq!(session.entries[0].duration, 0.0);
        assert_eq!(session.entries[1].goals["head_z"], 20.0);
        assert_eq!(session.entries[1].duration, 1.5);
        assert!(session.entries[1].elapsed >= session.entries[0].elapsed);
    }

    #[test]
    fn test_recording_restart_resets_session() {
        let robot = instant_robot();
        robot.start_recording();
        robot.move_point_to_point(&goals(&[("head_z", 10.0)]), 0.0, true);

        // 再次 start 清空缓冲（约定：重置并记录日志）
        robot.start_recording();
        robot.move_point_to_point(&goals(&[("head_z", 20.0)]), 0.0, true);

        let session = robot.stop_recording();
        assert_eq!(session.len(), 1);
        assert_eq!(session.entries[0].goals["head_z"], 20.0);
    }

    #[test]
    fn test_stop_without_start_returns_empty() {
        let robot = instant_robot();
        let session = robot.stop_recording();
        assert!(session.is_empty());
    }

    #[test]
    fn test_play_refused_while_recording() {
        let robot = instant_robot();
        robot.start_recording();
        let result = robot.play_recorded(&PointToPointSession::new(), true);
        assert!(matches!(result, Err(RobotError::RecordingInProgress)));
        robot.stop_recording();
    }

    #[test]
    fn test_playback_reissues_entries_with_recorded_cadence() {
        let robot = instant_robot();
        let session = PointToPointSession {
            entries: vec![
                SessionEntry {
                    goals: goals(&[("head_z", 10.0)]),
                    duration: 0.0,
                    elapsed: 0.0,
                },
                SessionEntry {
                    goals: goals(&[("head_z", 20.0)]),
                    duration: 0.0,
                    elapsed: 0.08,
                },
                SessionEntry {
                    goals: goals(&[("head_z", 30.0)]),
                    duration: 0.0,
                    elapsed: 0.15,
                },
            ],
        };

        let started = Instant::now();
        robot.play_recorded(&session, true).unwrap();
        let elapsed = started.elapsed();

        // 回放节奏 = 录制的 elapsed 差值之和（0.08 + 0.07 = 0.15 秒）
        assert!(elapsed >= Duration::from_millis(150), "played too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "played too slow: {:?}", elapsed);
        // 条目按顺序下发，最后一条决定最终目标
        assert_eq!(robot.get_motor("head_z").unwrap().goal_angle(), 30.0);
    }

    #[test]
    fn test_create_pose_validates_keys() {
        let robot = instant_robot();
        let result = robot.create_pose("bad", goals(&[("no_such_motor", 1.0)]), false);
        assert!(matches!(result, Err(RobotError::MotorNotFound { .. })));
        // 姿态表不变
        assert!(robot.get_pose("bad").is_none());
    }

    #[test]
    fn test_create_and_delete_pose() {
        let robot = instant_robot();
        robot
            .create_pose("wave", goals(&[("head_z", 15.0)]), false)
            .unwrap();
        assert_eq!(robot.get_pose("wave").unwrap()["head_z"], 15.0);

        // 覆盖允许
        robot
            .create_pose("wave", goals(&[("head_z", -15.0)]), false)
            .unwrap();
        assert_eq!(robot.get_pose("wave").unwrap()["head_z"], -15.0);

        robot.delete_pose("wave", false).unwrap();
        assert!(robot.get_pose("wave").is_none());
        assert!(matches!(
            robot.delete_pose("wave", false),
            Err(RobotError::PoseNotFound { .. })
        ));
    }

    #[test]
    fn test_pose_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion.json");

        let robot = Robot::from_config(
            sample_config(),
            RobotParams {
                motors_rate_hz: 0.0,
                motion_file: Some(path.clone()),
                ..RobotParams::default()
            },
        )
        .unwrap();
        robot
            .create_pose("wave", goals(&[("head_z", 15.0)]), true)
            .unwrap();
        assert!(path.exists());

        // 新实例加载运动文件，姿态覆盖层生效
        let reloaded = Robot::from_config(
            sample_config(),
            RobotParams {
                motors_rate_hz: 0.0,
                motion_file: Some(path),
                ..RobotParams::default()
            },
        )
        .unwrap();
        assert_eq!(reloaded.get_pose("wave").unwrap()["head_z"], 15.0);
        // 配置自带的姿态仍然可用
        assert!(reloaded.get_pose("standby").is_some());
    }

    #[test]
    fn test_persist_without_motion_file_is_error() {
        let robot = instant_robot();
        assert!(matches!(
            robot.create_pose("wave", goals(&[("head_z", 1.0)]), true),
            Err(RobotError::NoMotionFile)
        ));
        // 姿态本身已写入内存表
        assert!(robot.get_pose("wave").is_some());
    }
}
