//! 录制会话与运动文件格式
//!
//! 点到点会话是带时间戳的指令序列，可以回放，也可以随姿态表一起
//! 以 JSON 形式持久化到磁盘。

use serde::{Deserialize, Serialize};
use simbot_model::Pose;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// 会话中的单条点到点指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// 目标角度映射（舵机键 → 相对目标角度）
    pub goals: Pose,
    /// 指令的运动时长（秒）
    pub duration: f64,
    /// 距离录制开始的时间（秒）
    pub elapsed: f64,
}

/// 点到点录制会话
///
/// 条目按录制顺序保存；回放按 `elapsed` 差值还原原始指令节奏。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointToPointSession {
    pub entries: Vec<SessionEntry>,
}

impl PointToPointSession {
    /// 创建空会话
    pub fn new() -> Self {
        Self::default()
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 会话是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 保存为 JSON 文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::RobotError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// 从 JSON 文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::RobotError> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// 运动文件内容（持久化的姿态表）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// 姿态表（名称 → 目标角度映射）
    pub poses: BTreeMap<String, Pose>,
}

impl MotionConfig {
    /// 保存为 JSON 文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::RobotError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// 从 JSON 文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::RobotError> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
