//! 指令解析链
//!
//! 入站消息解码为 JSON 后依注册顺序交给解析器链：每个解析器是
//! `(message) -> Option<response>` 的纯函数，第一个非空响应短路整条链
//! 并作为回复送回传输层；全部返回 `None` 则该消息视为未识别（记录
//! 日志，不回复）。
//!
//! 解析器在构造时注入 `Arc<Robot>` 上下文——没有进程级单例，每条链
//! 显式持有它要操作的机器人。
//!
//! # 协议
//!
//! 内置 [`CommandParser`] 实现类型化信封协议：请求 `type: "C2R"`
//! （client-to-robot），响应 `type: "R2C"`，按 `data.area` 路由：
//!
//! | area   | action                     | 行为                               |
//! |--------|----------------------------|------------------------------------|
//! | config | get_configuration          | 返回完整配置                       |
//! | config | get_configuration_motion   | 返回运动配置（姿态表）             |
//! | status | live_status                | 返回状态快照（format 可选 absolute）|
//! | motors | （commands 批量）          | 逐条 set_goal_angle，尽力而为      |
//! | twist  | （go 整体写入）            | 整体替换 twist                     |
//!
//! motors / twist 是指令型消息：应用后不产生回复（返回 `None`），
//! 批量不具原子性，单条坏指令跳过并记录，其余仍然生效。

use serde_json::{Value, json};
use simbot_core::{AngleFormat, Robot};
use simbot_model::TwistVector;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 指令解析器
///
/// 实现必须无共享可变状态（`Send + Sync`），对不认识的消息返回 `None`。
pub trait Parser: Send + Sync {
    /// 解析器名称（日志用）
    fn name(&self) -> &str;

    /// 尝试解析消息；返回 `Some(response)` 时短路整条链
    fn parse(&self, message: &Value) -> Option<Value>;
}

/// 有序解析链
#[derive(Default)]
pub struct ParserChain {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserChain {
    /// 创建空链
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册解析器（追加到链尾）
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        debug!("parser '{}' registered", parser.name());
        self.parsers.push(parser);
    }

    /// 已注册的解析器数量
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// 链是否为空
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// 按注册顺序分发消息，返回第一个非空响应
    pub fn dispatch(&self, message: &Value) -> Option<Value> {
        for parser in &self.parsers {
            if let Some(response) = parser.parse(message) {
                trace!("message handled by parser '{}'", parser.name());
                return Some(response);
            }
        }
        debug!("unrecognized message: {}", message);
        None
    }
}

/// 内置 C2R/R2C 协议解析器
pub struct CommandParser {
    robot: Arc<Robot>,
}

impl CommandParser {
    /// 创建解析器（显式注入机器人上下文）
    pub fn new(robot: Arc<Robot>) -> Self {
        Self { robot }
    }

    fn reply(area: &str, action: &str, value: Value) -> Value {
        json!({
            "type": "R2C",
            "data": {
                "area": area,
                "action": action,
                "value": value,
            }
        })
    }

    fn parse_config(&self, data: &Value) -> Option<Value> {
        match data.get("action")?.as_str()? {
            "get_configuration" => {
                let value = serde_json::to_value(self.robot.configuration()).ok()?;
                Some(Self::reply("config", "get_configuration", value))
            },
            "get_configuration_motion" => {
                let value = serde_json::to_value(self.robot.motion_configuration()).ok()?;
                Some(Self::reply("config", "get_configuration_motion", value))
            },
            _ => None,
        }
    }

    fn parse_status(&self, data: &Value) -> Option<Value> {
        if data.get("action")?.as_str()? != "live_status" {
            return None;
        }
        let format = match data.get("format").and_then(Value::as_str) {
            Some("absolute") => AngleFormat::Absolute,
            _ => AngleFormat::Relative,
        };
        let value = serde_json::to_value(self.robot.status(format)).ok()?;
        Some(Self::reply("status", "live_status", value))
    }

    /// 批量舵机指令：尽力而为，单条失败不影响其余
    fn apply_motor_commands(&self, commands: &[Value]) {
        for command in commands {
            let Some(key) = command.get("key").and_then(Value::as_str) else {
                warn!("motor command without 'key' skipped: {}", command);
                continue;
            };
            let Some(motor) = self.robot.get_motor(key) else {
                warn!("motor with key '{}' not found", key);
                continue;
            };
            match command.get("action").and_then(Value::as_str) {
                Some("set_goal_angle") => {
                    let Some(angle) = command.get("goal_angle").and_then(Value::as_f64) else {
                        warn!("motor command for '{}' without numeric 'goal_angle'", key);
                        continue;
                    };
                    motor.set_goal_angle(angle);
                },
                other => {
                    warn!("unknown motor action {:?} for '{}'", other, key);
                },
            }
        }
    }

    fn apply_twist(&self, data: &Value) -> Option<()> {
        let go = data.get("go")?;
        let linear: TwistVector = match serde_json::from_value(go.get("linear")?.clone()) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to parse twist linear vector: {}", e);
                return None;
            },
        };
        let angular: TwistVector = match serde_json::from_value(go.get("angular")?.clone()) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to parse twist angular vector: {}", e);
                return None;
            },
        };
        if let Err(e) = self.robot.set_twist(linear, angular) {
            warn!("set_twist rejected: {}", e);
        }
        Some(())
    }
}

impl Parser for CommandParser {
    fn name(&self) -> &str {
        "commands"
    }

    fn parse(&self, message: &Value) -> Option<Value> {
        if message.get("type")?.as_str()? != "C2R" {
            return None;
        }
        let data = message.get("data")?;
        let area = data.get("area")?.as_str()?;

        match area {
            "config" => self.parse_config(data),
            "status" => self.parse_status(data),
            "motors" => {
                if let Some(commands) = data.get("commands").and_then(Value::as_array) {
                    self.apply_motor_commands(commands);
                }
                // 指令型消息：应用后不回复
                None
            },
            "twist" => {
                self.apply_twist(data);
                None
            },
            _ => {
                warn!("failed to interpret C2R message: {}", message);
                None
            },
        }
    }
}
