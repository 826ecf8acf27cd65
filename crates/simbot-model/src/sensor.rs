//! 传感器模型
//!
//! 简单的只读值模型：外部采集端写入，广播层读取。
//! `value = abs_value + offset`。

use crate::atomic::AtomicF64;
use crate::config::SensorConfig;
use tracing::debug;

/// 传感器
#[derive(Debug)]
pub struct Sensor {
    /// 唯一标识符
    id: String,
    /// 人类可读的键
    key: String,
    /// 标定偏移量
    offset: f64,
    /// 原始值（偏移前）
    abs_value: AtomicF64,
}

impl Sensor {
    /// 从配置创建传感器
    pub fn from_config(key: &str, config: &SensorConfig) -> Self {
        let sensor = Self {
            id: config.id.clone(),
            key: key.to_string(),
            offset: config.offset,
            abs_value: AtomicF64::new(0.0),
        };
        debug!("{}: sensor initialized", sensor.key);
        sensor
    }

    /// 唯一标识符
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 人类可读的键
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 当前值（已应用偏移）
    pub fn value(&self) -> f64 {
        self.abs_value.load() + self.offset
    }

    /// 写入已应用偏移的值
    pub fn set_value(&self, value: f64) {
        self.abs_value.store(value - self.offset);
    }

    /// 写入原始值
    pub fn set_abs_value(&self, value: f64) {
        self.abs_value.store(value);
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} value: {:.2}>", self.key, self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(offset: f64) -> Sensor {
        let config = SensorConfig {
            id: "s-1".to_string(),
            offset,
        };
        Sensor::from_config("test_sensor", &config)
    }

    #[test]
    fn test_value_applies_offset() {
        let s = sensor(2.5);
        s.set_abs_value(10.0);
        assert!((s.value() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_set_value_roundtrip() {
        let s = sensor(-3.0);
        s.set_value(7.0);
        // set_value 存的是偏移前的原始值
        assert!((s.value() - 7.0).abs() < 1e-9);
    }
}
