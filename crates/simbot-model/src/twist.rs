//! Twist 模型（ROS 风格）
//!
//! 仅在配置启用 twist 控制器时存在，整体替换式更新（没有分量级写入）。

use serde::{Deserialize, Serialize};

/// 三维向量
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TwistVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TwistVector {
    /// 创建新向量
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// 线速度 + 角速度
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: TwistVector,
    pub angular: TwistVector,
}

impl Twist {
    /// 创建新的 Twist
    pub fn new(linear: TwistVector, angular: TwistVector) -> Self {
        Self { linear, angular }
    }
}

impl std::fmt::Display for Twist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<twist linear: {:.2}, {:.2}, {:.2} angular: {:.2}, {:.2}, {:.2}>",
            self.linear.x, self.linear.y, self.linear.z, self.angular.x, self.angular.y,
            self.angular.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twist_serde_roundtrip() {
        let twist = Twist::new(TwistVector::new(0.1, 0.0, -0.2), TwistVector::new(0.0, 0.0, 1.5));
        let json = serde_json::to_string(&twist).unwrap();
        let back: Twist = serde_json::from_str(&json).unwrap();
        assert_eq!(back, twist);
    }

    #[test]
    fn test_twist_default_is_zero() {
        let twist = Twist::default();
        assert_eq!(twist.linear, TwistVector::default());
        assert_eq!(twist.angular, TwistVector::default());
    }
}
