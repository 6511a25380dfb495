//! 有理数类型, 用于帧率与像素宽高比.

use std::fmt;
use std::str::FromStr;

use crate::error::MdError;

/// 有理数, 由分子和分母组成
///
/// 帧率 30000/1001 表示 29.97fps, 分母为 0 表示未定义.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 转换为 f64, 分母为 0 时返回 `f64::NAN`
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 约分, 并保证分母为正
    pub fn reduce(self) -> Self {
        if self.den == 0 {
            return self;
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs());
        if g == 0 {
            return self;
        }
        let g = g as i32;
        let sign = if self.den < 0 { -1 } else { 1 };
        Self {
            num: sign * self.num / g,
            den: sign * self.den / g,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Rational {
    type Err = MdError;

    /// 解析 `num/den` 或单个整数
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MdError::InvalidData(format!("无法解析分数: {s}"));
        match s.split_once('/') {
            Some((num, den)) => Ok(Self::new(
                num.trim().parse().map_err(|_| invalid())?,
                den.trim().parse().map_err(|_| invalid())?,
            )),
            None => Ok(Self::new(s.trim().parse().map_err(|_| invalid())?, 1)),
        }
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
