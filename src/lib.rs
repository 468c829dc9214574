//! # Tao (道)
//!
//! 纯 Rust 实现的 HEVC 高层语法编码器.
//!
//! - **参数集**: VPS (两种语法形式), SPS (含多视点/深度扩展), PPS, APS
//! - **slice header**: 参考图像集, 加权预测表, 入口点
//! - **比特写入**: Exp-Golomb 等 VLC 基本单元, 可选的逐语法元素追踪
//!
//! # 快速开始
//!
//! ```rust
//! use tao::codec::hevc::{HevcSyntaxConfig, Sps, encode_sps_rbsp};
//!
//! let mut sps = Sps::default();
//! sps.finalize_derived_fields();
//! let rbsp = encode_sps_rbsp(&sps, &HevcSyntaxConfig::default()).unwrap();
//! println!("SPS RBSP: {} 字节", rbsp.len());
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 比特读写与错误类型 |
//! | `tao-codec` | HEVC 语法编码器 |

/// 比特读写与错误类型
pub use tao_core as core;

/// 语法编码器
pub use tao_codec as codec;

pub mod logging;

/// 获取 Tao 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
