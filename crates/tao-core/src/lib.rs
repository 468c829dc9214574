//! # tao-core
//!
//! Tao 核心库, 提供码流编码所需的底层基础设施: 比特汇接口、比特读写器与统一错误类型.
//!
//! 上层的语法编码器 (tao-codec) 只依赖 [`BitSink`] 接口输出比特.

pub mod bitreader;
pub mod bitwriter;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::{BitSink, BitWriter};
pub use error::{TaoError, TaoResult};
