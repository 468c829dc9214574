//! 统一错误类型定义.
//!
//! 所有 Tao crate 共用的错误类型, 支持跨模块传播.
//!
//! 码流语法写入过程中出现的错误均不可恢复: 调用方应丢弃已写出的部分 RBSP.

use thiserror::Error;

/// Tao 框架统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 无效参数 (调用方违反前置条件)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 编解码器错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 功能未实现
    #[error("功能未实现: {0}")]
    NotImplemented(String),
}

/// Tao 框架统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;
