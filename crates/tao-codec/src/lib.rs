//! # tao-codec
//!
//! Tao 编码器库, 当前提供 HEVC 高层语法 (CAVLC) 编码器.
//!
//! 编码器把 VPS/SPS/PPS/APS 与 slice header 序列化为 RBSP 比特,
//! 比特写入通过 [`tao_core::BitSink`] 抽象完成.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::hevc::{HevcSyntaxConfig, HevcSyntaxEncoder, Pps, Sps};
//! use tao_core::BitWriter;
//!
//! let mut sps = Sps::default();
//! sps.finalize_derived_fields();
//! let config = HevcSyntaxConfig::default();
//!
//! let mut bw = BitWriter::new();
//! let mut enc = HevcSyntaxEncoder::new(&mut bw, &config);
//! enc.encode_sps(&sps).unwrap();
//! enc.encode_pps(&Pps::default(), &sps).unwrap();
//! enc.write_rbsp_trailing_bits();
//! ```

pub mod encoders;

// 重导出常用模块
pub use encoders::hevc;
