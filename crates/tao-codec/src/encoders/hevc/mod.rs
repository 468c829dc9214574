//! HEVC 高层语法 (CAVLC) 编码器.
//!
//! 把参数集与 slice 描述序列化为 RBSP 比特:
//! - VLC 基本写入: 定长, ue(v), se(v), 截断一元, 转义 Exp-Golomb
//! - VPS / SPS / PPS / APS 头部与 slice header
//! - 短期与长期参考图像集 (RPS)
//! - 加权预测表, 量化矩阵, tile/波前入口点
//!
//! 块级语法 (CU/PU/TU) 由 CABAC 编码器负责, 这里只通过 [`SyntaxCapability`] 声明不支持.
//!
//! # 使用示例
//!
//! ```rust
//! use tao_codec::encoders::hevc::{HevcSyntaxConfig, Sps, encode_sps_rbsp};
//!
//! let mut sps = Sps::default();
//! sps.finalize_derived_fields();
//! let rbsp = encode_sps_rbsp(&sps, &HevcSyntaxConfig::default()).unwrap();
//! assert!(!rbsp.is_empty());
//! ```

mod config;
mod encoder;
mod entry_point;
mod parameter_set_syntax;
mod parameter_sets;
mod rps;
mod scaling_list;
mod slice_header;
mod trace;
mod vlc;
mod weight_table;

pub use config::{HevcSyntaxConfig, VpsSyntax};
pub use encoder::{BlockSyntaxElement, HevcSyntaxEncoder, SyntaxCapability};
pub use entry_point::entry_point_offsets;
pub use parameter_sets::{
    Aps, CameraParameters, DpbParams, OperationPoints, ParallelMode, PcmParams, PicCropping, Pps,
    Sps, SpsMultiView, TileLayout, VPS_EXTENSION_TYPE_MULTI_VIEW, Vps, VpsLayer,
};
pub use rps::{
    InterRpsPrediction, LongTermCoding, ReferencePictureSet, RpsEntry, long_term_msb_cycles,
};
pub use scaling_list::{
    MAX_MATRIX_COEF_NUM, SCALING_LIST_COEF_NUM, SCALING_LIST_NUM, SCALING_LIST_SIZE_NUM,
    SCALING_LIST_START_VALUE, ScalingList, ScalingMatrix, coef_num, zigzag_scan,
};
pub use slice_header::{
    MRG_MAX_NUM_CANDS, NalUnitType, RefPicList, RefPicListModification, SliceHeader, SliceType,
};
pub use trace::{Descriptor, LogTrace, RecordingTrace, SyntaxTrace, TraceEntry};
pub use vlc::{MAX_UVLC_VALUE, SyntaxWriter, signed_to_code_num};
pub use weight_table::{RefWeights, WeightParam, WeightedPredictionMode, weighted_prediction_mode};

use bytes::Bytes;
use tao_core::{BitWriter, TaoError, TaoResult};

/// 在新的 BitWriter 上执行编码, 追加 RBSP 尾比特后返回字节
fn encode_rbsp(
    config: &HevcSyntaxConfig,
    f: impl FnOnce(&mut HevcSyntaxEncoder) -> TaoResult<()>,
) -> TaoResult<Bytes> {
    let mut bw = BitWriter::new();
    {
        let mut enc = HevcSyntaxEncoder::new(&mut bw, config);
        f(&mut enc)?;
        enc.write_rbsp_trailing_bits();
    }
    Ok(Bytes::from(bw.finish()))
}

/// 编码完整的 VPS RBSP
pub fn encode_vps_rbsp(vps: &Vps, config: &HevcSyntaxConfig) -> TaoResult<Bytes> {
    encode_rbsp(config, |enc| enc.encode_vps(vps))
}

/// 编码完整的 SPS RBSP
pub fn encode_sps_rbsp(sps: &Sps, config: &HevcSyntaxConfig) -> TaoResult<Bytes> {
    encode_rbsp(config, |enc| enc.encode_sps(sps))
}

/// 编码完整的 PPS RBSP
pub fn encode_pps_rbsp(pps: &Pps, sps: &Sps, config: &HevcSyntaxConfig) -> TaoResult<Bytes> {
    encode_rbsp(config, |enc| enc.encode_pps(pps, sps))
}

/// 编码 APS: 头部, 可选量化矩阵, ALF 标志与扩展标志
pub fn encode_aps_rbsp(
    aps: &Aps,
    scaling_list: Option<&ScalingList>,
    alf_enabled: bool,
    config: &HevcSyntaxConfig,
) -> TaoResult<Bytes> {
    encode_rbsp(config, |enc| {
        enc.encode_aps_header(aps)?;
        if aps.scaling_list_enabled {
            let list = scaling_list.ok_or_else(|| {
                TaoError::InvalidArgument("APS: 启用了量化矩阵但未提供".into())
            })?;
            enc.encode_scaling_list(list)?;
        }
        enc.encode_aps_alf_flag(alf_enabled);
        enc.encode_aps_extension_flag();
        Ok(())
    })
}
