//! 语法编码器主体与小型语法辅助函数.

use tao_core::{BitSink, TaoError, TaoResult};

use super::config::HevcSyntaxConfig;
use super::slice_header::SliceHeader;
use super::trace::SyntaxTrace;
use super::vlc::SyntaxWriter;

/// 编码器能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxCapability {
    /// 参数集, slice header, RPS, 加权预测表, 入口点, 量化矩阵
    HighLevelSyntax,
    /// CU/PU/TU 级语法 (由 CABAC 编码器负责)
    BlockSyntax,
}

/// 块级语法元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSyntaxElement {
    SplitFlag,
    SkipFlag,
    MergeFlag,
    MergeIndex,
    PartSize,
    PredMode,
    InterModeFlag,
    IntraDirLuma,
    IntraDirChroma,
    InterDir,
    RefFrameIdx,
    Mvd,
    MvpIdx,
    TransformSubdivFlag,
    QtCbf,
    QtRootCbf,
    CoeffNxN,
    IpcmInfo,
    IlluminationCompensationFlag,
    ResidualPredictionFlag,
    SdcFlag,
    SdcResidual,
    SdcPredMode,
}

/// HEVC 高层语法编码器
///
/// 每次编码借用一个比特汇与一份只读配置. 结构写到一半出错时, 调用方应丢弃已写出的 RBSP.
pub struct HevcSyntaxEncoder<'a> {
    pub(super) w: SyntaxWriter<'a>,
    pub(super) config: &'a HevcSyntaxConfig,
}

impl<'a> HevcSyntaxEncoder<'a> {
    pub fn new(sink: &'a mut dyn BitSink, config: &'a HevcSyntaxConfig) -> Self {
        Self {
            w: SyntaxWriter::new(sink),
            config,
        }
    }

    /// 创建带语法追踪的编码器
    pub fn with_trace(
        sink: &'a mut dyn BitSink,
        trace: &'a mut dyn SyntaxTrace,
        config: &'a HevcSyntaxConfig,
    ) -> Self {
        Self {
            w: SyntaxWriter::with_trace(sink, trace),
            config,
        }
    }

    pub fn config(&self) -> &HevcSyntaxConfig {
        self.config
    }

    pub fn bits_written(&self) -> usize {
        self.w.bits_written()
    }

    /// 直接访问底层语法写入器
    pub fn writer(&mut self) -> &mut SyntaxWriter<'a> {
        &mut self.w
    }

    pub fn supports(&self, capability: SyntaxCapability) -> bool {
        capability == SyntaxCapability::HighLevelSyntax
    }

    pub fn require(&self, capability: SyntaxCapability) -> TaoResult<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(TaoError::NotImplemented(format!(
                "CAVLC 语法编码器不提供 {:?}",
                capability
            )))
        }
    }

    /// 块级语法入口, 始终返回未实现
    pub fn encode_block_element(&mut self, element: BlockSyntaxElement) -> TaoResult<()> {
        self.require(SyntaxCapability::BlockSyntax)?;
        Err(TaoError::NotImplemented(format!("块级语法 {:?}", element)))
    }

    pub fn write_rbsp_trailing_bits(&mut self) {
        self.w.write_rbsp_trailing_bits();
    }

    // ============================================================
    // Tile 标记
    // ============================================================

    /// 写入 tile 标记
    pub fn write_tile_marker(&mut self, tile_idx: u32, bits_used: u32) -> TaoResult<()> {
        self.w.write_code(tile_idx, bits_used, "tile_idx_marker")
    }

    /// 写入 tile 标记标志, 仅独立 slice 写
    pub fn encode_tile_marker_flag(&mut self, slice: &SliceHeader) {
        if slice.is_next_slice {
            self.w.write_flag(slice.tile_marker_flag, "tile_marker_flag");
        }
    }

    // ============================================================
    // CU 级 QP 与环路滤波辅助
    // ============================================================

    /// CU delta QP, 回绕到 QP 有效范围
    pub fn encode_delta_qp(&mut self, delta_qp: i32, qp_bd_offset_y: i32) -> TaoResult<()> {
        let wrapped = (delta_qp + 78 + qp_bd_offset_y + qp_bd_offset_y / 2) % (52 + qp_bd_offset_y)
            - 26
            - qp_bd_offset_y / 2;
        self.w.write_svlc(wrapped, "cu_qp_delta")
    }

    /// SAO run, 位宽由最大值的最高有效位决定
    pub fn encode_sao_run(&mut self, run: u32, max_value: u32) -> TaoResult<()> {
        if max_value == 0 {
            return Ok(());
        }
        if run > max_value {
            return Err(TaoError::InvalidArgument(format!(
                "SAO run {} 大于上限 {}",
                run, max_value
            )));
        }
        self.w.write_code(run, bit_length(max_value), "sao_run_diff")
    }

    /// ALF 定长索引, 位宽由最大值决定, 最大值为 0 时不写
    pub fn encode_alf_fixed_length_idx(&mut self, idx: u32, max_value: u32) -> TaoResult<()> {
        if idx > max_value {
            return Err(TaoError::InvalidArgument(format!(
                "ALF 索引 {} 大于上限 {}",
                idx, max_value
            )));
        }
        let length = bit_length(max_value);
        if length > 0 {
            self.w.write_code(idx, length, "alf_fixed_length_idx")?;
        }
        Ok(())
    }

    pub fn encode_alf_flag(&mut self, flag: bool) {
        self.w.write_flag(flag, "alf_flag");
    }

    pub fn encode_alf_uvlc(&mut self, value: u32) -> TaoResult<()> {
        self.w.write_uvlc(value, "alf_uvlc")
    }

    pub fn encode_alf_svlc(&mut self, value: i32) -> TaoResult<()> {
        self.w.write_svlc(value, "alf_svlc")
    }

    /// ALF 控制标志, `max_depth` 为 `None` 时 ALF 控制关闭
    pub fn encode_alf_ctrl_flag(&mut self, flag: bool, max_depth: Option<u32>) {
        if max_depth.is_some() {
            self.w.write_flag(flag, "alf_ctrl_flag");
        }
    }

    /// ALF 控制深度, ALF 控制关闭时不写
    pub fn encode_alf_ctrl_depth(&mut self, max_depth: Option<u32>) -> TaoResult<()> {
        match max_depth {
            Some(depth) => self.w.write_uvlc(depth, "alf_ctrl_depth"),
            None => Ok(()),
        }
    }

    pub fn encode_sao_flag(&mut self, flag: bool) {
        self.w.write_flag(flag, "sao_flag");
    }

    pub fn encode_sao_uvlc(&mut self, value: u32) -> TaoResult<()> {
        self.w.write_uvlc(value, "sao_uvlc")
    }

    pub fn encode_sao_svlc(&mut self, value: i32) -> TaoResult<()> {
        self.w.write_svlc(value, "sao_svlc")
    }

    pub fn encode_deblocking_flag(&mut self, flag: bool, name: &'static str) {
        self.w.write_flag(flag, name);
    }

    pub fn encode_deblocking_svlc(&mut self, value: i32, name: &'static str) -> TaoResult<()> {
        self.w.write_svlc(value, name)
    }
}

/// 最高有效位的位置 (从 1 开始), 0 返回 0
fn bit_length(value: u32) -> u32 {
    32 - value.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tao_core::{BitReader, BitWriter};

    fn run(f: impl FnOnce(&mut HevcSyntaxEncoder) -> TaoResult<()>) -> TaoResult<(Vec<u8>, usize)> {
        let cfg = HevcSyntaxConfig::default();
        let mut bw = BitWriter::new();
        let bits = {
            let mut enc = HevcSyntaxEncoder::new(&mut bw, &cfg);
            f(&mut enc)?;
            enc.bits_written()
        };
        Ok((bw.finish(), bits))
    }

    #[test]
    fn test_capabilities() {
        let cfg = HevcSyntaxConfig::default();
        let mut bw = BitWriter::new();
        let mut enc = HevcSyntaxEncoder::new(&mut bw, &cfg);
        assert!(enc.supports(SyntaxCapability::HighLevelSyntax));
        assert!(!enc.supports(SyntaxCapability::BlockSyntax));
        assert!(enc.require(SyntaxCapability::HighLevelSyntax).is_ok());
        let err = enc.encode_block_element(BlockSyntaxElement::CoeffNxN).unwrap_err();
        assert!(matches!(err, TaoError::NotImplemented(_)));
        assert_eq!(enc.bits_written(), 0);
    }

    #[test]
    fn test_bit_length() {
        assert_eq!(bit_length(0), 0);
        assert_eq!(bit_length(1), 1);
        assert_eq!(bit_length(5), 3);
        assert_eq!(bit_length(8), 4);
        assert_eq!(bit_length(u32::MAX), 32);
    }

    #[test]
    fn test_sao_run_width() {
        let (_, bits) = run(|enc| enc.encode_sao_run(3, 5)).unwrap();
        assert_eq!(bits, 3);
        let (_, bits) = run(|enc| enc.encode_sao_run(0, 0)).unwrap();
        assert_eq!(bits, 0, "最大值为 0 时不写");
        assert!(run(|enc| enc.encode_sao_run(6, 5)).is_err());
    }

    #[test]
    fn test_alf_fixed_length_idx() {
        let (data, bits) = run(|enc| enc.encode_alf_fixed_length_idx(2, 15)).unwrap();
        assert_eq!(bits, 4);
        assert_eq!(data, vec![0b0010_0000]);
        let (_, bits) = run(|enc| enc.encode_alf_fixed_length_idx(0, 0)).unwrap();
        assert_eq!(bits, 0);
    }

    #[test]
    fn test_delta_qp_wraps_into_range() {
        // 8 位: 偏移 0, (dqp + 78) % 52 - 26
        let (data, _) = run(|enc| {
            enc.encode_delta_qp(3, 0)?;
            enc.encode_delta_qp(-30, 0)?;
            enc.encode_delta_qp(27, 0)
        })
        .unwrap();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_se().unwrap(), 3);
        assert_eq!(br.read_se().unwrap(), 22);
        assert_eq!(br.read_se().unwrap(), -25);

        // 10 位: 偏移 12, 范围 [-32, 31]
        let (data, _) = run(|enc| enc.encode_delta_qp(-32, 12)).unwrap();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_se().unwrap(), -32);
    }

    #[test]
    fn test_alf_ctrl_only_when_enabled() {
        let (_, bits) = run(|enc| {
            enc.encode_alf_ctrl_flag(true, None);
            enc.encode_alf_ctrl_depth(None)
        })
        .unwrap();
        assert_eq!(bits, 0);
        let (_, bits) = run(|enc| {
            enc.encode_alf_ctrl_flag(true, Some(2));
            enc.encode_alf_ctrl_depth(Some(2))
        })
        .unwrap();
        assert_eq!(bits, 1 + 3);
    }

    #[test]
    fn test_tile_marker_flag_only_for_independent_slices() {
        let mut slice = SliceHeader {
            is_next_slice: false,
            tile_marker_flag: true,
            ..Default::default()
        };
        let (_, bits) = run(|enc| {
            enc.encode_tile_marker_flag(&slice);
            Ok(())
        })
        .unwrap();
        assert_eq!(bits, 0);
        slice.is_next_slice = true;
        let (data, bits) = run(|enc| {
            enc.encode_tile_marker_flag(&slice);
            enc.write_tile_marker(5, 4)
        })
        .unwrap();
        assert_eq!(bits, 5);
        assert_eq!(data, vec![0b1010_1000]);
    }
}
