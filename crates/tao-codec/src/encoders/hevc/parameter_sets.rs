//! VPS / SPS / PPS / APS 数据模型.
//!
//! 参数集由上层编码器按序列配置构造, 编码时只读借用.
//! 两个派生字段 (SPS 并行模式, VPS 操作点) 必须先由 `finalize_derived_fields` 计算.

use tao_core::{TaoError, TaoResult};

use super::rps::ReferencePictureSet;
use super::slice_header::SliceType;

/// VPS 扩展类型: 多视点
pub const VPS_EXTENSION_TYPE_MULTI_VIEW: u32 = 0;

// ============================================================
// 共用子结构
// ============================================================

/// 每个时域层的 DPB 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DpbParams {
    pub max_dec_pic_buffering: u32,
    pub num_reorder_pics: u32,
    pub max_latency_increase: u32,
}

/// Tile 划分
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TileLayout {
    pub num_columns_minus1: u32,
    pub num_rows_minus1: u32,
    pub uniform_spacing: bool,
    /// 非均匀划分时前 `num_columns_minus1` 列的宽度
    pub column_widths: Vec<u32>,
    /// 非均匀划分时前 `num_rows_minus1` 行的高度
    pub row_heights: Vec<u32>,
    pub loop_filter_across_tiles: bool,
}

impl TileLayout {
    pub fn is_split(&self) -> bool {
        self.num_columns_minus1 != 0 || self.num_rows_minus1 != 0
    }
}

/// 相机参数 (按参考视点 id 索引)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CameraParameters {
    pub coded_scale: Vec<i32>,
    pub coded_offset: Vec<i32>,
    pub inv_coded_scale: Vec<i32>,
    pub inv_coded_offset: Vec<i32>,
}

impl CameraParameters {
    pub(crate) fn check_len(&self, count: usize) -> TaoResult<()> {
        let lens = [
            self.coded_scale.len(),
            self.coded_offset.len(),
            self.inv_coded_scale.len(),
            self.inv_coded_offset.len(),
        ];
        if lens.iter().any(|&l| l < count) {
            return Err(TaoError::InvalidArgument(format!(
                "相机参数: 需要 {} 组, 实际 {:?}",
                count, lens
            )));
        }
        Ok(())
    }
}

/// PCM 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParams {
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub log2_min_size: u32,
    pub log2_max_size: u32,
    pub loop_filter_disable: bool,
}

/// 图像裁剪偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PicCropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// 并行方式 (tiles_or_entropy_coding_sync_idc)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelMode {
    None,
    Tiles,
    Wavefront,
}

impl ParallelMode {
    pub fn idc(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Tiles => 1,
            Self::Wavefront => 2,
        }
    }
}

// ============================================================
// VPS
// ============================================================

/// VPS 中单个层的描述
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VpsLayer {
    pub dependent: bool,
    /// 依赖的参考层索引 (小于本层索引)
    pub dependent_layer: u32,
    pub view_id: u32,
    pub depth_flag: bool,
    pub view_order_idx: i32,
    /// 直接参考层 id (操作点形式)
    pub direct_ref_layer_ids: Vec<u32>,
}

/// 操作点 (派生字段)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationPoints {
    pub num_additional_layer_operation_points: u32,
    pub num_additional_profile_level_sets: u32,
    /// 每个附加操作点包含的层 id
    pub layer_ids: Vec<Vec<u32>>,
}

/// 视频参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vps {
    pub vps_id: u32,
    pub max_t_layers: u32,
    pub max_layers: u32,
    pub temporal_nesting: bool,
    /// 长度为 `max_t_layers`
    pub dpb: Vec<DpbParams>,
    pub extension_type: u32,
    /// 长度为 `max_layers`, 索引 0 为基础层
    pub layers: Vec<VpsLayer>,
    pub inter_view_vector_scaling: bool,
    pub num_hrd_parameters: u32,
    operation_points: Option<OperationPoints>,
}

impl Default for Vps {
    fn default() -> Self {
        Self {
            vps_id: 0,
            max_t_layers: 1,
            max_layers: 1,
            temporal_nesting: true,
            dpb: vec![DpbParams::default()],
            extension_type: VPS_EXTENSION_TYPE_MULTI_VIEW,
            layers: vec![VpsLayer::default()],
            inter_view_vector_scaling: false,
            num_hrd_parameters: 0,
            operation_points: None,
        }
    }
}

impl Vps {
    /// 计算操作点
    ///
    /// 三层时有 3 个附加操作点, 前两个含两层, 最后一个含三层, 第二个操作点的第二层为层 2;
    /// 其他情况只有一个包含全部层的操作点.
    pub fn finalize_derived_fields(&mut self) {
        let three_layers = self.max_layers == 3;
        let count: u32 = if three_layers { 3 } else { 1 };
        let layer_ids: Vec<Vec<u32>> = (1..=count)
            .map(|i| {
                let num_minus1 = if three_layers {
                    if i < count { 1 } else { 2 }
                } else {
                    self.max_layers.saturating_sub(1)
                };
                (0..=num_minus1)
                    .map(|j| if three_layers && i == 2 && j == 1 { 2 } else { j })
                    .collect::<Vec<u32>>()
            })
            .collect();
        self.operation_points = Some(OperationPoints {
            num_additional_layer_operation_points: count,
            num_additional_profile_level_sets: 1,
            layer_ids,
        });
    }

    pub fn operation_points(&self) -> TaoResult<&OperationPoints> {
        self.operation_points.as_ref().ok_or_else(|| {
            TaoError::InvalidArgument("VPS: 操作点尚未计算, 需先调用 finalize_derived_fields".into())
        })
    }

    pub(crate) fn check(&self) -> TaoResult<()> {
        if self.max_t_layers == 0 || self.dpb.len() != self.max_t_layers as usize {
            return Err(TaoError::InvalidArgument(format!(
                "VPS: max_t_layers {} 与 DPB 参数数 {} 不一致",
                self.max_t_layers,
                self.dpb.len()
            )));
        }
        if self.max_layers == 0 || self.layers.len() != self.max_layers as usize {
            return Err(TaoError::InvalidArgument(format!(
                "VPS: max_layers {} 与层描述数 {} 不一致",
                self.max_layers,
                self.layers.len()
            )));
        }
        Ok(())
    }
}

// ============================================================
// SPS
// ============================================================

/// 多视点/深度扩展字段
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpsMultiView {
    /// 可用视点间参考 (相对 view id, 递减的负数)
    pub inter_view_refs: Vec<i32>,
    pub use_dmm: bool,
    pub use_mvi: bool,
    pub use_qtlpc: bool,
    pub use_dlt: bool,
    pub depth_values: Vec<u32>,
    pub view_id: u32,
    pub is_depth: bool,
    pub view_order_idx: i32,
    pub camera_parameter_precision: u32,
    pub camera_parameters_in_slice_header: bool,
    pub camera_parameters: CameraParameters,
    pub pred_depth_map_generation: u32,
    pub pdm_precision: u32,
    pub pdm_scale_nom_delta: Vec<i32>,
    pub pdm_offset: Vec<i32>,
    pub multiview_mv_pred_mode: u32,
    pub multiview_res_pred_mode: bool,
}

/// 序列参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub profile_idc: u32,
    pub level_idc: u32,
    pub sps_id: u32,
    pub vps_id: u32,
    pub chroma_format_idc: u32,
    pub max_t_layers: u32,
    pub pic_width: u32,
    pub pic_height: u32,
    pub cropping: Option<PicCropping>,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub pcm: Option<PcmParams>,
    pub lossless: bool,
    pub bits_for_poc: u32,
    /// 长度为 `max_t_layers`
    pub dpb: Vec<DpbParams>,
    pub max_cu_width: u32,
    pub max_cu_height: u32,
    pub max_cu_depth: u32,
    /// 为最小 TU 额外增加的 CU 深度
    pub add_cu_depth: u32,
    pub restricted_ref_pic_lists: bool,
    pub lists_modification_present: bool,
    pub tu_log2_min_size: u32,
    pub tu_log2_max_size: u32,
    pub disable_inter_4x4: bool,
    pub tu_max_depth_inter: u32,
    pub tu_max_depth_intra: u32,
    pub scaling_list_enabled: bool,
    pub lm_chroma: bool,
    /// deblocking_filter_in_aps_enabled_flag
    pub use_df: bool,
    pub loop_filter_across_slices: bool,
    pub amp: bool,
    pub nsqt: bool,
    pub sao: bool,
    pub alf: bool,
    pub alf_coef_in_slice: bool,
    pub temporal_id_nesting: bool,
    pub rps_list: Vec<ReferencePictureSet>,
    pub long_term_refs_present: bool,
    /// 每个 CU 深度的 AMVP 模式, 长度为 `max_cu_depth`
    pub amvp_mode: Vec<bool>,
    pub tiles: TileLayout,
    pub num_substreams: u32,
    pub multiview: SpsMultiView,
    parallel_mode: Option<ParallelMode>,
}

impl Default for Sps {
    fn default() -> Self {
        Self {
            profile_idc: 1,
            level_idc: 0,
            sps_id: 0,
            vps_id: 0,
            chroma_format_idc: 1,
            max_t_layers: 1,
            pic_width: 416,
            pic_height: 240,
            cropping: None,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
            pcm: None,
            lossless: false,
            bits_for_poc: 8,
            dpb: vec![DpbParams::default()],
            max_cu_width: 64,
            max_cu_height: 64,
            max_cu_depth: 4,
            add_cu_depth: 1,
            restricted_ref_pic_lists: false,
            lists_modification_present: false,
            tu_log2_min_size: 2,
            tu_log2_max_size: 5,
            disable_inter_4x4: true,
            tu_max_depth_inter: 3,
            tu_max_depth_intra: 3,
            scaling_list_enabled: false,
            lm_chroma: false,
            use_df: false,
            loop_filter_across_slices: true,
            amp: true,
            nsqt: false,
            sao: false,
            alf: false,
            alf_coef_in_slice: false,
            temporal_id_nesting: false,
            rps_list: Vec::new(),
            long_term_refs_present: false,
            amvp_mode: vec![true; 4],
            tiles: TileLayout::default(),
            num_substreams: 1,
            multiview: SpsMultiView::default(),
            parallel_mode: None,
        }
    }
}

impl Sps {
    /// 计算并缓存并行方式: 有 tile 划分为 Tiles, 否则多于一个子流为 Wavefront
    pub fn finalize_derived_fields(&mut self) -> ParallelMode {
        let mode = if self.tiles.is_split() {
            ParallelMode::Tiles
        } else if self.num_substreams > 1 {
            ParallelMode::Wavefront
        } else {
            ParallelMode::None
        };
        self.parallel_mode = Some(mode);
        mode
    }

    pub fn parallel_mode(&self) -> TaoResult<ParallelMode> {
        self.parallel_mode.ok_or_else(|| {
            TaoError::InvalidArgument("SPS: 并行方式尚未计算, 需先调用 finalize_derived_fields".into())
        })
    }

    /// 亮度 QP 的位深偏移
    pub fn qp_bd_offset_y(&self) -> i32 {
        6 * (self.bit_depth_luma as i32 - 8)
    }

    /// 内部位深下的样本最大值, 取亮度位深
    ///
    /// 加权预测的色度偏移也以此为界, 与色度位深无关.
    pub fn max_internal_sample(&self) -> i32 {
        (1i32 << self.bit_depth_luma.min(30)) - 1
    }

    /// 最小 CU 尺寸的 log2
    pub fn log2_min_cu_size(&self) -> TaoResult<u32> {
        let depth = self.max_cu_depth.checked_sub(self.add_cu_depth).ok_or_else(|| {
            TaoError::InvalidArgument(format!(
                "SPS: add_cu_depth {} 大于 max_cu_depth {}",
                self.add_cu_depth, self.max_cu_depth
            ))
        })?;
        let min_cu = self.max_cu_width.checked_shr(depth).unwrap_or(0);
        if min_cu < 8 {
            return Err(TaoError::InvalidArgument(format!(
                "SPS: 最小 CU 尺寸 {} 小于 8",
                min_cu
            )));
        }
        Ok(31 - min_cu.leading_zeros())
    }
}

// ============================================================
// PPS / APS
// ============================================================

/// 图像参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    pub pps_id: u32,
    pub sps_id: u32,
    pub sign_hide: bool,
    pub sign_hiding_threshold: u32,
    pub cabac_init_present: bool,
    /// 编码器选定的 CABAC 初始化表, B 表示不切换
    pub enc_cabac_table_idx: SliceType,
    pub entropy_coding_mode: bool,
    pub pic_init_qp_minus26: i32,
    pub constrained_intra_pred: bool,
    pub enable_tmvp: bool,
    pub slice_granularity: u32,
    pub max_cu_dqp_depth: u32,
    pub use_dqp: bool,
    pub chroma_qp_offset: i32,
    pub chroma_qp_offset_2nd: i32,
    pub use_wp: bool,
    pub wp_bipred_idc: u32,
    pub output_flag_present: bool,
    pub tile_info_present: bool,
    pub tile_control_present: bool,
    pub tiles: TileLayout,
    pub num_substreams: u32,
    pub deblocking_filter_control_present: bool,
    pub log2_parallel_merge_level_minus2: u32,
}

impl Default for Pps {
    fn default() -> Self {
        Self {
            pps_id: 0,
            sps_id: 0,
            sign_hide: false,
            sign_hiding_threshold: 4,
            cabac_init_present: false,
            enc_cabac_table_idx: SliceType::B,
            entropy_coding_mode: true,
            pic_init_qp_minus26: 0,
            constrained_intra_pred: false,
            enable_tmvp: true,
            slice_granularity: 0,
            max_cu_dqp_depth: 0,
            use_dqp: false,
            chroma_qp_offset: 0,
            chroma_qp_offset_2nd: 0,
            use_wp: false,
            wp_bipred_idc: 0,
            output_flag_present: false,
            tile_info_present: false,
            tile_control_present: false,
            tiles: TileLayout::default(),
            num_substreams: 1,
            deblocking_filter_control_present: false,
            log2_parallel_merge_level_minus2: 0,
        }
    }
}

/// 自适应参数集 (仅头部)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aps {
    pub aps_id: u32,
    pub scaling_list_enabled: bool,
    pub loop_filter_offset_in_aps: bool,
}
