//! 语法开关配置.
//!
//! 多视点/深度扩展的各个工具在不同构建中开启或关闭, 会改变参数集和 slice header 的语法.
//! 这里把所有开关集中到一个 [`HevcSyntaxConfig`], 编码时以只读方式借用.

/// VPS 语法形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VpsSyntax {
    /// 层依赖形式: 依赖层与 view id 扩展, SPS 中携带 VPS id
    #[default]
    LayerDependency,
    /// 操作点形式: 定长头部与操作点列表, SPS 不写多视点扩展, slice 中 PPS id 固定为 0
    MultiViewOperationPoints,
}

/// HEVC 高层语法编码配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcSyntaxConfig {
    pub vps_syntax: VpsSyntax,
    /// PPS 中的 cabac_init_present_flag 与 slice 中的 cabac_init_flag
    /// (关闭时 slice 写 cabac_init_idc)
    pub cabac_init_flag: bool,
    /// SPS 中的 qpprime_y_zero_transquant_bypass_flag
    pub lossless_coding: bool,
    /// slice 中的 collocated_ref_idx
    pub collocated_ref_idx: bool,
    /// VPS 中的 inter_view_vector_scaling_flag
    pub inter_view_vector_scaling: bool,
    /// 光照补偿
    pub illumination_compensation: bool,
    /// 深度图也可使用光照补偿
    pub illumination_compensation_depth: bool,
    /// 光照补偿的 skip 解析标志
    pub ic_skip_parse: bool,
    /// IDR 字段只在 view 0 出现, 非 0 视点的 IDR/CRA 不写 RPS
    pub idr_view_restriction: bool,
    /// 加权预测表出现条件放宽为 weighted_bipred_idc != 0
    pub weighted_prediction_3d_fix: bool,
    /// 深度建模模式
    pub dmm: bool,
    /// 运动参数继承 (MPI)
    pub motion_parameter_inheritance: bool,
    /// 四叉树受限预测 (QTL)
    pub quadtree_limited_prediction: bool,
    /// 简化深度编码与深度查找表 (SDC/DLT)
    pub sdc_dlt: bool,
    /// 相机参数只在非基础视点写入
    pub camera_parameter_fix: bool,
    /// 预测深度图生成
    pub depth_map_generation: bool,
    /// 视点间运动预测
    pub inter_view_motion_prediction: bool,
    /// 视点间残差预测
    pub inter_view_residual_prediction: bool,
    /// 深度图的 merge 纹理候选
    pub depth_merge_texture_candidate: bool,
}

impl Default for HevcSyntaxConfig {
    /// 多视点加深度测试模型的默认构建
    fn default() -> Self {
        Self {
            vps_syntax: VpsSyntax::LayerDependency,
            cabac_init_flag: true,
            lossless_coding: true,
            collocated_ref_idx: true,
            inter_view_vector_scaling: true,
            illumination_compensation: true,
            illumination_compensation_depth: true,
            ic_skip_parse: true,
            idr_view_restriction: true,
            weighted_prediction_3d_fix: true,
            dmm: true,
            motion_parameter_inheritance: true,
            quadtree_limited_prediction: true,
            sdc_dlt: true,
            camera_parameter_fix: true,
            depth_map_generation: false,
            inter_view_motion_prediction: true,
            inter_view_residual_prediction: true,
            depth_merge_texture_candidate: true,
        }
    }
}

impl HevcSyntaxConfig {
    /// 只保留单层语法相关开关, 关闭全部多视点/深度工具
    pub fn base_profile() -> Self {
        Self {
            vps_syntax: VpsSyntax::LayerDependency,
            cabac_init_flag: true,
            lossless_coding: true,
            collocated_ref_idx: true,
            inter_view_vector_scaling: false,
            illumination_compensation: false,
            illumination_compensation_depth: false,
            ic_skip_parse: false,
            idr_view_restriction: false,
            weighted_prediction_3d_fix: false,
            dmm: false,
            motion_parameter_inheritance: false,
            quadtree_limited_prediction: false,
            sdc_dlt: false,
            camera_parameter_fix: false,
            depth_map_generation: false,
            inter_view_motion_prediction: false,
            inter_view_residual_prediction: false,
            depth_merge_texture_candidate: false,
        }
    }

    /// 额外的 merge 候选数
    pub(crate) fn extra_merge_candidates(&self, use_mvi: bool, mv_pred_mode: bool, is_depth: bool) -> u32 {
        let extra = match (
            self.motion_parameter_inheritance,
            self.inter_view_motion_prediction,
        ) {
            (true, true) => use_mvi || mv_pred_mode,
            (true, false) => use_mvi,
            (false, true) if self.depth_merge_texture_candidate => is_depth || mv_pred_mode,
            (false, true) => mv_pred_mode,
            (false, false) => false,
        };
        u32::from(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_multiview_build() {
        let cfg = HevcSyntaxConfig::default();
        assert_eq!(cfg.vps_syntax, VpsSyntax::LayerDependency);
        assert!(cfg.dmm && cfg.sdc_dlt && cfg.inter_view_motion_prediction);
        assert!(!cfg.depth_map_generation, "预测深度图生成默认关闭");
    }

    #[test]
    fn test_base_profile_disables_multiview_tools() {
        let cfg = HevcSyntaxConfig::base_profile();
        assert!(cfg.cabac_init_flag);
        assert!(!cfg.illumination_compensation);
        assert!(!cfg.motion_parameter_inheritance);
        assert_eq!(cfg.extra_merge_candidates(true, true, true), 0);
    }

    #[test]
    fn test_extra_merge_candidates() {
        let mut cfg = HevcSyntaxConfig::default();
        assert_eq!(cfg.extra_merge_candidates(false, false, false), 0);
        assert_eq!(cfg.extra_merge_candidates(true, false, false), 1);
        assert_eq!(cfg.extra_merge_candidates(false, true, false), 1);

        cfg.motion_parameter_inheritance = false;
        assert_eq!(cfg.extra_merge_candidates(true, false, false), 0);
        assert_eq!(cfg.extra_merge_candidates(false, false, true), 1);

        cfg.depth_merge_texture_candidate = false;
        assert_eq!(cfg.extra_merge_candidates(false, false, true), 0);
        assert_eq!(cfg.extra_merge_candidates(false, true, false), 1);
    }
}
