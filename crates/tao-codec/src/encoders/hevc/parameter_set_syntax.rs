//! 参数集语法: VPS, SPS, PPS, APS 头部.

use log::debug;
use tao_core::{TaoError, TaoResult};

use super::config::VpsSyntax;
use super::encoder::HevcSyntaxEncoder;
use super::parameter_sets::{
    Aps, CameraParameters, DpbParams, ParallelMode, Pps, Sps, TileLayout, VPS_EXTENSION_TYPE_MULTI_VIEW,
    Vps,
};

fn checked_minus(value: u32, sub: u32, name: &str) -> TaoResult<u32> {
    value.checked_sub(sub).ok_or_else(|| {
        TaoError::InvalidArgument(format!("{}: 值 {} 小于 {}", name, value, sub))
    })
}

impl HevcSyntaxEncoder<'_> {
    // ============================================================
    // VPS
    // ============================================================

    /// 编码 VPS, 语法形式由配置决定
    pub fn encode_vps(&mut self, vps: &Vps) -> TaoResult<()> {
        vps.check()?;
        self.w.begin_structure("Video Parameter Set");
        match self.config.vps_syntax {
            VpsSyntax::LayerDependency => self.encode_vps_layer_dependency(vps)?,
            VpsSyntax::MultiViewOperationPoints => self.encode_vps_operation_points(vps)?,
        }
        debug!("VPS {} 编码完成: {} 层", vps.vps_id, vps.max_layers);
        Ok(())
    }

    fn encode_vps_dpb(&mut self, dpb: &[DpbParams]) -> TaoResult<()> {
        for p in dpb {
            self.w.write_uvlc(p.max_dec_pic_buffering, "max_dec_pic_buffering[i]")?;
            self.w.write_uvlc(p.num_reorder_pics, "num_reorder_pics[i]")?;
            self.w.write_uvlc(p.max_latency_increase, "max_latency_increase[i]")?;
        }
        Ok(())
    }

    fn encode_vps_layer_dependency(&mut self, vps: &Vps) -> TaoResult<()> {
        let w = &mut self.w;
        w.write_code(vps.max_t_layers - 1, 3, "max_temporal_layers_minus1")?;
        w.write_code(vps.max_layers - 1, 5, "max_layers_minus1")?;
        w.write_flag(!vps.temporal_nesting, "temporal_id_nesting_flag");
        w.write_uvlc(vps.vps_id, "video_parameter_set_id")?;
        self.encode_vps_dpb(&vps.dpb)?;

        let w = &mut self.w;
        w.write_code(1, 1, "bit_equal_to_one")?;

        if vps.max_layers > 1 {
            w.write_uvlc(vps.extension_type, "extension_type")?;
            for (i, layer) in vps.layers.iter().enumerate().skip(1) {
                w.write_flag(layer.dependent, "dependent_flag[i]");
                if !layer.dependent {
                    continue;
                }
                let delta = (i as u32)
                    .checked_sub(layer.dependent_layer + 1)
                    .ok_or_else(|| {
                        TaoError::InvalidArgument(format!(
                            "VPS: 层 {} 依赖的参考层 {} 不在其之前",
                            i, layer.dependent_layer
                        ))
                    })?;
                w.write_uvlc(delta, "delta_reference_layer_id_minus1[i]")?;
                if vps.extension_type == VPS_EXTENSION_TYPE_MULTI_VIEW {
                    w.write_uvlc(layer.view_id, "view_id[i]")?;
                    w.write_flag(layer.depth_flag, "depth_flag[i]");
                    w.write_svlc(layer.view_order_idx, "view_order_idx[i]")?;
                }
            }
            if self.config.inter_view_vector_scaling {
                w.write_flag(vps.inter_view_vector_scaling, "inter_view_vector_scaling_flag");
            }
        }

        w.write_flag(false, "vps_extension_flag");
        Ok(())
    }

    fn encode_vps_operation_points(&mut self, vps: &Vps) -> TaoResult<()> {
        let op = vps.operation_points()?;
        if vps.num_hrd_parameters != 0 {
            return Err(TaoError::InvalidArgument(format!(
                "VPS: 不支持 HRD 参数 (vps_num_hrd_parameters = {})",
                vps.num_hrd_parameters
            )));
        }

        let w = &mut self.w;
        w.write_code(vps.vps_id, 4, "video_parameter_set_id")?;
        w.write_flag(!vps.temporal_nesting, "temporal_id_nesting_flag");
        w.write_code(0, 2, "vps_reserved_zero_2bits")?;
        w.write_code(vps.max_layers - 1, 6, "vps_max_layers_minus1")?;
        w.write_code(vps.max_t_layers - 1, 3, "vps_max_sub_layers_minus1")?;
        w.write_code(0, 12, "vps_extension_offset")?;
        self.encode_vps_dpb(&vps.dpb)?;

        let w = &mut self.w;
        w.write_uvlc(vps.num_hrd_parameters, "vps_num_hrd_parameters")?;
        w.write_code(1, 1, "bit_equal_to_one")?;
        w.align_with_ones();

        w.write_code(
            op.num_additional_layer_operation_points,
            8,
            "num_additional_layer_operation_points",
        )?;
        w.write_code(
            op.num_additional_profile_level_sets,
            8,
            "num_additional_profile_level_sets",
        )?;
        for (i, layer) in vps.layers.iter().enumerate() {
            w.write_code(0, 4, "num_types_zero_4bits[i]")?;
            w.write_code(0, 4, "type_zero_4bits[i]")?;
            w.write_code(layer.view_id, 8, "view_id[i]")?;
            if i > 0 {
                w.write_code(
                    layer.direct_ref_layer_ids.len() as u32,
                    6,
                    "num_direct_ref_layers[ i ]",
                )?;
                for &id in &layer.direct_ref_layer_ids {
                    w.write_code(id, 6, "ref_layer_id[i][j]")?;
                }
            }
        }
        for ids in &op.layer_ids {
            let num_minus1 = (ids.len() as u32).checked_sub(1).ok_or_else(|| {
                TaoError::InvalidArgument("VPS: 操作点不能为空".into())
            })?;
            w.write_uvlc(num_minus1, "op_num_layer_id_values_minus1[ opIdx ]")?;
            for &id in ids {
                w.write_uvlc(id, "op_layer_id[ opIdx ][ i ]")?;
            }
        }
        Ok(())
    }

    // ============================================================
    // SPS
    // ============================================================

    /// 编码 SPS
    pub fn encode_sps(&mut self, sps: &Sps) -> TaoResult<()> {
        let mode = sps.parallel_mode()?;
        if sps.max_t_layers == 0 || sps.dpb.len() != sps.max_t_layers as usize {
            return Err(TaoError::InvalidArgument(format!(
                "SPS: max_t_layers {} 与 DPB 参数数 {} 不一致",
                sps.max_t_layers,
                sps.dpb.len()
            )));
        }
        if sps.max_cu_width != sps.max_cu_height {
            return Err(TaoError::InvalidArgument(format!(
                "SPS: 最大 CU 宽高不一致 ({}x{})",
                sps.max_cu_width, sps.max_cu_height
            )));
        }
        if sps.amvp_mode.len() != sps.max_cu_depth as usize {
            return Err(TaoError::InvalidArgument(format!(
                "SPS: AMVP 模式数 {} 与 max_cu_depth {} 不一致",
                sps.amvp_mode.len(),
                sps.max_cu_depth
            )));
        }
        let log2_min_cu = sps.log2_min_cu_size()?;

        self.w.begin_structure("Sequence Parameter Set");
        let w = &mut self.w;
        w.write_code(sps.profile_idc, 8, "profile_idc")?;
        w.write_code(0, 8, "reserved_zero_8bits")?;
        w.write_code(sps.level_idc, 8, "level_idc")?;
        w.write_uvlc(sps.sps_id, "seq_parameter_set_id")?;
        if self.config.vps_syntax == VpsSyntax::LayerDependency {
            w.write_uvlc(sps.vps_id, "video_parameter_set_id")?;
        }
        w.write_uvlc(sps.chroma_format_idc, "chroma_format_idc")?;
        w.write_code(sps.max_t_layers - 1, 3, "max_temporal_layers_minus1")?;
        w.write_uvlc(sps.pic_width, "pic_width_in_luma_samples")?;
        w.write_uvlc(sps.pic_height, "pic_height_in_luma_samples")?;
        w.write_flag(sps.cropping.is_some(), "pic_cropping_flag");
        if let Some(crop) = &sps.cropping {
            w.write_uvlc(crop.left, "pic_crop_left_offset")?;
            w.write_uvlc(crop.right, "pic_crop_right_offset")?;
            w.write_uvlc(crop.top, "pic_crop_top_offset")?;
            w.write_uvlc(crop.bottom, "pic_crop_bottom_offset")?;
        }

        w.write_uvlc(checked_minus(sps.bit_depth_luma, 8, "bit_depth_luma")?, "bit_depth_luma_minus8")?;
        w.write_uvlc(
            checked_minus(sps.bit_depth_chroma, 8, "bit_depth_chroma")?,
            "bit_depth_chroma_minus8",
        )?;

        w.write_flag(sps.pcm.is_some(), "pcm_enabled_flag");
        if let Some(pcm) = &sps.pcm {
            w.write_code(checked_minus(pcm.bit_depth_luma, 1, "pcm_bit_depth_luma")?, 4, "pcm_bit_depth_luma_minus1")?;
            w.write_code(
                checked_minus(pcm.bit_depth_chroma, 1, "pcm_bit_depth_chroma")?,
                4,
                "pcm_bit_depth_chroma_minus1",
            )?;
        }

        if self.config.lossless_coding {
            w.write_flag(sps.lossless, "qpprime_y_zero_transquant_bypass_flag");
        }

        w.write_uvlc(
            checked_minus(sps.bits_for_poc, 4, "bits_for_poc")?,
            "log2_max_pic_order_cnt_lsb_minus4",
        )?;
        for p in &sps.dpb {
            w.write_uvlc(p.max_dec_pic_buffering, "max_dec_pic_buffering[i]")?;
            w.write_uvlc(p.num_reorder_pics, "num_reorder_pics[i]")?;
            w.write_uvlc(p.max_latency_increase, "max_latency_increase[i]")?;
        }

        w.write_flag(sps.restricted_ref_pic_lists, "restricted_ref_pic_lists_flag");
        if sps.restricted_ref_pic_lists {
            w.write_flag(sps.lists_modification_present, "lists_modification_present_flag");
        }
        w.write_uvlc(log2_min_cu - 3, "log2_min_coding_block_size_minus3")?;
        w.write_uvlc(sps.max_cu_depth - sps.add_cu_depth, "log2_diff_max_min_coding_block_size")?;
        w.write_uvlc(
            checked_minus(sps.tu_log2_min_size, 2, "tu_log2_min_size")?,
            "log2_min_transform_block_size_minus2",
        )?;
        w.write_uvlc(
            checked_minus(sps.tu_log2_max_size, sps.tu_log2_min_size, "tu_log2_max_size")?,
            "log2_diff_max_min_transform_block_size",
        )?;

        if log2_min_cu == 3 {
            w.write_flag(sps.disable_inter_4x4, "disable_inter_4x4_flag");
        }

        if let Some(pcm) = &sps.pcm {
            w.write_uvlc(
                checked_minus(pcm.log2_min_size, 3, "pcm_log2_min_size")?,
                "log2_min_pcm_coding_block_size_minus3",
            )?;
            w.write_uvlc(
                checked_minus(pcm.log2_max_size, pcm.log2_min_size, "pcm_log2_max_size")?,
                "log2_diff_max_min_pcm_coding_block_size",
            )?;
        }
        w.write_uvlc(
            checked_minus(sps.tu_max_depth_inter, 1, "tu_max_depth_inter")?,
            "max_transform_hierarchy_depth_inter",
        )?;
        w.write_uvlc(
            checked_minus(sps.tu_max_depth_intra, 1, "tu_max_depth_intra")?,
            "max_transform_hierarchy_depth_intra",
        )?;
        w.write_flag(sps.scaling_list_enabled, "scaling_list_enabled_flag");
        w.write_flag(sps.lm_chroma, "chroma_pred_from_luma_enabled_flag");
        w.write_flag(sps.use_df, "deblocking_filter_in_aps_enabled_flag");
        w.write_flag(
            sps.loop_filter_across_slices,
            "seq_loop_filter_across_slices_enabled_flag",
        );
        w.write_flag(sps.amp, "asymmetric_motion_partitions_enabled_flag");
        w.write_flag(sps.nsqt, "non_square_quadtree_enabled_flag");
        w.write_flag(sps.sao, "sample_adaptive_offset_enabled_flag");
        w.write_flag(sps.alf, "adaptive_loop_filter_enabled_flag");
        if sps.alf {
            w.write_flag(sps.alf_coef_in_slice, "alf_coef_in_slice_flag");
        }
        if let Some(pcm) = &sps.pcm {
            w.write_flag(pcm.loop_filter_disable, "pcm_loop_filter_disable_flag");
        }

        w.write_flag(sps.temporal_id_nesting, "temporal_id_nesting_flag");

        w.write_uvlc(sps.rps_list.len() as u32, "num_short_term_ref_pic_sets")?;
        for rps in &sps.rps_list {
            self.encode_short_term_rps(rps)?;
        }

        let w = &mut self.w;
        w.write_flag(sps.long_term_refs_present, "long_term_ref_pics_present_flag");
        for &amvp in &sps.amvp_mode {
            w.write_flag(amvp, "amvp_mode_flag");
        }

        w.write_code(mode.idc(), 2, "tiles_or_entropy_coding_sync_idc")?;
        if mode == ParallelMode::Tiles {
            self.encode_tile_layout(&sps.tiles)?;
            if sps.tiles.is_split() {
                self.w.write_flag(
                    sps.tiles.loop_filter_across_tiles,
                    "loop_filter_across_tile_flag",
                );
            }
        }

        self.w.write_flag(true, "sps_extension_flag");
        if self.config.vps_syntax == VpsSyntax::LayerDependency {
            self.encode_sps_multiview_extension(sps)?;
        }
        debug!(
            "SPS {} 编码完成: {}x{}, 并行方式 {:?}",
            sps.sps_id, sps.pic_width, sps.pic_height, mode
        );
        Ok(())
    }

    fn encode_tile_layout(&mut self, tiles: &TileLayout) -> TaoResult<()> {
        let w = &mut self.w;
        w.write_uvlc(tiles.num_columns_minus1, "num_tile_columns_minus1")?;
        w.write_uvlc(tiles.num_rows_minus1, "num_tile_rows_minus1")?;
        w.write_flag(tiles.uniform_spacing, "uniform_spacing_flag");
        if !tiles.uniform_spacing {
            let cols = tiles.num_columns_minus1 as usize;
            let rows = tiles.num_rows_minus1 as usize;
            if tiles.column_widths.len() < cols || tiles.row_heights.len() < rows {
                return Err(TaoError::InvalidArgument(format!(
                    "Tile: 需要 {} 个列宽与 {} 个行高, 实际 {} / {}",
                    cols,
                    rows,
                    tiles.column_widths.len(),
                    tiles.row_heights.len()
                )));
            }
            for &width in &tiles.column_widths[..cols] {
                w.write_uvlc(width, "column_width")?;
            }
            for &height in &tiles.row_heights[..rows] {
                w.write_uvlc(height, "row_height")?;
            }
        }
        Ok(())
    }

    fn encode_sps_multiview_extension(&mut self, sps: &Sps) -> TaoResult<()> {
        let mv = &sps.multiview;
        let cfg = self.config;
        let w = &mut self.w;

        w.write_flag(!mv.inter_view_refs.is_empty(), "interview_refs_present_flag");
        if !mv.inter_view_refs.is_empty() {
            w.write_uvlc(mv.inter_view_refs.len() as u32 - 1, "num_usable_interview_refs_minus1")?;
            let mut prev = 0i32;
            for &r in &mv.inter_view_refs {
                let gap = u32::try_from(prev - r - 1).map_err(|_| {
                    TaoError::InvalidArgument(format!("SPS: 视点间参考 {} 未按递减排列", r))
                })?;
                w.write_uvlc(gap, "delta_usable_interview_ref_minus1")?;
                prev = r;
            }
        }

        if cfg.dmm {
            w.write_flag(mv.use_dmm, "enable_dmm_flag");
        }
        if cfg.motion_parameter_inheritance && mv.is_depth {
            w.write_flag(mv.use_mvi, "use_mvi_flag");
        }
        if cfg.quadtree_limited_prediction && mv.is_depth {
            w.write_flag(mv.use_qtlpc, "use_qtlpc_flag");
        }
        if cfg.sdc_dlt && mv.is_depth {
            w.write_flag(mv.use_dlt, "use_dlt_flag");
            if mv.use_dlt {
                w.write_uvlc(mv.depth_values.len() as u32, "num_depth_values")?;
                for &value in &mv.depth_values {
                    w.write_uvlc(value, "dlt_depth_value")?;
                }
            }
        }

        if mv.view_id == 0 && !mv.is_depth {
            w.write_flag(true, "base_view_flag");
            w.write_flag(false, "sps_extension2_flag");
            return Ok(());
        }

        w.write_flag(false, "base_view_flag");
        if mv.is_depth {
            w.write_flag(true, "depth_flag");
            w.write_uvlc(mv.view_id, "view_id")?;
            w.write_svlc(mv.view_order_idx, "view_order_idx")?;
            if cfg.camera_parameter_fix && mv.view_id != 0 {
                self.encode_sps_camera_parameters(sps)?;
            }
        } else {
            w.write_flag(false, "depth_flag");
            w.write_uvlc(mv.view_id - 1, "view_id_minus1")?;
            w.write_svlc(mv.view_order_idx, "view_order_idx")?;
            self.encode_sps_camera_parameters(sps)?;

            if cfg.depth_map_generation {
                let w = &mut self.w;
                w.write_uvlc(mv.pred_depth_map_generation, "Pdm_generation")?;
                if mv.pred_depth_map_generation != 0 {
                    w.write_uvlc(mv.pdm_precision, "Pdm_precision")?;
                    let count = mv.view_id as usize;
                    if mv.pdm_scale_nom_delta.len() < count || mv.pdm_offset.len() < count {
                        return Err(TaoError::InvalidArgument(format!(
                            "SPS: 预测深度图参数需要 {} 组",
                            count
                        )));
                    }
                    for id in 0..count {
                        w.write_svlc(mv.pdm_scale_nom_delta[id], "Pdm_scale_nom_delta")?;
                        w.write_svlc(mv.pdm_offset[id], "Pdm_offset")?;
                    }
                    if cfg.inter_view_motion_prediction {
                        w.write_uvlc(mv.multiview_mv_pred_mode, "multi_view_mv_pred_mode")?;
                    }
                    if cfg.inter_view_residual_prediction {
                        w.write_flag(mv.multiview_res_pred_mode, "multi_view_residual_pred_mode");
                    }
                }
            }
        }
        self.w.write_flag(false, "sps_extension2_flag");
        Ok(())
    }

    fn encode_sps_camera_parameters(&mut self, sps: &Sps) -> TaoResult<()> {
        let mv = &sps.multiview;
        self.w
            .write_uvlc(mv.camera_parameter_precision, "camera_parameter_precision")?;
        self.w.write_flag(
            mv.camera_parameters_in_slice_header,
            "camera_parameter_in_slice_header",
        );
        if !mv.camera_parameters_in_slice_header {
            self.encode_camera_parameters(&mv.camera_parameters, mv.view_id)?;
        }
        Ok(())
    }

    /// 写出前 `view_id` 个参考视点的相机参数
    pub(super) fn encode_camera_parameters(
        &mut self,
        params: &CameraParameters,
        view_id: u32,
    ) -> TaoResult<()> {
        let count = view_id as usize;
        params.check_len(count)?;
        for id in 0..count {
            let scale = params.coded_scale[id];
            let offset = params.coded_offset[id];
            self.w.write_svlc(scale, "coded_scale")?;
            self.w.write_svlc(offset, "coded_offset")?;
            self.w.write_svlc(
                sum_i32(params.inv_coded_scale[id], scale)?,
                "inverse_coded_scale_plus_coded_scale",
            )?;
            self.w.write_svlc(
                sum_i32(params.inv_coded_offset[id], offset)?,
                "inverse_coded_offset_plus_coded_offset",
            )?;
        }
        Ok(())
    }

    // ============================================================
    // PPS
    // ============================================================

    /// 编码 PPS, `sps` 为其引用的序列参数集
    pub fn encode_pps(&mut self, pps: &Pps, sps: &Sps) -> TaoResult<()> {
        let mode = sps.parallel_mode()?;
        self.w.begin_structure("Picture Parameter Set");
        let w = &mut self.w;
        w.write_uvlc(pps.pps_id, "pic_parameter_set_id")?;
        w.write_uvlc(pps.sps_id, "seq_parameter_set_id")?;
        w.write_flag(pps.sign_hide, "sign_data_hiding_flag");
        if pps.sign_hide {
            w.write_code(pps.sign_hiding_threshold, 4, "sign_hiding_threshold")?;
        }
        if self.config.cabac_init_flag {
            w.write_flag(pps.cabac_init_present, "cabac_init_present_flag");
        }
        w.write_flag(pps.entropy_coding_mode, "entropy_coding_mode_flag");
        w.write_svlc(pps.pic_init_qp_minus26, "pic_init_qp_minus26")?;
        w.write_flag(pps.constrained_intra_pred, "constrained_intra_pred_flag");
        w.write_flag(pps.enable_tmvp, "enable_temporal_mvp_flag");
        w.write_code(pps.slice_granularity, 2, "slice_granularity")?;
        w.write_uvlc(
            pps.max_cu_dqp_depth + u32::from(pps.use_dqp),
            "max_cu_qp_delta_depth",
        )?;
        w.write_svlc(pps.chroma_qp_offset, "chroma_qp_offset")?;
        w.write_svlc(pps.chroma_qp_offset_2nd, "chroma_qp_offset_2nd")?;
        w.write_flag(pps.use_wp, "weighted_pred_flag");
        w.write_code(pps.wp_bipred_idc, 2, "weighted_bipred_idc")?;
        w.write_flag(pps.output_flag_present, "output_flag_present_flag");

        match mode {
            ParallelMode::Tiles => {
                w.write_flag(pps.tile_info_present, "tile_info_present_flag");
                w.write_flag(pps.tile_control_present, "tile_control_present_flag");
                if pps.tile_info_present {
                    self.encode_tile_layout(&pps.tiles)?;
                }
                if pps.tile_control_present {
                    // 行数取 PPS 的列数, 与参考编码器的码流保持一致
                    let (cols, rows) = if pps.tile_info_present {
                        (pps.tiles.num_columns_minus1, pps.tiles.num_columns_minus1)
                    } else {
                        (sps.tiles.num_columns_minus1, sps.tiles.num_rows_minus1)
                    };
                    if cols != 0 || rows != 0 {
                        self.w.write_flag(
                            pps.tiles.loop_filter_across_tiles,
                            "loop_filter_across_tile_flag",
                        );
                    }
                }
            }
            ParallelMode::Wavefront => {
                w.write_uvlc(
                    checked_minus(pps.num_substreams, 1, "num_substreams")?,
                    "num_substreams_minus1",
                )?;
            }
            ParallelMode::None => {}
        }

        let w = &mut self.w;
        w.write_flag(
            pps.deblocking_filter_control_present,
            "deblocking_filter_control_present_flag",
        );
        w.write_uvlc(
            pps.log2_parallel_merge_level_minus2,
            "log2_parallel_merge_level_minus2",
        )?;
        w.write_flag(false, "pps_extension_flag");
        debug!("PPS {} 编码完成 (SPS {})", pps.pps_id, pps.sps_id);
        Ok(())
    }

    // ============================================================
    // APS
    // ============================================================

    /// 编码 APS 头部
    pub fn encode_aps_header(&mut self, aps: &Aps) -> TaoResult<()> {
        self.w.begin_structure("Adaptation Parameter Set");
        self.w.write_uvlc(aps.aps_id, "aps_id")?;
        self.w
            .write_flag(aps.scaling_list_enabled, "aps_scaling_list_data_present_flag");
        self.w
            .write_flag(aps.loop_filter_offset_in_aps, "aps_deblocking_filter_flag");
        Ok(())
    }

    pub fn encode_aps_alf_flag(&mut self, flag: bool) {
        self.w.write_flag(flag, "aps_adaptive_loop_filter_flag");
    }

    pub fn encode_aps_extension_flag(&mut self) {
        self.w.write_flag(false, "aps_extension_flag");
    }
}

fn sum_i32(a: i32, b: i32) -> TaoResult<i32> {
    a.checked_add(b)
        .ok_or_else(|| TaoError::InvalidArgument(format!("相机参数和溢出: {} + {}", a, b)))
}
