//! Slice header 数据模型与编码.

use log::debug;
use tao_core::{TaoError, TaoResult};

use super::config::VpsSyntax;
use super::encoder::HevcSyntaxEncoder;
use super::parameter_sets::{CameraParameters, Pps, Sps};
use super::rps::ReferencePictureSet;
use super::weight_table::RefWeights;

/// 不含扩展候选时的最大 merge 候选数
pub const MRG_MAX_NUM_CANDS: u32 = 5;

/// Slice 类型, 码值为 B=0, P=1, I=2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SliceType {
    #[default]
    B,
    P,
    I,
}

impl SliceType {
    pub fn code(self) -> u32 {
        match self {
            Self::B => 0,
            Self::P => 1,
            Self::I => 2,
        }
    }

    pub fn is_intra(self) -> bool {
        self == Self::I
    }
}

/// 与 slice header 语法相关的 NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NalUnitType {
    #[default]
    Trailing,
    Cra,
    Idr,
    /// 非基础视点的瞬时解码刷新
    Idv,
}

/// 参考图像列表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefPicList {
    L0,
    L1,
    /// 合并列表
    Lc,
}

impl RefPicList {
    pub fn index(self) -> usize {
        match self {
            Self::L0 => 0,
            Self::L1 => 1,
            Self::Lc => 2,
        }
    }
}

/// 参考列表修改
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPicListModification {
    pub flag_l0: bool,
    pub flag_l1: bool,
    pub list_entry_l0: Vec<u32>,
    pub list_entry_l1: Vec<u32>,
}

/// Slice header
///
/// 由上层编码器填写. 编码时只会回写两处: 帧内 slice 的参考数清零, 以及 `cabac_init_flag`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SliceHeader {
    pub slice_type: SliceType,
    pub nal_unit_type: NalUnitType,
    pub poc: i32,
    pub last_idr_poc: i32,
    pub view_id: u32,
    pub is_depth: bool,

    // 地址
    pub num_cus_in_frame: u32,
    pub num_part_in_cu: u32,
    /// 编码顺序到光栅地址的映射, 为空时视为恒等映射
    pub cu_order_map: Vec<u32>,
    /// true 表示独立 slice, false 表示轻量 slice
    pub is_next_slice: bool,
    pub slice_cur_start_cu_addr: u32,
    pub entropy_slice_cur_start_cu_addr: u32,

    pub apply_ic: bool,
    pub ic_skip_parse: bool,
    pub pic_output_flag: bool,

    pub rps: ReferencePictureSet,
    /// SPS 中 RPS 的索引, `None` 表示在 slice 中显式编码
    pub rps_idx: Option<usize>,

    // 环路滤波与 APS
    pub alf_enabled: bool,
    pub sao_interleaving: bool,
    pub sao_enabled: bool,
    pub sao_cb: bool,
    pub sao_cr: bool,
    pub aps_id: u32,

    /// L0, L1, LC 的活动参考数
    pub num_ref_idx: [u32; 3],
    pub ref_pic_list_modification: RefPicListModification,
    pub num_poc_total_curr: u32,
    pub ref_pic_list_combination_flag: bool,
    pub ref_pic_list_modification_flag_lc: bool,
    pub list_id_from_idx_of_lc: Vec<u8>,
    pub ref_idx_from_idx_of_lc: Vec<u32>,
    pub mvd_l1_zero_flag: bool,

    pub cabac_init_idc: u32,
    pub cabac_init_flag: bool,

    pub slice_qp: i32,
    pub inherit_dbl_param_from_aps: bool,
    pub loop_filter_disable: bool,
    pub beta_offset_div2: i32,
    pub tc_offset_div2: i32,

    /// collocated_from_l0_flag 的值, 0 时同位图像取自 L0, 1 时取自 L1, 其他值报错
    pub col_dir: u32,
    pub col_ref_idx: u32,

    /// L0/L1 每个参考图像的加权参数
    pub weights: [Vec<RefWeights>; 2],
    pub camera_parameters: CameraParameters,
    pub max_num_merge_cand: u32,

    pub tile_marker_flag: bool,
    pub tile_locations: Vec<u32>,
    pub substream_sizes: Vec<u32>,
}

impl SliceHeader {
    pub fn num_ref_idx(&self, list: RefPicList) -> u32 {
        self.num_ref_idx[list.index()]
    }

    /// 取 L0/L1 中某个参考图像的加权参数
    pub fn weight(&self, list: RefPicList, ref_idx: usize) -> TaoResult<RefWeights> {
        let table = match list {
            RefPicList::L0 => &self.weights[0],
            RefPicList::L1 => &self.weights[1],
            RefPicList::Lc => {
                return Err(TaoError::InvalidArgument(
                    "加权参数只存于 L0/L1, 合并列表需先映射".into(),
                ));
            }
        };
        table.get(ref_idx).copied().ok_or_else(|| {
            TaoError::InvalidArgument(format!(
                "加权预测: {:?} 缺少参考 {} 的参数 (共 {})",
                list,
                ref_idx,
                table.len()
            ))
        })
    }

    /// 合并列表条目映射到 (源列表, 参考索引)
    pub fn lc_entry(&self, idx: usize) -> TaoResult<(RefPicList, u32)> {
        let list_id = self.list_id_from_idx_of_lc.get(idx).copied();
        let ref_idx = self.ref_idx_from_idx_of_lc.get(idx).copied();
        match (list_id, ref_idx) {
            (Some(0), Some(r)) => Ok((RefPicList::L0, r)),
            (Some(1), Some(r)) => Ok((RefPicList::L1, r)),
            (Some(id), Some(_)) => Err(TaoError::InvalidArgument(format!(
                "合并列表条目 {} 的源列表 {} 无效",
                idx, id
            ))),
            _ => Err(TaoError::InvalidArgument(format!(
                "合并列表缺少条目 {}",
                idx
            ))),
        }
    }

    /// 独立 slice 取 slice 起始地址, 轻量 slice 取熵 slice 起始地址
    fn start_cu_addr(&self) -> u32 {
        if self.is_next_slice {
            self.slice_cur_start_cu_addr
        } else {
            self.entropy_slice_cur_start_cu_addr
        }
    }
}

/// 满足 `max_value <= 2^n` 的最小 n
fn ceil_log2(max_value: u32) -> u32 {
    let mut bits = 0u32;
    while bits < 32 && u64::from(max_value) > 1u64 << bits {
        bits += 1;
    }
    bits
}

/// 满足 `value < 2^n` 的最小 n
fn bit_length(value: u32) -> u32 {
    32 - value.leading_zeros()
}

impl HevcSyntaxEncoder<'_> {
    /// 计算 slice 地址及其位宽
    fn slice_address(&self, slice: &SliceHeader, sps: &Sps, pps: &Pps) -> TaoResult<(u32, u32)> {
        if slice.num_part_in_cu == 0 {
            return Err(TaoError::InvalidArgument("slice: num_part_in_cu 不能为 0".into()));
        }
        let bits_outer = ceil_log2(slice.num_cus_in_frame);
        let bits_inner = pps.slice_granularity << 1;
        let shift = sps
            .max_cu_depth
            .checked_sub(pps.slice_granularity)
            .ok_or_else(|| {
                TaoError::InvalidArgument(format!(
                    "slice: 粒度 {} 大于最大 CU 深度 {}",
                    pps.slice_granularity, sps.max_cu_depth
                ))
            })?
            << 1;

        let start = slice.start_cu_addr();
        let lcu = start / slice.num_part_in_cu;
        let inner = (start % slice.num_part_in_cu).checked_shr(shift).unwrap_or(0);
        let ordered = if slice.cu_order_map.is_empty() {
            lcu
        } else {
            *slice.cu_order_map.get(lcu as usize).ok_or_else(|| {
                TaoError::InvalidArgument(format!(
                    "slice: CU 顺序映射缺少地址 {}",
                    lcu
                ))
            })?
        };
        let address = ordered
            .checked_shl(bits_inner)
            .and_then(|v| v.checked_add(inner))
            .ok_or_else(|| TaoError::InvalidArgument(format!("slice: 地址 {} 溢出", ordered)))?;
        Ok((address, bits_outer + bits_inner))
    }

    /// 编码 slice header
    ///
    /// 帧内 slice 会把 L0/L1 参考数清零, 启用 cabac_init_flag 时回写该标志.
    /// 入口点不在这里写: 调用方需在其后接着调用 [`HevcSyntaxEncoder::encode_entry_points`].
    pub fn encode_slice_header(
        &mut self,
        slice: &mut SliceHeader,
        sps: &Sps,
        pps: &Pps,
    ) -> TaoResult<()> {
        let (address, address_bits) = self.slice_address(slice, sps, pps)?;
        let cfg = self.config;
        let independent = slice.is_next_slice;
        let slice_type = slice.slice_type;

        self.w.begin_structure("Slice Header");
        let w = &mut self.w;
        w.write_flag(address == 0, "first_slice_in_pic_flag");

        if cfg.illumination_compensation && address == 0 {
            if sps.multiview.view_id != 0
                && (cfg.illumination_compensation_depth || !slice.is_depth)
            {
                w.write_flag(slice.apply_ic, "applying IC flag");
            }
            if cfg.ic_skip_parse && slice.apply_ic {
                w.write_flag(slice.ic_skip_parse, "ic_skip_mergeidx0");
            }
        }

        if address > 0 {
            w.write_code(address, address_bits, "slice_address")?;
        }

        w.write_uvlc(slice_type.code(), "slice_type")?;
        w.write_flag(!independent, "lightweight_slice_flag");

        if independent {
            self.encode_slice_independent_fields(slice, sps, pps)?;
        }

        if slice_type == SliceType::B {
            self.encode_ref_pic_list_combination(slice, sps)?;
            self.w.write_flag(slice.mvd_l1_zero_flag, "mvd_l1_zero_flag");
        }

        if pps.entropy_coding_mode && !slice_type.is_intra() {
            if cfg.cabac_init_flag {
                if pps.cabac_init_present {
                    let table = pps.enc_cabac_table_idx;
                    let flag = table != slice_type && table != SliceType::B;
                    slice.cabac_init_flag = flag;
                    self.w.write_flag(flag, "cabac_init_flag");
                }
            } else {
                self.w.write_uvlc(slice.cabac_init_idc, "cabac_init_idc")?;
            }
        }

        if independent {
            self.encode_slice_qp_and_filters(slice, sps, pps)?;
            if sps.multiview.camera_parameters_in_slice_header {
                self.encode_camera_parameters(&slice.camera_parameters, sps.multiview.view_id)?;
            }
        }

        let extra = cfg.extra_merge_candidates(
            sps.multiview.use_mvi,
            sps.multiview.multiview_mv_pred_mode != 0,
            slice.is_depth,
        );
        let limit = MRG_MAX_NUM_CANDS + extra;
        if slice.max_num_merge_cand > limit {
            return Err(TaoError::InvalidArgument(format!(
                "slice: max_num_merge_cand {} 大于上限 {}",
                slice.max_num_merge_cand, limit
            )));
        }
        self.w
            .write_uvlc(limit - slice.max_num_merge_cand, "maxNumMergeCand")?;

        debug!(
            "slice header 编码完成: POC {}, {:?}, 地址 {}",
            slice.poc, slice_type, address
        );
        Ok(())
    }

    // ============================================================
    // 独立 slice 字段
    // ============================================================

    fn encode_slice_independent_fields(
        &mut self,
        slice: &mut SliceHeader,
        sps: &Sps,
        pps: &Pps,
    ) -> TaoResult<()> {
        let cfg = self.config;
        let w = &mut self.w;
        let pps_id = match cfg.vps_syntax {
            VpsSyntax::LayerDependency => pps.pps_id,
            VpsSyntax::MultiViewOperationPoints => 0,
        };
        w.write_uvlc(pps_id, "pic_parameter_set_id")?;
        if pps.output_flag_present {
            w.write_flag(slice.pic_output_flag, "pic_output_flag");
        }

        let idr = slice.nal_unit_type == NalUnitType::Idr
            && (!cfg.idr_view_restriction || slice.view_id == 0);
        if idr {
            w.write_uvlc(0, "idr_pic_id")?;
            w.write_flag(false, "no_output_of_prior_pics_flag");
        } else {
            self.encode_slice_poc_and_rps(slice, sps)?;
        }

        if sps.sao || sps.alf || sps.scaling_list_enabled || sps.use_df {
            let w = &mut self.w;
            if sps.alf {
                w.write_flag(slice.alf_enabled, "ALF on/off flag in slice header");
            }
            if sps.sao {
                w.write_flag(slice.sao_interleaving, "SAO interleaving flag");
                w.write_flag(slice.sao_enabled, "SAO on/off flag in slice header");
                if slice.sao_interleaving && slice.sao_enabled {
                    w.write_flag(slice.sao_cb, "SAO on/off flag for Cb in slice header");
                    w.write_flag(slice.sao_cr, "SAO on/off flag for Cr in slice header");
                }
            }
            w.write_uvlc(slice.aps_id, "aps_id")?;
        }

        let slice_type = slice.slice_type;
        if slice_type.is_intra() {
            slice.num_ref_idx[RefPicList::L0.index()] = 0;
        } else {
            let num = active_minus1(slice.num_ref_idx(RefPicList::L0), "L0")?;
            self.w.write_flag(true, "num_ref_idx_active_override_flag");
            self.w.write_code(num, 3, "num_ref_idx_l0_active_minus1")?;
        }
        if slice_type == SliceType::B {
            let num = active_minus1(slice.num_ref_idx(RefPicList::L1), "L1")?;
            self.w.write_code(num, 3, "num_ref_idx_l1_active_minus1")?;
        } else {
            slice.num_ref_idx[RefPicList::L1.index()] = 0;
        }

        if sps.lists_modification_present {
            self.encode_ref_pic_list_modification(slice)?;
        }
        Ok(())
    }

    fn encode_slice_poc_and_rps(&mut self, slice: &SliceHeader, sps: &Sps) -> TaoResult<()> {
        let bits = sps.bits_for_poc;
        if !(1..=16).contains(&bits) {
            return Err(TaoError::InvalidArgument(format!(
                "slice: bits_for_poc {} 超出范围",
                bits
            )));
        }
        let lsb = (i64::from(slice.poc) - i64::from(slice.last_idr_poc)).rem_euclid(1i64 << bits);
        self.w.write_code(lsb as u32, bits, "pic_order_cnt_lsb")?;

        let refresh = matches!(slice.nal_unit_type, NalUnitType::Idr | NalUnitType::Cra);
        let skip_rps = if self.config.idr_view_restriction {
            slice.poc == 0 && sps.multiview.view_id != 0 && refresh
        } else {
            slice.poc == 0 && slice.nal_unit_type == NalUnitType::Idv
        };
        if skip_rps {
            return Ok(());
        }

        match slice.rps_idx {
            None => {
                self.w.write_flag(false, "short_term_ref_pic_set_sps_flag");
                self.encode_short_term_rps(&slice.rps)?;
            }
            Some(idx) => {
                if idx >= sps.rps_list.len() {
                    return Err(TaoError::InvalidArgument(format!(
                        "slice: RPS 索引 {} 超出 SPS 列表 ({})",
                        idx,
                        sps.rps_list.len()
                    )));
                }
                self.w.write_flag(true, "short_term_ref_pic_set_sps_flag");
                self.w.write_uvlc(idx as u32, "short_term_ref_pic_set_idx")?;
            }
        }
        if sps.long_term_refs_present {
            self.encode_long_term_pictures(&slice.rps, bits)?;
        }
        Ok(())
    }

    fn encode_ref_pic_list_modification(&mut self, slice: &SliceHeader) -> TaoResult<()> {
        let modification = &slice.ref_pic_list_modification;
        let length = if slice.num_poc_total_curr > 1 {
            Some(bit_length(slice.num_poc_total_curr - 1))
        } else {
            None
        };

        let lists = [
            (
                RefPicList::L0,
                !slice.slice_type.is_intra(),
                modification.flag_l0,
                &modification.list_entry_l0,
                "ref_pic_list_modification_flag_l0",
                "list_entry_l0",
            ),
            (
                RefPicList::L1,
                slice.slice_type == SliceType::B,
                modification.flag_l1,
                &modification.list_entry_l1,
                "ref_pic_list_modification_flag_l1",
                "list_entry_l1",
            ),
        ];
        for (list, active, flag, entries, flag_name, entry_name) in lists {
            if !active {
                continue;
            }
            self.w.write_flag(flag, flag_name);
            let (true, Some(length)) = (flag, length) else {
                continue;
            };
            let num = slice.num_ref_idx(list) as usize;
            if entries.len() < num {
                return Err(TaoError::InvalidArgument(format!(
                    "slice: {:?} 需要 {} 个列表修改条目, 实际 {}",
                    list,
                    num,
                    entries.len()
                )));
            }
            for &entry in &entries[..num] {
                self.w.write_code(entry, length, entry_name)?;
            }
        }
        Ok(())
    }

    fn encode_ref_pic_list_combination(&mut self, slice: &SliceHeader, sps: &Sps) -> TaoResult<()> {
        let w = &mut self.w;
        w.write_flag(slice.ref_pic_list_combination_flag, "ref_pic_list_combination_flag");
        if !slice.ref_pic_list_combination_flag {
            return Ok(());
        }
        let num_lc = slice.num_ref_idx(RefPicList::Lc);
        w.write_uvlc(active_minus1(num_lc, "LC")?, "num_ref_idx lc_active_minus1")?;

        if sps.lists_modification_present {
            w.write_flag(
                slice.ref_pic_list_modification_flag_lc,
                "ref_pic_list_modification_flag_lc",
            );
            if slice.ref_pic_list_modification_flag_lc {
                for idx in 0..num_lc as usize {
                    let (list, ref_idx) = slice.lc_entry(idx)?;
                    w.write_flag(list == RefPicList::L1, "pic_from_list_0_flag");
                    if slice.num_ref_idx(list) > 1 {
                        w.write_uvlc(ref_idx, "ref_idx_list_curr")?;
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_slice_qp_and_filters(
        &mut self,
        slice: &SliceHeader,
        sps: &Sps,
        pps: &Pps,
    ) -> TaoResult<()> {
        let cfg = self.config;
        let w = &mut self.w;
        let qp_delta = slice.slice_qp - (pps.pic_init_qp_minus26 + 26);
        w.write_svlc(qp_delta, "slice_qp_delta")?;

        if pps.deblocking_filter_control_present {
            if sps.use_df {
                w.write_flag(slice.inherit_dbl_param_from_aps, "inherit_dbl_param_from_APS_flag");
            }
            if !slice.inherit_dbl_param_from_aps {
                w.write_flag(slice.loop_filter_disable, "loop_filter_disable");
                if !slice.loop_filter_disable {
                    w.write_svlc(slice.beta_offset_div2, "beta_offset_div2")?;
                    w.write_svlc(slice.tc_offset_div2, "tc_offset_div2")?;
                }
            }
        }

        let slice_type = slice.slice_type;
        let col_list = match slice.col_dir {
            0 => RefPicList::L0,
            1 => RefPicList::L1,
            other if !slice_type.is_intra() => {
                return Err(TaoError::InvalidArgument(format!(
                    "slice: col_dir {} 只能为 0 或 1",
                    other
                )));
            }
            _ => RefPicList::L0,
        };
        if slice_type == SliceType::B {
            w.write_flag(slice.col_dir == 1, "collocated_from_l0_flag");
        }
        if cfg.collocated_ref_idx && !slice_type.is_intra() && slice.num_ref_idx(col_list) > 1 {
            w.write_uvlc(slice.col_ref_idx, "collocated_ref_idx")?;
        }

        let bipred = if cfg.weighted_prediction_3d_fix {
            pps.wp_bipred_idc != 0
        } else {
            pps.wp_bipred_idc == 1
        };
        let has_table = (pps.use_wp && slice_type == SliceType::P)
            || (bipred && slice_type == SliceType::B);
        if has_table {
            self.encode_pred_weight_table(
                slice,
                pps.use_wp,
                pps.wp_bipred_idc,
                sps.max_internal_sample(),
            )?;
        }
        Ok(())
    }
}

fn active_minus1(num: u32, list: &str) -> TaoResult<u32> {
    num.checked_sub(1).ok_or_else(|| {
        TaoError::InvalidArgument(format!("slice: {} 活动参考数不能为 0", list))
    })
}
