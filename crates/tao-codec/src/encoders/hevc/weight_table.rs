//! 加权预测表 (pred_weight_table).

use tao_core::{TaoError, TaoResult};

use super::encoder::HevcSyntaxEncoder;
use super::slice_header::{RefPicList, SliceHeader, SliceType};

/// 单个分量的加权参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeightParam {
    pub log2_weight_denom: u32,
    pub present: bool,
    pub weight: i32,
    pub offset: i32,
}

impl WeightParam {
    pub fn new(log2_weight_denom: u32, weight: i32, offset: i32) -> Self {
        Self {
            log2_weight_denom,
            present: true,
            weight,
            offset,
        }
    }

    /// 不加权 (weight = 2^denom, offset = 0, present = false)
    pub fn identity(log2_weight_denom: u32) -> Self {
        Self {
            log2_weight_denom,
            present: false,
            weight: 1 << log2_weight_denom.min(30),
            offset: 0,
        }
    }
}

/// 一个参考图像的 Y/Cb/Cr 加权参数
pub type RefWeights = [WeightParam; 3];

/// 加权预测模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightedPredictionMode {
    None,
    /// P 且 weighted_pred, 或 B 且 weighted_bipred_idc == 1 且未使用列表合并
    Explicit,
    /// B 且 weighted_bipred_idc == 2, 不写语法
    Implicit,
    /// B 且 weighted_bipred_idc == 1 且使用列表合并
    CombinedExplicit,
}

/// 判定加权预测模式
pub fn weighted_prediction_mode(
    slice_type: SliceType,
    weighted_pred: bool,
    weighted_bipred_idc: u32,
    list_combination: bool,
) -> WeightedPredictionMode {
    match slice_type {
        SliceType::P if weighted_pred => WeightedPredictionMode::Explicit,
        SliceType::B if weighted_bipred_idc == 1 && list_combination => {
            WeightedPredictionMode::CombinedExplicit
        }
        SliceType::B if weighted_bipred_idc == 1 => WeightedPredictionMode::Explicit,
        SliceType::B if weighted_bipred_idc == 2 => WeightedPredictionMode::Implicit,
        _ => WeightedPredictionMode::None,
    }
}

fn pow2(denom: u32) -> TaoResult<i32> {
    1i32.checked_shl(denom)
        .filter(|&v| v > 0)
        .ok_or_else(|| TaoError::InvalidArgument(format!("加权预测: 分母 log2 {} 过大", denom)))
}

fn narrow(value: i64, name: &str) -> TaoResult<i32> {
    i32::try_from(value)
        .map_err(|_| TaoError::InvalidArgument(format!("加权预测: {} 溢出 ({})", name, value)))
}

/// 字段名集合 (显式列表为 lX, 合并列表为 lc)
struct WeightNames {
    luma_flag: &'static str,
    delta_luma_weight: &'static str,
    luma_offset: &'static str,
    chroma_flag: &'static str,
    delta_chroma_weight: &'static str,
    delta_chroma_offset: &'static str,
}

const LX_NAMES: WeightNames = WeightNames {
    luma_flag: "luma_weight_lX_flag",
    delta_luma_weight: "delta_luma_weight_lX",
    luma_offset: "luma_offset_lX",
    chroma_flag: "chroma_weight_lX_flag",
    delta_chroma_weight: "delta_chroma_weight_lX",
    delta_chroma_offset: "delta_chroma_offset_lX",
};

const LC_NAMES: WeightNames = WeightNames {
    luma_flag: "luma_weight_lc_flag",
    delta_luma_weight: "delta_luma_weight_lc",
    luma_offset: "luma_offset_lc",
    chroma_flag: "chroma_weight_lc_flag",
    delta_chroma_weight: "delta_chroma_weight_lc",
    delta_chroma_offset: "delta_chroma_offset_lc",
};

impl HevcSyntaxEncoder<'_> {
    /// 编码加权预测表
    ///
    /// `max_sample` 为内部位深下的样本最大值 (见 `Sps::max_internal_sample`). 分母只在第一个参考图像前写一次.
    pub fn encode_pred_weight_table(
        &mut self,
        slice: &SliceHeader,
        weighted_pred: bool,
        weighted_bipred_idc: u32,
        max_sample: i32,
    ) -> TaoResult<()> {
        let mode = weighted_prediction_mode(
            slice.slice_type,
            weighted_pred,
            weighted_bipred_idc,
            slice.ref_pic_list_combination_flag,
        );
        let mut denom_coded = false;

        match mode {
            WeightedPredictionMode::Explicit => {
                let num_lists = if slice.slice_type == SliceType::B { 2 } else { 1 };
                for list in [RefPicList::L0, RefPicList::L1].into_iter().take(num_lists) {
                    for ref_idx in 0..slice.num_ref_idx(list) {
                        let wp = slice.weight(list, ref_idx as usize)?;
                        self.encode_ref_weights(&wp, &mut denom_coded, max_sample, &LX_NAMES)?;
                    }
                }
            }
            WeightedPredictionMode::CombinedExplicit => {
                for idx in 0..slice.num_ref_idx(RefPicList::Lc) as usize {
                    let (list, ref_idx) = slice.lc_entry(idx)?;
                    let wp = slice.weight(list, ref_idx as usize)?;
                    self.encode_ref_weights(&wp, &mut denom_coded, max_sample, &LC_NAMES)?;
                }
            }
            WeightedPredictionMode::Implicit | WeightedPredictionMode::None => {}
        }
        Ok(())
    }

    fn encode_ref_weights(
        &mut self,
        wp: &RefWeights,
        denom_coded: &mut bool,
        max_sample: i32,
        names: &WeightNames,
    ) -> TaoResult<()> {
        let w = &mut self.w;
        if !*denom_coded {
            w.write_uvlc(wp[0].log2_weight_denom, "luma_log2_weight_denom")?;
            let delta = i64::from(wp[1].log2_weight_denom) - i64::from(wp[0].log2_weight_denom);
            w.write_svlc(narrow(delta, "delta_chroma_log2_weight_denom")?, "delta_chroma_log2_weight_denom")?;
            *denom_coded = true;
        }

        w.write_flag(wp[0].present, names.luma_flag);
        if wp[0].present {
            let delta = i64::from(wp[0].weight) - i64::from(pow2(wp[0].log2_weight_denom)?);
            w.write_svlc(narrow(delta, names.delta_luma_weight)?, names.delta_luma_weight)?;
            w.write_svlc(wp[0].offset, names.luma_offset)?;
        }

        w.write_flag(wp[1].present, names.chroma_flag);
        if wp[1].present {
            let half = i64::from(max_sample >> 1);
            let chroma_one = i64::from(pow2(wp[1].log2_weight_denom)?);
            for comp in &wp[1..3] {
                let delta_weight = i64::from(comp.weight) - chroma_one;
                w.write_svlc(narrow(delta_weight, names.delta_chroma_weight)?, names.delta_chroma_weight)?;

                pow2(comp.log2_weight_denom)?;
                let scaled = (half * i64::from(comp.weight)) >> comp.log2_weight_denom;
                let delta_offset = i64::from(comp.offset) + scaled - half;
                w.write_svlc(narrow(delta_offset, names.delta_chroma_offset)?, names.delta_chroma_offset)?;
            }
        }
        Ok(())
    }
}
