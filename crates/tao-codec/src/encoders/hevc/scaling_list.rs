//! 量化矩阵 (scaling list) 编码.
//!
//! 每个 (尺寸, 列表) 矩阵要么复制同尺寸的更早列表, 要么以 DPCM 方式逐系数编码.
//! 16x16 与 32x32 只存 8x8 下采样系数加一个 DC 值.

use tao_core::{TaoError, TaoResult};

use super::encoder::HevcSyntaxEncoder;

/// 尺寸类别数: 4x4, 8x8, 16x16, 32x32
pub const SCALING_LIST_SIZE_NUM: usize = 4;
/// 每个尺寸类别的列表数
pub const SCALING_LIST_NUM: [usize; SCALING_LIST_SIZE_NUM] = [6, 6, 6, 2];
/// 每个尺寸类别的完整系数数
pub const SCALING_LIST_COEF_NUM: [usize; SCALING_LIST_SIZE_NUM] = [16, 64, 256, 1024];
/// 单个矩阵实际存储的最大系数数
pub const MAX_MATRIX_COEF_NUM: usize = 64;
/// DPCM 预测起始值
pub const SCALING_LIST_START_VALUE: i32 = 8;

/// 8x8 以上的尺寸类别携带 DC 系数
const FIRST_SIZE_WITH_DC: usize = 2;

/// 矩阵实际存储的系数数
pub fn coef_num(size_id: usize) -> usize {
    SCALING_LIST_COEF_NUM[size_id].min(MAX_MATRIX_COEF_NUM)
}

/// 单个量化矩阵
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingMatrix {
    /// 光栅顺序系数 (4x4 或 8x8)
    pub coefs: Vec<i32>,
    /// DC 系数, 仅 16x16/32x32 有效
    pub dc: i32,
    /// 使用默认矩阵
    pub use_default: bool,
}

impl ScalingMatrix {
    /// 所有系数为同一值的平坦矩阵
    pub fn flat(size_id: usize, value: i32) -> Self {
        Self {
            coefs: vec![value; coef_num(size_id)],
            dc: value,
            use_default: false,
        }
    }
}

/// 完整的量化矩阵集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingList {
    /// 为 true 时不显式传输矩阵
    pub present_flag: bool,
    /// `matrices[size_id][list_id]`
    pub matrices: [Vec<ScalingMatrix>; SCALING_LIST_SIZE_NUM],
}

impl ScalingList {
    /// 全部为平坦 16 的矩阵集合
    pub fn flat() -> Self {
        Self {
            present_flag: false,
            matrices: std::array::from_fn(|size_id| {
                vec![ScalingMatrix::flat(size_id, 16); SCALING_LIST_NUM[size_id]]
            }),
        }
    }

    fn matrix(&self, size_id: usize, list_id: usize) -> TaoResult<&ScalingMatrix> {
        let m = self.matrices[size_id].get(list_id).ok_or_else(|| {
            TaoError::InvalidArgument(format!("量化矩阵: 缺少 [{}][{}]", size_id, list_id))
        })?;
        if m.coefs.len() != coef_num(size_id) {
            return Err(TaoError::InvalidArgument(format!(
                "量化矩阵 [{}][{}]: 需要 {} 个系数, 实际 {}",
                size_id,
                list_id,
                coef_num(size_id),
                m.coefs.len()
            )));
        }
        Ok(m)
    }

    /// 查找可复制的参考列表 (从最近的更早列表开始)
    pub fn find_reference(&self, size_id: usize, list_id: usize) -> TaoResult<Option<usize>> {
        let current = self.matrix(size_id, list_id)?;
        for ref_id in (0..list_id).rev() {
            let candidate = self.matrix(size_id, ref_id)?;
            let same_dc = size_id < FIRST_SIZE_WITH_DC || candidate.dc == current.dc;
            if candidate.coefs == current.coefs && same_dc {
                return Ok(Some(ref_id));
            }
        }
        Ok(None)
    }
}

/// 之字形扫描顺序, 返回光栅下标
pub fn zigzag_scan(size: usize) -> Vec<usize> {
    let mut scan = Vec::with_capacity(size * size);
    if size == 0 {
        return scan;
    }
    for diag in 0..(2 * size - 1) {
        let lo = diag.saturating_sub(size - 1);
        let hi = diag.min(size - 1);
        if diag % 2 == 0 {
            for x in lo..=hi {
                scan.push((diag - x) * size + x);
            }
        } else {
            for x in (lo..=hi).rev() {
                scan.push((diag - x) * size + x);
            }
        }
    }
    scan
}

/// DPCM 差值回绕到 [-128, 127]
fn wrap_delta(delta: i32) -> i32 {
    if delta > 127 {
        delta - 256
    } else if delta < -128 {
        delta + 256
    } else {
        delta
    }
}

impl HevcSyntaxEncoder<'_> {
    /// 编码量化矩阵集合
    pub fn encode_scaling_list(&mut self, list: &ScalingList) -> TaoResult<()> {
        self.w.write_flag(list.present_flag, "scaling_list_present_flag");
        if list.present_flag {
            return Ok(());
        }
        for size_id in 0..SCALING_LIST_SIZE_NUM {
            if list.matrices[size_id].len() != SCALING_LIST_NUM[size_id] {
                return Err(TaoError::InvalidArgument(format!(
                    "量化矩阵: 尺寸 {} 需要 {} 个列表, 实际 {}",
                    size_id,
                    SCALING_LIST_NUM[size_id],
                    list.matrices[size_id].len()
                )));
            }
            for list_id in 0..SCALING_LIST_NUM[size_id] {
                match list.find_reference(size_id, list_id)? {
                    Some(ref_id) => {
                        self.w.write_flag(false, "scaling_list_pred_mode_flag");
                        self.w.write_uvlc(
                            (list_id - ref_id - 1) as u32,
                            "scaling_list_pred_matrix_id_delta",
                        )?;
                    }
                    None => {
                        self.w.write_flag(true, "scaling_list_pred_mode_flag");
                        self.encode_scaling_matrix_dpcm(list.matrix(size_id, list_id)?, size_id)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_scaling_matrix_dpcm(&mut self, m: &ScalingMatrix, size_id: usize) -> TaoResult<()> {
        let has_dc = size_id >= FIRST_SIZE_WITH_DC;
        if m.use_default {
            let name = if has_dc {
                "scaling_list_dc_coef_minus8"
            } else {
                "scaling_list_delta_coef"
            };
            return self.w.write_svlc(-SCALING_LIST_START_VALUE, name);
        }

        if has_dc {
            self.w.write_svlc(m.dc - 8, "scaling_list_dc_coef_minus8")?;
        }
        let scan = zigzag_scan(if size_id == 0 { 4 } else { 8 });
        let mut next = SCALING_LIST_START_VALUE;
        for &pos in scan.iter().take(coef_num(size_id)) {
            let coef = m.coefs[pos];
            let delta = wrap_delta(coef - next);
            next = coef;
            self.w.write_svlc(delta, "scaling_list_delta_coef")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::hevc::config::HevcSyntaxConfig;
    use crate::encoders::hevc::trace::RecordingTrace;
    use tao_core::BitWriter;

    fn trace_list(list: &ScalingList) -> RecordingTrace {
        let cfg = HevcSyntaxConfig::default();
        let mut bw = BitWriter::new();
        let mut trace = RecordingTrace::new();
        {
            let mut enc = HevcSyntaxEncoder::with_trace(&mut bw, &mut trace, &cfg);
            enc.encode_scaling_list(list).unwrap();
        }
        trace
    }

    #[test]
    fn test_zigzag_4x4() {
        assert_eq!(
            zigzag_scan(4),
            vec![0, 1, 4, 8, 5, 2, 3, 6, 9, 12, 13, 10, 7, 11, 14, 15]
        );
        let scan8 = zigzag_scan(8);
        assert_eq!(scan8.len(), 64);
        assert_eq!(&scan8[..6], &[0, 1, 8, 16, 9, 2]);
        assert_eq!(scan8[63], 63);
    }

    #[test]
    fn test_wrap_delta() {
        assert_eq!(wrap_delta(127), 127);
        assert_eq!(wrap_delta(128), -128);
        assert_eq!(wrap_delta(-128), -128);
        assert_eq!(wrap_delta(-129), 127);
    }

    #[test]
    fn test_present_flag_skips_matrices() {
        let mut list = ScalingList::flat();
        list.present_flag = true;
        let trace = trace_list(&list);
        assert_eq!(trace.names(), vec!["scaling_list_present_flag"]);
    }

    #[test]
    fn test_flat_lists_copy_previous() {
        let trace = trace_list(&ScalingList::flat());
        let modes: Vec<i64> = trace.find("scaling_list_pred_mode_flag").map(|e| e.value).collect();
        assert_eq!(modes.len(), 20);
        // 每个尺寸的第一个列表只能 DPCM, 其余复制紧邻的前一个
        assert_eq!(modes.iter().filter(|&&m| m == 1).count(), 4);
        assert!(trace.find("scaling_list_pred_matrix_id_delta").all(|e| e.value == 0));
    }

    #[test]
    fn test_copy_references_earliest_match_searching_backwards() {
        let mut list = ScalingList::flat();
        // 4x4: 列表 1 与 0 不同, 列表 2 与 0 相同 → 引用 0, delta = 2 - 0 - 1 = 1
        list.matrices[0][1] = ScalingMatrix::flat(0, 20);
        for id in 3..6 {
            list.matrices[0][id] = ScalingMatrix::flat(0, 30 + id as i32);
        }
        assert_eq!(list.find_reference(0, 2).unwrap(), Some(0));
        let trace = trace_list(&list);
        let first_delta = trace.find("scaling_list_pred_matrix_id_delta").next().unwrap();
        assert_eq!(first_delta.value, 1);
    }

    #[test]
    fn test_dc_mismatch_prevents_copy() {
        let mut list = ScalingList::flat();
        list.matrices[2][1].dc = 40;
        assert_eq!(list.find_reference(2, 1).unwrap(), None);
        // 8x8 没有 DC, 只比较系数
        list.matrices[1][1].dc = 40;
        assert_eq!(list.find_reference(1, 1).unwrap(), Some(0));
    }

    #[test]
    fn test_default_matrix_writes_single_symbol() {
        let mut list = ScalingList::flat();
        list.matrices[0][0].use_default = true;
        list.matrices[2][0].use_default = true;
        let trace = trace_list(&list);
        let names = trace.names();
        // 4x4 列表 0: pred_mode_flag 后只有一个 delta = -8
        assert_eq!(names[1], "scaling_list_pred_mode_flag");
        assert_eq!(names[2], "scaling_list_delta_coef");
        assert_eq!(trace.entries[2].value, -8);
        assert!(trace.find("scaling_list_dc_coef_minus8").any(|e| e.value == -8));
    }

    #[test]
    fn test_dpcm_first_size_flat_16() {
        let trace = trace_list(&ScalingList::flat());
        let deltas: Vec<i64> = trace
            .find("scaling_list_delta_coef")
            .take(16)
            .map(|e| e.value)
            .collect();
        // 起始预测值 8, 第一个差值为 8, 之后全为 0
        assert_eq!(deltas[0], 8);
        assert!(deltas[1..].iter().all(|&d| d == 0));
        let dcs: Vec<i64> = trace.find("scaling_list_dc_coef_minus8").map(|e| e.value).collect();
        assert_eq!(dcs, vec![8, 8]);
    }

    #[test]
    fn test_wrong_coef_count_is_error() {
        let mut list = ScalingList::flat();
        list.matrices[1][0].coefs.truncate(10);
        let cfg = HevcSyntaxConfig::default();
        let mut bw = BitWriter::new();
        let mut enc = HevcSyntaxEncoder::new(&mut bw, &cfg);
        assert!(enc.encode_scaling_list(&list).is_err());
    }
}
