//! 参考图像集 (RPS) 编码.
//!
//! 短期 RPS 有显式与帧间预测两种形式; 长期图像在 slice header 中按 POC LSB 差分
//! 加可选的 MSB 周期编码, 从 RPS 末尾向前处理.

use log::debug;
use tao_core::{TaoError, TaoResult};

use super::encoder::HevcSyntaxEncoder;

/// RPS 中的一个参考图像
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpsEntry {
    /// 相对当前图像的 POC 差
    pub delta_poc: i32,
    /// 是否被当前图像引用
    pub used: bool,
}

impl RpsEntry {
    pub fn new(delta_poc: i32, used: bool) -> Self {
        Self { delta_poc, used }
    }
}

/// 帧间 RPS 预测参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterRpsPrediction {
    pub delta_idx_minus1: u32,
    /// 与参考 RPS 的 POC 偏移, 不能为 0
    pub delta_rps: i32,
    /// 每个参考图像的 ref_idc (0, 1, 2)
    pub ref_idc: Vec<u8>,
}

/// 参考图像集
///
/// `entries` 依次为: 负向短期 (按距离递增), 正向短期 (按距离递增), 长期.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferencePictureSet {
    pub entries: Vec<RpsEntry>,
    pub num_negative: usize,
    pub num_positive: usize,
    pub num_long_term: usize,
    /// 为 `Some` 时使用帧间预测形式编码
    pub inter_prediction: Option<InterRpsPrediction>,
}

impl ReferencePictureSet {
    /// 由负向/正向短期列表构造显式 RPS
    pub fn explicit(negative: &[RpsEntry], positive: &[RpsEntry]) -> Self {
        let mut entries = Vec::with_capacity(negative.len() + positive.len());
        entries.extend_from_slice(negative);
        entries.extend_from_slice(positive);
        Self {
            entries,
            num_negative: negative.len(),
            num_positive: positive.len(),
            num_long_term: 0,
            inter_prediction: None,
        }
    }

    /// 追加长期参考图像
    pub fn with_long_term(mut self, long_term: &[RpsEntry]) -> Self {
        self.entries.extend_from_slice(long_term);
        self.num_long_term += long_term.len();
        self
    }

    /// 图像总数
    pub fn num_pictures(&self) -> usize {
        self.entries.len()
    }

    pub fn negative(&self) -> &[RpsEntry] {
        &self.entries[..self.num_negative.min(self.entries.len())]
    }

    pub fn positive(&self) -> &[RpsEntry] {
        let start = self.num_negative.min(self.entries.len());
        let end = (self.num_negative + self.num_positive).min(self.entries.len());
        &self.entries[start..end]
    }

    fn check_counts(&self) -> TaoResult<()> {
        let total = self.num_negative + self.num_positive + self.num_long_term;
        if total != self.entries.len() {
            return Err(TaoError::InvalidArgument(format!(
                "RPS: 计数之和 {} 与条目数 {} 不一致",
                total,
                self.entries.len()
            )));
        }
        Ok(())
    }
}

/// 一个长期图像的编码参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermCoding {
    pub delta_poc_lsb: u32,
    /// `None` 表示不写 MSB 周期 (delta_poc_msb_present_flag = 0)
    pub msb_cycle_minus1: Option<u32>,
    pub used: bool,
}

/// 计算长期图像的 LSB 差分与 MSB 周期
///
/// 从最后一个条目向前处理, 返回顺序即写入顺序. 除法与取模均为向零截断.
pub fn long_term_msb_cycles(
    rps: &ReferencePictureSet,
    bits_for_poc: u32,
) -> TaoResult<Vec<LongTermCoding>> {
    rps.check_counts()?;
    if bits_for_poc == 0 || bits_for_poc > 16 {
        return Err(TaoError::InvalidArgument(format!(
            "长期 RPS: bits_for_poc {} 不在 1..=16 内",
            bits_for_poc
        )));
    }

    let max_poc_lsb = 1i32 << bits_for_poc;
    let n = rps.num_pictures();
    let first_long_term = n - rps.num_long_term;
    let mut out = Vec::with_capacity(rps.num_long_term);

    let mut prev = 0i32;
    let mut prev_cumulative = 0i32;
    for i in (first_long_term..n).rev() {
        let delta = rps.entries[i].delta_poc;
        let lsb = (max_poc_lsb - delta + prev) % max_poc_lsb;
        if lsb < 0 {
            return Err(TaoError::InvalidArgument(format!(
                "长期 RPS: 条目 {} 的 delta_poc {} 产生负的 LSB 差分",
                i, delta
            )));
        }
        let cumulative = lsb + prev_cumulative;

        let cycle = if i == n - 1 {
            -delta / max_poc_lsb - 1
        } else if prev_cumulative != cumulative {
            let mut c = -delta / max_poc_lsb - 1;
            let wraps_over_one = prev_cumulative == max_poc_lsb - 1 && cumulative == max_poc_lsb + 1;
            let wraps_over_two = prev_cumulative == max_poc_lsb - 2 && cumulative == max_poc_lsb;
            if wraps_over_one || wraps_over_two {
                c -= 1;
            }
            c
        } else {
            (rps.entries[i + 1].delta_poc - delta) / max_poc_lsb - 1
        };

        out.push(LongTermCoding {
            delta_poc_lsb: lsb as u32,
            msb_cycle_minus1: u32::try_from(cycle).ok(),
            used: rps.entries[i].used,
        });

        prev_cumulative = cumulative;
        prev = delta;
    }
    Ok(out)
}

impl HevcSyntaxEncoder<'_> {
    /// 编码短期 RPS
    pub fn encode_short_term_rps(&mut self, rps: &ReferencePictureSet) -> TaoResult<()> {
        let w = &mut self.w;
        w.write_flag(
            rps.inter_prediction.is_some(),
            "inter_ref_pic_set_prediction_flag",
        );

        if let Some(pred) = &rps.inter_prediction {
            if pred.delta_rps == 0 {
                return Err(TaoError::InvalidArgument(
                    "RPS: 帧间预测的 delta_rps 不能为 0".into(),
                ));
            }
            w.write_uvlc(pred.delta_idx_minus1, "delta_idx_minus1")?;
            w.write_code(u32::from(pred.delta_rps < 0), 1, "delta_rps_sign")?;
            w.write_uvlc(pred.delta_rps.unsigned_abs() - 1, "abs_delta_rps_minus1")?;
            for &idc in &pred.ref_idc {
                if idc > 2 {
                    return Err(TaoError::InvalidArgument(format!(
                        "RPS: ref_idc {} 超出范围",
                        idc
                    )));
                }
                w.write_flag(idc == 1, "used_by_curr_pic_flag");
                if idc != 1 {
                    w.write_code(u32::from(idc >> 1), 1, "use_delta_flag")?;
                }
            }
            return Ok(());
        }

        rps.check_counts()?;
        w.write_uvlc(rps.num_negative as u32, "num_negative_pics")?;
        w.write_uvlc(rps.num_positive as u32, "num_positive_pics")?;

        let mut prev = 0i32;
        for entry in rps.negative() {
            let gap = prev - entry.delta_poc - 1;
            w.write_uvlc(non_negative(gap, "delta_poc_s0_minus1")?, "delta_poc_s0_minus1")?;
            prev = entry.delta_poc;
            w.write_flag(entry.used, "used_by_curr_pic_s0_flag");
        }
        prev = 0;
        for entry in rps.positive() {
            let gap = entry.delta_poc - prev - 1;
            w.write_uvlc(non_negative(gap, "delta_poc_s1_minus1")?, "delta_poc_s1_minus1")?;
            prev = entry.delta_poc;
            w.write_flag(entry.used, "used_by_curr_pic_s1_flag");
        }
        Ok(())
    }

    /// 编码 slice header 中的长期参考图像
    pub fn encode_long_term_pictures(
        &mut self,
        rps: &ReferencePictureSet,
        bits_for_poc: u32,
    ) -> TaoResult<()> {
        let coded = long_term_msb_cycles(rps, bits_for_poc)?;
        let w = &mut self.w;
        w.write_uvlc(rps.num_long_term as u32, "num_long_term_pics")?;
        for lt in &coded {
            w.write_uvlc(lt.delta_poc_lsb, "delta_poc_lsb_lt")?;
            match lt.msb_cycle_minus1 {
                Some(cycle) => {
                    w.write_flag(true, "delta_poc_msb_present_flag");
                    w.write_uvlc(cycle, "delta_poc_msb_cycle_lt_minus1")?;
                }
                None => w.write_flag(false, "delta_poc_msb_present_flag"),
            }
            w.write_flag(lt.used, "used_by_curr_pic_lt_flag");
        }
        debug!("长期参考图像: {} 个", coded.len());
        Ok(())
    }
}

fn non_negative(value: i32, name: &str) -> TaoResult<u32> {
    u32::try_from(value).map_err(|_| {
        TaoError::InvalidArgument(format!("RPS: {} 为负 ({}), POC 顺序错误", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::hevc::config::HevcSyntaxConfig;
    use tao_core::{BitReader, BitWriter};

    /// 解码显式短期 RPS, 返回 (负向, 正向)
    fn decode_explicit_rps(br: &mut BitReader) -> (Vec<RpsEntry>, Vec<RpsEntry>) {
        assert!(!br.read_flag().unwrap(), "应为显式形式");
        let num_neg = br.read_ue().unwrap();
        let num_pos = br.read_ue().unwrap();
        let mut neg = Vec::new();
        let mut prev = 0i32;
        for _ in 0..num_neg {
            let delta = prev - br.read_ue().unwrap() as i32 - 1;
            neg.push(RpsEntry::new(delta, br.read_flag().unwrap()));
            prev = delta;
        }
        let mut pos = Vec::new();
        prev = 0;
        for _ in 0..num_pos {
            let delta = prev + br.read_ue().unwrap() as i32 + 1;
            pos.push(RpsEntry::new(delta, br.read_flag().unwrap()));
            prev = delta;
        }
        (neg, pos)
    }

    fn encode(f: impl FnOnce(&mut HevcSyntaxEncoder) -> TaoResult<()>) -> TaoResult<Vec<u8>> {
        let cfg = HevcSyntaxConfig::default();
        let mut bw = BitWriter::new();
        {
            let mut enc = HevcSyntaxEncoder::new(&mut bw, &cfg);
            f(&mut enc)?;
        }
        Ok(bw.finish())
    }

    fn lt_rps(deltas: &[i32]) -> ReferencePictureSet {
        let lt: Vec<RpsEntry> = deltas.iter().map(|&d| RpsEntry::new(d, true)).collect();
        ReferencePictureSet::default().with_long_term(&lt)
    }

    #[test]
    fn test_explicit_rps_roundtrip() {
        let rps = ReferencePictureSet::explicit(
            &[
                RpsEntry::new(-1, true),
                RpsEntry::new(-3, false),
                RpsEntry::new(-8, true),
            ],
            &[RpsEntry::new(2, true), RpsEntry::new(4, false)],
        );
        let data = encode(|enc| enc.encode_short_term_rps(&rps)).unwrap();
        let mut br = BitReader::new(&data);
        let (neg, pos) = decode_explicit_rps(&mut br);
        assert_eq!(neg, rps.negative());
        assert_eq!(pos, rps.positive());
    }

    #[test]
    fn test_empty_rps() {
        let rps = ReferencePictureSet::explicit(&[], &[]);
        let data = encode(|enc| enc.encode_short_term_rps(&rps)).unwrap();
        // 0 | 1 | 1
        assert_eq!(data, vec![0b0110_0000]);
    }

    #[test]
    fn test_explicit_rps_rejects_unordered_deltas() {
        let rps = ReferencePictureSet::explicit(
            &[RpsEntry::new(-4, true), RpsEntry::new(-2, true)],
            &[],
        );
        assert!(encode(|enc| enc.encode_short_term_rps(&rps)).is_err());
    }

    #[test]
    fn test_inter_rps_prediction() {
        let rps = ReferencePictureSet {
            inter_prediction: Some(InterRpsPrediction {
                delta_idx_minus1: 0,
                delta_rps: -2,
                ref_idc: vec![1, 0, 2],
            }),
            ..Default::default()
        };
        let data = encode(|enc| enc.encode_short_term_rps(&rps)).unwrap();
        let mut br = BitReader::new(&data);
        assert!(br.read_flag().unwrap());
        assert_eq!(br.read_ue().unwrap(), 0);
        assert_eq!(br.read_bit().unwrap(), 1, "delta_rps 为负时符号位为 1");
        assert_eq!(br.read_ue().unwrap(), 1);
        // idc 1 → "1"; idc 0 → "0","0"; idc 2 → "0","1"
        assert_eq!(br.read_bits(5).unwrap(), 0b10001);
    }

    #[test]
    fn test_inter_rps_rejects_zero_delta() {
        let rps = ReferencePictureSet {
            inter_prediction: Some(InterRpsPrediction::default()),
            ..Default::default()
        };
        assert!(encode(|enc| enc.encode_short_term_rps(&rps)).is_err());
    }

    #[test]
    fn test_long_term_first_entry_cycle() {
        let coded = long_term_msb_cycles(&lt_rps(&[-40]), 4).unwrap();
        assert_eq!(coded.len(), 1);
        assert_eq!(coded[0].delta_poc_lsb, 8);
        assert_eq!(coded[0].msb_cycle_minus1, Some(1));
    }

    #[test]
    fn test_long_term_wraparound_correction_one() {
        // 先处理 -15 (累计 15), 再处理 -17 (累计 17): 15 → 17 跨越一个周期, 修正为不写 MSB
        let coded = long_term_msb_cycles(&lt_rps(&[-17, -15]), 4).unwrap();
        assert_eq!(coded[0].delta_poc_lsb, 15);
        assert_eq!(coded[0].msb_cycle_minus1, None);
        assert_eq!(coded[1].delta_poc_lsb, 2);
        assert_eq!(coded[1].msb_cycle_minus1, None);
    }

    #[test]
    fn test_long_term_wraparound_correction_two() {
        // 累计 14 → 16
        let coded = long_term_msb_cycles(&lt_rps(&[-16, -14]), 4).unwrap();
        assert_eq!(coded[0].delta_poc_lsb, 14);
        assert_eq!(coded[1].delta_poc_lsb, 2);
        assert_eq!(coded[1].msb_cycle_minus1, None);
    }

    #[test]
    fn test_long_term_changed_lsb_without_correction() {
        // 累计 15 → 18: 不满足修正条件, (18/16) - 1 = 0
        let coded = long_term_msb_cycles(&lt_rps(&[-18, -15]), 4).unwrap();
        assert_eq!(coded[1].delta_poc_lsb, 3);
        assert_eq!(coded[1].msb_cycle_minus1, Some(0));
    }

    #[test]
    fn test_long_term_unchanged_lsb_uses_neighbour() {
        // -31 相对 -15 的 LSB 差分为 0, 周期由相邻条目推导: (-15 + 31) / 16 - 1 = 0
        let coded = long_term_msb_cycles(&lt_rps(&[-31, -15]), 4).unwrap();
        assert_eq!(coded[1].delta_poc_lsb, 0);
        assert_eq!(coded[1].msb_cycle_minus1, Some(0));
    }

    #[test]
    fn test_long_term_bitstream() {
        let rps = lt_rps(&[-40]);
        let data = encode(|enc| enc.encode_long_term_pictures(&rps, 4)).unwrap();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_ue().unwrap(), 1, "num_long_term_pics");
        assert_eq!(br.read_ue().unwrap(), 8, "delta_poc_lsb_lt");
        assert!(br.read_flag().unwrap(), "delta_poc_msb_present_flag");
        assert_eq!(br.read_ue().unwrap(), 1, "delta_poc_msb_cycle_lt_minus1");
        assert!(br.read_flag().unwrap(), "used_by_curr_pic_lt_flag");
    }

    #[test]
    fn test_long_term_rejects_inconsistent_counts() {
        let mut rps = lt_rps(&[-4]);
        rps.num_long_term = 2;
        assert!(long_term_msb_cycles(&rps, 4).is_err());
    }
}
