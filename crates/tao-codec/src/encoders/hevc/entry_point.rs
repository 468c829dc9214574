//! Tile / 波前并行的入口点偏移.

use log::debug;
use tao_core::{TaoError, TaoResult};

use super::encoder::HevcSyntaxEncoder;
use super::parameter_sets::{ParallelMode, Pps, Sps};
use super::slice_header::SliceHeader;

/// 偏移字段宽度上限 (位)
const MAX_OFFSET_BITS: u32 = 32;

/// NAL 头与两个 ue(v) 字段预留的字节数
const OFFSET_HEADROOM_BYTES: u64 = 8 + 2;

/// 计算入口点偏移 (未加首个偏移的头部修正)
///
/// - Tile: 首项为第一个 tile 位置, 之后为相邻位置之差.
/// - 波前: 从倒数第二个子流向前跳过大小为 0 的子流, 每个偏移为子流位数右移 3.
pub fn entry_point_offsets(
    mode: ParallelMode,
    tile_locations: &[u32],
    substream_sizes: &[u32],
    num_substreams: u32,
) -> TaoResult<Vec<u32>> {
    match mode {
        ParallelMode::None => Ok(Vec::new()),
        ParallelMode::Tiles => {
            let mut offsets = Vec::with_capacity(tile_locations.len());
            let mut prev = 0u32;
            for (idx, &loc) in tile_locations.iter().enumerate() {
                let offset = loc.checked_sub(prev).ok_or_else(|| {
                    TaoError::InvalidArgument(format!(
                        "入口点: tile 位置 {} ({}) 小于前一个位置 {}",
                        idx, loc, prev
                    ))
                })?;
                offsets.push(offset);
                prev = loc;
            }
            Ok(offsets)
        }
        ParallelMode::Wavefront => {
            if num_substreams < 1 {
                return Err(TaoError::InvalidArgument(
                    "入口点: 波前模式下子流数不能为 0".into(),
                ));
            }
            let candidates = (num_substreams - 1) as usize;
            if substream_sizes.len() < candidates {
                return Err(TaoError::InvalidArgument(format!(
                    "入口点: 需要 {} 个子流大小, 实际 {}",
                    candidates,
                    substream_sizes.len()
                )));
            }
            let trailing_zeros = substream_sizes[..candidates]
                .iter()
                .rev()
                .take_while(|&&size| size == 0)
                .count();
            Ok(substream_sizes[..candidates - trailing_zeros]
                .iter()
                .map(|&bits| bits >> 3)
                .collect())
        }
    }
}

/// 选择 offset_len_minus1: 满足 max_offset < 2^n 的最小 n
fn offset_len_minus1(max_offset: u64) -> TaoResult<u32> {
    let mut len_minus1 = 0u32;
    while max_offset >= 1u64 << len_minus1 {
        len_minus1 += 1;
        if len_minus1 + 1 > MAX_OFFSET_BITS {
            return Err(TaoError::Codec(format!(
                "入口点偏移 {} 需要超过 {} 位",
                max_offset, MAX_OFFSET_BITS
            )));
        }
    }
    Ok(len_minus1)
}

impl HevcSyntaxEncoder<'_> {
    /// 编码 slice header 中的入口点
    ///
    /// SPS 并行模式为 none 时不写任何内容.
    pub fn encode_entry_points(&mut self, slice: &SliceHeader, sps: &Sps, pps: &Pps) -> TaoResult<()> {
        let mode = sps.parallel_mode()?;
        if mode == ParallelMode::None {
            return Ok(());
        }
        let mut offsets = entry_point_offsets(
            mode,
            &slice.tile_locations,
            &slice.substream_sizes,
            pps.num_substreams,
        )?;

        let largest = offsets.iter().copied().max().unwrap_or(0);
        let max_offset = u64::from(largest)
            + ((self.w.bits_written() as u64 + 16) >> 3)
            + OFFSET_HEADROOM_BYTES;
        let len_minus1 = offset_len_minus1(max_offset)?;
        let width = len_minus1 + 1;

        let num = offsets.len() as u32;
        self.w.write_uvlc(num, "num_entry_point_offsets")?;
        if num > 0 {
            self.w.write_uvlc(len_minus1, "offset_len_minus1")?;
        }

        for (idx, offset) in offsets.iter_mut().enumerate() {
            if idx == 0 {
                // 首个偏移包含 NAL 头与 slice header 已写部分
                let dist_bits = self.w.bits_written() as u64 + 16;
                let header_bytes = (dist_bits + u64::from(num) * u64::from(width)) >> 3;
                let adjusted = u64::from(*offset) + header_bytes;
                *offset = u32::try_from(adjusted).map_err(|_| {
                    TaoError::Codec(format!("首个入口点偏移 {} 溢出", adjusted))
                })?;
            }
            if width < 32 && u64::from(*offset) >> width != 0 {
                return Err(TaoError::Codec(format!(
                    "入口点偏移 {} 超出 {} 位",
                    offset, width
                )));
            }
            self.w.write_code(*offset, width, "entry_point_offset")?;
        }
        debug!("入口点: {} 个, 宽度 {} 位", num, width);
        Ok(())
    }
}
