//! 比特流写入器.
//!
//! 定义码流语法编码器所依赖的 [`BitSink`] 接口, 并提供基于字节缓冲区的实现 [`BitWriter`].
//!
//! 按大端位序写入 (MSB first), 与 BitReader 对应.

/// 比特汇 (bit sink) 接口
///
/// 语法编码器只通过此接口输出比特, 不关心缓冲、NAL 封装或 I/O.
pub trait BitSink {
    /// 写入 `n` 个位 (1..=32), 值的低 `n` 位有效, 高位在前
    fn write_bits(&mut self, value: u32, n: u32);

    /// 用 0 填充到字节边界
    fn align_with_zeros(&mut self);

    /// 用 1 填充到字节边界
    fn align_with_ones(&mut self);

    /// 获取已写入的总位数
    fn bits_written(&self) -> usize;

    /// 当前是否位于字节边界
    fn is_byte_aligned(&self) -> bool {
        self.bits_written() % 8 == 0
    }
}

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use tao_core::bitwriter::{BitSink, BitWriter};
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_bits(0b0001, 4);
/// bw.write_bits(0b01010101, 8);
/// let data = bw.finish();
/// assert_eq!(data, vec![0b10110001, 0b01010101]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 距下一个字节边界还差的位数
    pub fn bits_until_byte_aligned(&self) -> u32 {
        (8 - u32::from(self.bit_count)) & 7
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 自动用 0 填充.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_with_zeros();
        self.data
    }

    /// 获取当前已完成的字节数据引用
    ///
    /// 注意: 不包括正在填充的当前字节.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl BitSink for BitWriter {
    fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        if n == 0 {
            return;
        }

        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - self.bit_count as u32;
            let to_write = remaining.min(available);

            // 提取要写入的位
            let shift = remaining - to_write;
            let mask = (1u32 << to_write) - 1;
            let bits = ((value >> shift) & mask) as u8;

            if to_write >= 8 {
                // 整字节写入 (bit_count 必定为 0)
                self.current_byte = bits;
            } else {
                self.current_byte = (self.current_byte << to_write) | bits;
            }
            self.bit_count += to_write as u8;

            if self.bit_count >= 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            remaining -= to_write;
        }
    }

    fn align_with_zeros(&mut self) {
        let pad = self.bits_until_byte_aligned();
        if pad > 0 {
            self.write_bits(0, pad);
        }
    }

    fn align_with_ones(&mut self) {
        let pad = self.bits_until_byte_aligned();
        if pad > 0 {
            self.write_bits((1 << pad) - 1, pad);
        }
    }

    fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_write_bits_basic() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b1011, 4);
        bw.write_bits(0b0001, 4);
        let data = bw.finish();
        assert_eq!(data, vec![0b10110001]);
    }

    #[test]
    fn test_write_bits_32_bit() {
        let mut bw = BitWriter::new();
        bw.write_bits(0xFF00FF00, 32);
        assert_eq!(bw.bits_written(), 32);
        let data = bw.finish();
        assert_eq!(data, vec![0xFF, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn test_write_bits_keeps_low_bits_only() {
        let mut bw = BitWriter::new();
        bw.write_bits(0xFFFF_FFF5, 4);
        bw.write_bits(0, 4);
        assert_eq!(bw.finish(), vec![0b0101_0000]);
    }

    #[test]
    fn test_align_with_zeros() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        bw.align_with_zeros();
        assert!(bw.is_byte_aligned());
        bw.write_bits(0xFF, 8);
        let data = bw.finish();
        assert_eq!(data, vec![0b10100000, 0xFF]);
    }

    #[test]
    fn test_align_with_ones() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b0, 1);
        bw.align_with_ones();
        assert_eq!(bw.bits_written(), 8);
        // 已对齐时不写入任何位
        bw.align_with_ones();
        assert_eq!(bw.bits_written(), 8);
        assert_eq!(bw.finish(), vec![0b0111_1111]);
    }

    #[test]
    fn test_bits_until_byte_aligned() {
        let mut bw = BitWriter::new();
        assert_eq!(bw.bits_until_byte_aligned(), 0);
        bw.write_bit(1);
        assert_eq!(bw.bits_until_byte_aligned(), 7);
        bw.write_bits(0, 7);
        assert_eq!(bw.bits_until_byte_aligned(), 0);
        assert_eq!(bw.data(), &[0x80]);
    }

    #[test]
    fn test_read_write_roundtrip_bits() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b10110, 5);
        bw.write_bits(0xFF, 8);
        bw.write_bits(0, 3);
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(5).unwrap(), 0b10110);
        assert_eq!(br.read_bits(8).unwrap(), 0xFF);
        assert_eq!(br.read_bits(3).unwrap(), 0);
    }
}
