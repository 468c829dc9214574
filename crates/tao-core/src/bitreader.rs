//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区读取数据, 与 BitWriter 对应.
//!
//! 除定长读取外还提供 Exp-Golomb `ue(v)` / `se(v)` 解码, 用于校验语法编码器的输出可被还原.

use crate::{TaoError, TaoResult};

/// Exp-Golomb 前导零的上限 (码字不超过 32 位有效值)
const MAX_EXP_GOLOMB_LEADING_ZEROS: u32 = 32;

/// 比特流读取器
///
/// # 示例
/// ```
/// use tao_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> TaoResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(TaoError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 位标志
    pub fn read_flag(&mut self) -> TaoResult<bool> {
        Ok(self.read_bit()? != 0)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> TaoResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(TaoError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(TaoError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取一元编码值 (unary code)
    ///
    /// 计算连续出现的 `stop_bit` 的反面的位数, 直到遇到 `stop_bit`.
    ///
    /// 例如, `read_unary(1)` 从 `0001...` 中读取得到 3 (三个 0 后跟一个 1).
    pub fn read_unary(&mut self, stop_bit: u32) -> TaoResult<u32> {
        let stop = stop_bit & 1;
        let mut count = 0u32;
        loop {
            let bit = self.read_bit()?;
            if bit == stop {
                return Ok(count);
            }
            count += 1;
        }
    }

    /// Exp-Golomb 无符号解码 `ue(v)`
    pub fn read_ue(&mut self) -> TaoResult<u32> {
        let leading_zeros = self.read_unary(1)?;
        if leading_zeros > MAX_EXP_GOLOMB_LEADING_ZEROS {
            return Err(TaoError::InvalidData(format!(
                "Exp-Golomb 前导零过长: {}",
                leading_zeros
            )));
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        // 前缀之后是码字 (值 + 1) 去掉最高位 1 的剩余部分
        let suffix = u64::from(self.read_bits(leading_zeros.min(32))?);
        let code = (1u64 << leading_zeros) - 1 + suffix;
        u32::try_from(code)
            .map_err(|_| TaoError::InvalidData(format!("Exp-Golomb 值溢出: {}", code)))
    }

    /// Exp-Golomb 有符号解码 `se(v)`
    ///
    /// 奇数码号为正, 偶数码号为负 (0 → 0, 1 → 1, 2 → -1, 3 → 2 ...).
    pub fn read_se(&mut self) -> TaoResult<i32> {
        let code = i64::from(self.read_ue()?);
        let magnitude = (code + 1) / 2;
        let value = if code % 2 == 0 { -magnitude } else { magnitude };
        Ok(value as i32)
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_basic() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(1).unwrap(), 0);
        assert_eq!(br.read_bits(2).unwrap(), 0b11);
        assert_eq!(br.read_bits(4).unwrap(), 0b0001);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);

        assert!(br.is_eof());
    }

    #[test]
    fn test_read_unary() {
        // 0001... -> unary(1) = 3
        let data = [0b00010000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_unary(1).unwrap(), 3);

        // 1110... -> unary(0) = 3
        let data2 = [0b11100000];
        let mut br2 = BitReader::new(&data2);
        assert_eq!(br2.read_unary(0).unwrap(), 3);
    }

    #[test]
    fn test_read_ue_known_codewords() {
        // 1 | 010 | 011 | 00100 | 00101 -> 0, 1, 2, 3, 4
        let data = [0b1010_0110, 0b0100_0010, 0b1000_0000];
        let mut br = BitReader::new(&data);
        for expected in 0..5 {
            assert_eq!(br.read_ue().unwrap(), expected);
        }
        assert_eq!(br.bits_read(), 17);
    }

    #[test]
    fn test_read_se_known_codewords() {
        // 010 -> 1, 011 -> -1, 00100 -> 2, 00101 -> -2
        let data = [0b0100_1100, 0b1000_0101];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_se().unwrap(), 1);
        assert_eq!(br.read_se().unwrap(), -1);
        assert_eq!(br.read_se().unwrap(), 2);
        assert_eq!(br.read_se().unwrap(), -2);
    }

    #[test]
    fn test_read_ue_truncated_input() {
        let data = [0b0000_0000];
        let mut br = BitReader::new(&data);
        assert!(br.read_ue().is_err());
    }

    #[test]
    fn test_align_to_byte() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        br.read_bits(3).unwrap();
        br.align_to_byte();
        assert_eq!(br.byte_position(), 1);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
    }

    #[test]
    fn test_eof_error() {
        let data = [0x00];
        let mut br = BitReader::new(&data);

        br.read_bits(8).unwrap();
        assert!(br.read_bits(1).is_err());
    }
}
