//! 变长码 (VLC) 写入原语.
//!
//! 所有语法结构最终都通过 [`SyntaxWriter`] 输出: 定长码 u(n)、标志 u(1)、
//! 0 阶 Exp-Golomb ue(v)/se(v), 以及块级语法使用的截断一元码和 Exp-Golomb 变体.

use log::warn;
use tao_core::{BitSink, TaoError, TaoResult};

use super::trace::{Descriptor, SyntaxTrace, TraceEntry};

/// `ue(v)` 可编码的最大值 (码字 value + 1 必须能放进 32 位)
pub const MAX_UVLC_VALUE: u32 = u32::MAX - 1;

/// Exp-Golomb level 码的一元前缀上限
const EXP_GOLOMB_LEVEL_PREFIX_CAP: u32 = 13;

/// 语法元素写入器
///
/// 包装一个 [`BitSink`], 可选地把每个语法元素报告给 [`SyntaxTrace`].
pub struct SyntaxWriter<'a> {
    sink: &'a mut dyn BitSink,
    trace: Option<&'a mut dyn SyntaxTrace>,
}

impl<'a> SyntaxWriter<'a> {
    /// 创建不带追踪的写入器
    pub fn new(sink: &'a mut dyn BitSink) -> Self {
        Self { sink, trace: None }
    }

    /// 创建带追踪的写入器
    pub fn with_trace(sink: &'a mut dyn BitSink, trace: &'a mut dyn SyntaxTrace) -> Self {
        Self {
            sink,
            trace: Some(trace),
        }
    }

    /// 已写入比特汇的总位数
    pub fn bits_written(&self) -> usize {
        self.sink.bits_written()
    }

    /// 通知追踪器开始一个新的语法结构
    pub fn begin_structure(&mut self, title: &str) {
        if let Some(trace) = self.trace.as_deref_mut() {
            trace.begin_structure(title);
        }
    }

    fn report(&mut self, name: &'static str, descriptor: Descriptor, value: i64, bits: usize) {
        if let Some(trace) = self.trace.as_deref_mut() {
            trace.on_symbol(&TraceEntry {
                name,
                descriptor,
                value,
                bits,
            });
        }
    }

    // ============================================================
    // 带名称的语法元素
    // ============================================================

    /// 写入定长码 u(n), `len` 取 1..=32
    pub fn write_code(&mut self, value: u32, len: u32, name: &'static str) -> TaoResult<()> {
        if len == 0 || len > 32 {
            return Err(TaoError::InvalidArgument(format!(
                "{}: 定长码长度 {} 不在 1..=32 内",
                name, len
            )));
        }
        if len < 32 && value >> len != 0 {
            return Err(TaoError::InvalidArgument(format!(
                "{}: 值 {} 超出 {} 位",
                name, value, len
            )));
        }
        self.sink.write_bits(value, len);
        self.report(name, Descriptor::Fixed(len), i64::from(value), len as usize);
        Ok(())
    }

    /// 写入 1 位标志
    pub fn write_flag(&mut self, flag: bool, name: &'static str) {
        self.sink.write_bits(u32::from(flag), 1);
        self.report(name, Descriptor::Flag, i64::from(flag), 1);
    }

    /// 写入无符号 Exp-Golomb `ue(v)`
    pub fn write_uvlc(&mut self, value: u32, name: &'static str) -> TaoResult<()> {
        let bits = self.put_exp_golomb(u64::from(value), name)?;
        self.report(name, Descriptor::Ue, i64::from(value), bits);
        Ok(())
    }

    /// 写入有符号 Exp-Golomb `se(v)`
    ///
    /// 正数映射到奇数码号, 非正数映射到偶数码号: v > 0 → 2v - 1, v <= 0 → -2v.
    pub fn write_svlc(&mut self, value: i32, name: &'static str) -> TaoResult<()> {
        let bits = self.put_exp_golomb(signed_to_code_num(value), name)?;
        self.report(name, Descriptor::Se, i64::from(value), bits);
        Ok(())
    }

    /// 写入 0 阶 Exp-Golomb 码字, 返回写出的位数
    fn put_exp_golomb(&mut self, code_num: u64, name: &'static str) -> TaoResult<usize> {
        if code_num > u64::from(MAX_UVLC_VALUE) {
            warn!("{}: Exp-Golomb 码号 {} 超出 32 位码字范围", name, code_num);
            return Err(TaoError::InvalidArgument(format!(
                "{}: Exp-Golomb 码号 {} 过大",
                name, code_num
            )));
        }
        let code = code_num + 1;
        // 码字共 2m+1 位: m 个 0, 然后是 m+1 位的 code
        let m = 63 - code.leading_zeros();
        if m > 0 {
            self.sink.write_bits(0, m);
        }
        self.sink.write_bits(code as u32, m + 1);
        Ok((2 * m + 1) as usize)
    }

    // ============================================================
    // 块级语法使用的无名原语
    // ============================================================

    /// 截断一元码
    ///
    /// 写 `symbol` 个 1, 若 `symbol < max_symbol` 再补一个 0 作终止.
    /// `max_symbol == 0` 时不写任何位.
    pub fn write_truncated_unary(&mut self, symbol: u32, max_symbol: u32) -> TaoResult<()> {
        if max_symbol == 0 {
            return Ok(());
        }
        if symbol > max_symbol {
            return Err(TaoError::InvalidArgument(format!(
                "截断一元码: symbol {} 大于上限 {}",
                symbol, max_symbol
            )));
        }
        for _ in 0..symbol {
            self.sink.write_bits(1, 1);
        }
        let mut bits = symbol as usize;
        if symbol < max_symbol {
            self.sink.write_bits(0, 1);
            bits += 1;
        }
        self.report(
            "truncated_unary",
            Descriptor::TruncatedUnary(max_symbol),
            i64::from(symbol),
            bits,
        );
        Ok(())
    }

    /// 一元前缀 + Exp-Golomb 转义的 level 码
    ///
    /// symbol < 13 时为 symbol 个 1 加一个 0; 否则为 13 个 1 后接
    /// `symbol - 13` 的 0 阶转义 Exp-Golomb.
    pub fn write_exp_golomb_level(&mut self, symbol: u32) {
        let ones = symbol.min(EXP_GOLOMB_LEVEL_PREFIX_CAP);
        for _ in 0..ones {
            self.sink.write_bits(1, 1);
        }
        let mut bits = ones as usize;
        if symbol < EXP_GOLOMB_LEVEL_PREFIX_CAP {
            self.sink.write_bits(0, 1);
            bits += 1;
        } else {
            bits += self.put_escaped_exp_golomb(symbol - EXP_GOLOMB_LEVEL_PREFIX_CAP, 0);
        }
        self.report(
            "exp_golomb_level",
            Descriptor::ExpGolombLevel,
            i64::from(symbol),
            bits,
        );
    }

    /// k 阶转义 Exp-Golomb (旁路 bin 形式)
    pub fn write_escaped_exp_golomb(&mut self, symbol: u32, order: u32) {
        let bits = self.put_escaped_exp_golomb(symbol, order);
        self.report(
            "escaped_exp_golomb",
            Descriptor::EscapedExpGolomb(order),
            i64::from(symbol),
            bits,
        );
    }

    fn put_escaped_exp_golomb(&mut self, symbol: u32, order: u32) -> usize {
        let mut symbol = u64::from(symbol);
        let mut count = order;
        let mut bits = 0usize;
        while count < 63 && symbol >= 1u64 << count {
            self.sink.write_bits(1, 1);
            symbol -= 1u64 << count;
            count += 1;
            bits += 1;
        }
        self.sink.write_bits(0, 1);
        bits += 1;
        while count > 0 {
            count -= 1;
            self.sink.write_bits(((symbol >> count) & 1) as u32, 1);
            bits += 1;
        }
        bits
    }

    // ============================================================
    // 对齐
    // ============================================================

    /// 用 0 填充到字节边界
    pub fn align_with_zeros(&mut self) {
        self.sink.align_with_zeros();
    }

    /// 用 1 填充到字节边界
    pub fn align_with_ones(&mut self) {
        self.sink.align_with_ones();
    }

    /// RBSP 尾比特: 一个 1 后用 0 对齐
    pub fn write_rbsp_trailing_bits(&mut self) {
        self.write_flag(true, "rbsp_stop_one_bit");
        self.sink.align_with_zeros();
    }
}

/// se(v) 的码号映射
pub fn signed_to_code_num(value: i32) -> u64 {
    let v = i64::from(value);
    if v > 0 { (2 * v - 1) as u64 } else { (-2 * v) as u64 }
}
