//! 语法元素追踪.
//!
//! 编码器可选地接收一个 [`SyntaxTrace`], 每写出一个语法元素就回调一次,
//! 回调内容为 (元素名, 描述符, 值, 实际占用位数). 追踪不影响输出比特.

use std::fmt;

use log::trace;

/// 语法元素描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    /// 定长无符号 u(n)
    Fixed(u32),
    /// 1 位标志 u(1)
    Flag,
    /// 无符号 Exp-Golomb ue(v)
    Ue,
    /// 有符号 Exp-Golomb se(v)
    Se,
    /// 截断一元码, 附上限
    TruncatedUnary(u32),
    /// 一元前缀加转义的 level 码
    ExpGolombLevel,
    /// k 阶转义 Exp-Golomb
    EscapedExpGolomb(u32),
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "u({})", n),
            Self::Flag => write!(f, "u(1)"),
            Self::Ue => write!(f, "ue(v)"),
            Self::Se => write!(f, "se(v)"),
            Self::TruncatedUnary(max) => write!(f, "tu({})", max),
            Self::ExpGolombLevel => write!(f, "eg-level"),
            Self::EscapedExpGolomb(k) => write!(f, "eg{}", k),
        }
    }
}

/// 一条追踪记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// 语法元素名
    pub name: &'static str,
    /// 描述符
    pub descriptor: Descriptor,
    /// 写入的值 (有符号元素保留符号)
    pub value: i64,
    /// 实际写出的位数
    pub bits: usize,
}

/// 语法追踪接收端
pub trait SyntaxTrace {
    /// 开始写一个语法结构 (VPS/SPS/PPS/slice header 等)
    fn begin_structure(&mut self, _title: &str) {}

    /// 写出一个语法元素
    fn on_symbol(&mut self, entry: &TraceEntry);
}

/// 通过 `log` 输出的追踪器
///
/// 以 trace 级别逐条输出, 格式与常见参考解码器的 trace 文件一致.
#[derive(Debug, Default)]
pub struct LogTrace {
    counter: u64,
}

impl LogTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已输出的语法元素数
    pub fn symbol_count(&self) -> u64 {
        self.counter
    }
}

impl SyntaxTrace for LogTrace {
    fn begin_structure(&mut self, title: &str) {
        trace!("=========== {} ===========", title);
    }

    fn on_symbol(&mut self, entry: &TraceEntry) {
        trace!(
            "{:8}  {:<40} {} : {}",
            self.counter, entry.name, entry.descriptor, entry.value
        );
        self.counter += 1;
    }
}

/// 记录到内存的追踪器, 便于逐元素比对
#[derive(Debug, Default)]
pub struct RecordingTrace {
    pub structures: Vec<String>,
    pub entries: Vec<TraceEntry>,
}

impl RecordingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按名称查找所有记录
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TraceEntry> + 'a {
        self.entries.iter().filter(move |e| e.name == name)
    }

    /// 是否写出过某个语法元素
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// 语法元素名序列
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }
}

impl SyntaxTrace for RecordingTrace {
    fn begin_structure(&mut self, title: &str) {
        self.structures.push(title.to_string());
    }

    fn on_symbol(&mut self, entry: &TraceEntry) {
        self.entries.push(entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_display() {
        assert_eq!(Descriptor::Fixed(8).to_string(), "u(8)");
        assert_eq!(Descriptor::Flag.to_string(), "u(1)");
        assert_eq!(Descriptor::Ue.to_string(), "ue(v)");
        assert_eq!(Descriptor::Se.to_string(), "se(v)");
    }

    #[test]
    fn test_log_trace_counts_symbols() {
        let mut t = LogTrace::new();
        let entry = TraceEntry {
            name: "sps_id",
            descriptor: Descriptor::Ue,
            value: 0,
            bits: 1,
        };
        t.begin_structure("SPS");
        t.on_symbol(&entry);
        t.on_symbol(&entry);
        assert_eq!(t.symbol_count(), 2);
    }
}
