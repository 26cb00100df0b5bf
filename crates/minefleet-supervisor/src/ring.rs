//! ログリングバッファ

use chrono::Utc;
use minefleet_core::{LogLine, LogStream};
use std::collections::VecDeque;
use uuid::Uuid;

/// リングの既定容量（行数）
pub const RING_CAPACITY: usize = 1000;

/// 固定容量のFIFOログバッファ
///
/// 容量超過時は最古の行から破棄します。通番はサーバー内で単調増加します。
#[derive(Debug)]
pub struct LogRing {
    server_id: Uuid,
    capacity: usize,
    next_seq: u64,
    lines: VecDeque<LogLine>,
}

impl LogRing {
    pub fn new(server_id: Uuid) -> Self {
        Self::with_capacity(server_id, RING_CAPACITY)
    }

    pub fn with_capacity(server_id: Uuid, capacity: usize) -> Self {
        Self {
            server_id,
            capacity,
            next_seq: 0,
            lines: VecDeque::with_capacity(capacity),
        }
    }

    /// 行を追加してそのLogLineを返す
    pub fn push(&mut self, stream: LogStream, text: impl Into<String>) -> LogLine {
        let line = LogLine {
            server_id: self.server_id,
            seq: self.next_seq,
            wall_time: Utc::now(),
            stream,
            text: text.into(),
        };
        self.next_seq += 1;

        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.clone());
        line
    }

    /// 現在の内容のスナップショット（古い順）
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 容量超過で最古の行が破棄されることを確認
    #[test]
    fn test_evicts_oldest() {
        let mut ring = LogRing::with_capacity(Uuid::new_v4(), 3);
        for i in 0..5 {
            ring.push(LogStream::Stdout, format!("line {i}"));
        }

        let texts: Vec<String> = ring.snapshot().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(ring.len(), 3);
    }

    /// 破棄後も通番が単調増加し続けることを確認
    #[test]
    fn test_seq_is_monotonic() {
        let mut ring = LogRing::with_capacity(Uuid::new_v4(), 2);
        for i in 0..4 {
            let line = ring.push(LogStream::Stdout, "x");
            assert_eq!(line.seq, i);
        }
        let seqs: Vec<u64> = ring.snapshot().into_iter().map(|l| l.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }
}
