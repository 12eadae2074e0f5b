// 单槽并发闸门
//
// 任一时刻全系统至多一个周期处于进行中。帧回调线程检查闸门，检测线程释放闸门，
// 因此用原子 compare-and-swap 实现，而不是普通布尔值。

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// 闸门统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    /// 放行的帧数
    pub admitted: u64,
    /// 因上一周期未结束而丢弃的帧数
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct DetectionGate {
    in_progress: AtomicBool,
    admitted: AtomicU64,
    dropped: AtomicU64,
}

impl DetectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试开始一个周期；已有周期在进行时立即返回 false
    pub fn try_begin_cycle(&self) -> bool {
        let admitted = self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if admitted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    /// 结束当前周期
    pub fn end_cycle(&self) {
        self.in_progress.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// 开始周期并返回守卫，守卫析构时（包括出错和 panic 展开）自动结束周期
    pub fn try_enter(self: &Arc<Self>) -> Option<CycleGuard> {
        if self.try_begin_cycle() {
            Some(CycleGuard { gate: Arc::clone(self) })
        } else {
            None
        }
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// 周期守卫
#[derive(Debug)]
pub struct CycleGuard {
    gate: Arc<DetectionGate>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.gate.end_cycle();
    }
}
