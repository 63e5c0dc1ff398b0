//! 統計情報管理モジュール
//!
//! フレーム配信レート、破棄数などの統計を収集・出力します。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// フレーム配信統計コレクター
///
/// 配信スレッド上で更新されるため、記録操作は軽量に保つ。
#[derive(Debug)]
pub struct DeliveryStats {
    /// FPS計測用のフレームタイムスタンプ（最大1秒分保持）
    frame_times: VecDeque<Instant>,
    /// 配信されたフレームの累計
    delivered: u64,
    /// シンク未バインドで破棄されたフレームの累計
    dropped: u64,
    /// 最後の統計出力時刻
    last_report: Instant,
    /// 統計出力間隔
    report_interval: Duration,
}

impl DeliveryStats {
    /// FPS計算の時間範囲（1秒間のフレーム数を計測）
    const FPS_WINDOW_SECS: u64 = 1;

    /// 新しいDeliveryStatsを作成
    ///
    /// # Arguments
    /// * `report_interval` - 統計出力間隔（例: 10秒）
    pub fn new(report_interval: Duration) -> Self {
        Self {
            frame_times: VecDeque::new(),
            delivered: 0,
            dropped: 0,
            last_report: Instant::now(),
            report_interval,
        }
    }

    /// 配信成功を記録（FPS計測用）
    pub fn record_delivered(&mut self) {
        self.delivered += 1;

        let now = Instant::now();
        self.frame_times.push_back(now);

        // 計測窓より古いタイムスタンプを削除
        let window = Duration::from_secs(Self::FPS_WINDOW_SECS);
        while let Some(&front) = self.frame_times.front() {
            if now.duration_since(front) > window {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// 破棄を記録（シンク未バインド時）
    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    /// 現在のFPSを計算
    pub fn current_fps(&self) -> f64 {
        self.frame_times.len() as f64 / Self::FPS_WINDOW_SECS as f64
    }

    /// 配信されたフレームの累計
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// 破棄されたフレームの累計
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 統計出力のタイミングか判定
    pub fn should_report(&self) -> bool {
        self.last_report.elapsed() >= self.report_interval
    }

    /// 統計をログ出力し、出力時刻をリセット
    pub fn report(&mut self) {
        tracing::info!(
            fps = self.current_fps(),
            delivered = self.delivered,
            dropped = self.dropped,
            "Frame delivery stats"
        );
        self.last_report = Instant::now();
    }
}
