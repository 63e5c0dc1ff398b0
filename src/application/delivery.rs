//! ストリーム出力アダプタ
//!
//! キャプチャバックエンドの配信スレッドからフレームを受け取り、
//! アクティブなプレゼンテーションシンクへハンドルを転送する。
//!
//! シンクへの参照は非所有（Weak）で保持し、配信時に生存確認を行う。
//! 循環参照を避けつつ、停止処理との競合（停止要求後にバックエンドが
//! 静止するまでの間に届くフレーム）を黙って破棄できる。

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::application::stats::DeliveryStats;
use crate::domain::ports::{FrameSink, PresentationSink};
use crate::domain::types::FrameBuffer;

/// フレーム配信アダプタ
///
/// セッションごとに1つ作成される。旧セッションのストリームが遅れて配信した
/// フレームが新セッションのサーフェスへ流れ込まないよう、アダプタは
/// セッション間で使い回さない。
pub struct StreamOutputAdapter {
    /// バインド中のプレゼンテーションシンク（非所有）
    target: Mutex<Option<Weak<dyn PresentationSink>>>,
    /// 配信統計
    stats: Mutex<DeliveryStats>,
}

impl StreamOutputAdapter {
    /// 新しいアダプタを作成（シンク未バインド状態）
    pub fn new(stats_interval: Duration) -> Self {
        Self {
            target: Mutex::new(None),
            stats: Mutex::new(DeliveryStats::new(stats_interval)),
        }
    }

    /// プレゼンテーションシンクをバインドする
    ///
    /// 所有権は呼び出し側（出力サーフェス）に残る。
    pub fn bind(&self, sink: &Arc<dyn PresentationSink>) {
        let mut target = self.target.lock().unwrap();
        *target = Some(Arc::downgrade(sink));
    }

    /// シンクのバインドを解除する
    ///
    /// 以降に届いたフレームは黙って破棄される。
    pub fn unbind(&self) {
        let mut target = self.target.lock().unwrap();
        *target = None;
    }

    /// 累計の配信・破棄数を取得
    #[allow(dead_code)]
    pub fn counters(&self) -> (u64, u64) {
        let stats = self.stats.lock().unwrap();
        (stats.delivered(), stats.dropped())
    }
}

impl FrameSink for StreamOutputAdapter {
    fn on_frame(&self, frame: FrameBuffer) {
        // 配信時に生存確認。アップグレードに失敗したらシンクは破棄済み
        let sink = {
            let target = self.target.lock().unwrap();
            target.as_ref().and_then(Weak::upgrade)
        };

        match sink {
            Some(sink) => {
                sink.present(frame);

                let mut stats = self.stats.lock().unwrap();
                stats.record_delivered();
                if stats.should_report() {
                    stats.report();
                }
            }
            None => {
                // ストリーム開始直後やstop後の静止期間に届くフレーム
                self.stats.lock().unwrap().record_dropped();
            }
        }
    }
}
