//! イベントシンク実装
//!
//! コントローラが発するアプリケーションイベント（モード変更、キャプチャ失敗、
//! ストリーム終了）の送出先。メニュー/UI層は戻り値ではなくこのイベントで
//! 結果を観測する。

use std::sync::Mutex;

use crate::domain::ports::{AppEvent, EventSink};

/// ログ出力のみを行うイベントシンク
///
/// メニュー/UI層が存在しない構成（スタンドアロン実行）で使う。
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: AppEvent) {
        match &event {
            AppEvent::ModeChanged(mode) => {
                tracing::info!(?mode, "Capture mode changed");
            }
            AppEvent::CaptureFailed { requested, error } => {
                tracing::warn!(?requested, error = %error, "Capture failed, falling back to full desktop");
            }
            AppEvent::StreamEnded { reason } => {
                tracing::warn!(reason = %reason, "Capture stream ended");
            }
        }
    }
}

/// イベントを記録するシンク（テスト用）
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<AppEvent>>,
}

#[allow(dead_code)]
impl RecordingEventSink {
    /// 記録済みイベントを取り出してクリアする
    pub fn take(&self) -> Vec<AppEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: AppEvent) {
        self.events.lock().unwrap().push(event);
    }
}
