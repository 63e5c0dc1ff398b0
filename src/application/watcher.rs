//! ディスプレイ構成変更ウォッチャ
//!
//! システムのディスプレイ構成変更通知を購読し、コントローラループへ
//! 再構成のトリガーを転送する。通知の発生源（ポーリング・OSイベント）は
//! Infrastructure側が用意し、ここではチャネルとして受け取る。

use crossbeam_channel::Receiver;
use std::thread::JoinHandle;

use crate::application::runner::ControllerHandle;
use crate::domain::ports::DisplayNotification;

/// ディスプレイ変更ウォッチャ
pub struct DisplayChangeWatcher;

impl DisplayChangeWatcher {
    /// 購読を開始する
    ///
    /// 通知チャネルが閉じられるとスレッドは終了する。
    /// 実際の変更を伴わない通知や、セッション破棄中に届く通知は
    /// コントローラ側で無害に処理される（no-op）。
    pub fn spawn(
        notifications: Receiver<DisplayNotification>,
        handle: ControllerHandle,
    ) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("display-watcher".to_string())
            .spawn(move || {
                tracing::debug!("Display change watcher started");
                for _ in notifications.iter() {
                    handle.notify_display_changed();
                }
                tracing::debug!("Display change watcher terminated");
            })
            .expect("Failed to spawn display watcher thread")
    }
}
