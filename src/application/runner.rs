//! コントローラループ
//!
//! すべてのコントローラ状態変更を単一スレッドへ直列化する。
//! 外部からの要求（開始・停止）、ディスプレイ変更通知、バックエンドの
//! 非同期ストリームエラーは、すべて1本のチャネルを通ってこのループに届く。
//!
//! start/stopはランデブーチャネルで完了を待つため、呼び出し側は自然に
//! 「前のモード変更の完了を待ってから次を発行する」契約に従うことになる。

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::application::controller::CaptureSessionController;
use crate::domain::error::{CaptureError, CaptureResult};
use crate::domain::ports::{CaptureBackend, StreamObserver};
use crate::domain::types::{CaptureMode, DisplayId};

/// コントローラループへの要求
pub enum ControllerRequest {
    /// キャプチャ開始（完了を応答で返す）
    Start {
        mode: CaptureMode,
        display: DisplayId,
        reply: Sender<CaptureResult<()>>,
    },
    /// キャプチャ停止（完了を応答で返す）
    Stop { reply: Sender<()> },
    /// ディスプレイ構成が変わった（かもしれない）
    DisplayParametersChanged,
    /// バックエンドからの非同期ストリームエラー
    StreamError { reason: String },
    /// ループ終了（停止処理を済ませてから抜ける）
    Shutdown,
}

/// コントローラループへのクローン可能なハンドル
///
/// メニュー層・ウォッチャ・バックエンドのストリーム監視がこれを保持する。
#[derive(Clone)]
pub struct ControllerHandle {
    tx: Sender<ControllerRequest>,
}

impl ControllerHandle {
    /// キャプチャを開始し、完了まで待つ
    pub fn start_capture(&self, mode: CaptureMode, display: DisplayId) -> CaptureResult<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(ControllerRequest::Start {
                mode,
                display,
                reply: reply_tx,
            })
            .map_err(|_| loop_gone())?;
        reply_rx.recv().map_err(|_| loop_gone())?
    }

    /// キャプチャを停止し、コントローラの可視状態が整合するまで待つ
    ///
    /// ループが既に終了している場合は何もしない（停止済みとみなす）。
    pub fn stop_capture(&self) {
        let (reply_tx, reply_rx) = bounded(1);
        if self
            .tx
            .send(ControllerRequest::Stop { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.recv();
        }
    }

    /// ディスプレイ構成変更を通知する（非ブロッキング）
    pub fn notify_display_changed(&self) {
        let _ = self.tx.send(ControllerRequest::DisplayParametersChanged);
    }

    /// ストリームエラーを通知する（非ブロッキング）
    pub fn notify_stream_error(&self, reason: String) {
        let _ = self.tx.send(ControllerRequest::StreamError { reason });
    }

    /// ループの終了を要求する
    pub fn shutdown(&self) {
        let _ = self.tx.send(ControllerRequest::Shutdown);
    }
}

// バックエンドのストリーム停止通知はハンドル経由でループへ転送され、
// 他の要求と同じ直列化に乗る
impl StreamObserver for ControllerHandle {
    fn stream_stopped(&self, reason: String) {
        self.notify_stream_error(reason);
    }
}

fn loop_gone() -> CaptureError {
    CaptureError::StreamStartFailure("controller loop is not running".to_string())
}

/// コントローラループを起動する
///
/// コントローラはループ専用スレッドで構築される。構築クロージャには
/// ストリーム監視者として使えるハンドル（StreamObserver実装）が渡される。
///
/// # Returns
/// `(handle, join_handle)` - 要求送信用ハンドルとスレッドのJoinHandle
pub fn spawn_controller<B, F>(build: F) -> (ControllerHandle, JoinHandle<()>)
where
    B: CaptureBackend + 'static,
    F: FnOnce(Arc<dyn StreamObserver>) -> CaptureSessionController<B> + Send + 'static,
{
    let (tx, rx) = unbounded();
    let handle = ControllerHandle { tx };
    let observer_handle = handle.clone();

    let join = std::thread::Builder::new()
        .name("capture-controller".to_string())
        .spawn(move || {
            let controller = build(Arc::new(observer_handle));
            controller_loop(controller, rx);
        })
        .expect("Failed to spawn controller thread");

    (handle, join)
}

/// ループ本体
///
/// 要求を1件ずつ処理する。チャネルが閉じた場合もセッションを片付けて抜ける。
fn controller_loop<B: CaptureBackend>(
    mut controller: CaptureSessionController<B>,
    rx: Receiver<ControllerRequest>,
) {
    tracing::info!("Controller loop started");

    for request in rx.iter() {
        match request {
            ControllerRequest::Start {
                mode,
                display,
                reply,
            } => {
                let result = controller.start_capture(mode, display);
                let _ = reply.send(result);
            }
            ControllerRequest::Stop { reply } => {
                controller.stop_capture();
                let _ = reply.send(());
            }
            ControllerRequest::DisplayParametersChanged => {
                controller.handle_display_geometry_changed();
            }
            ControllerRequest::StreamError { reason } => {
                controller.handle_stream_error(&reason);
            }
            ControllerRequest::Shutdown => break,
        }
    }

    // 終了時は必ずセッションを片付ける
    controller.stop_capture();
    tracing::info!("Controller loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::CaptureConfig;
    use crate::domain::ports::AppEvent;
    use crate::domain::types::{DisplayGeometry, RectF, SizeF, SourceWindow, WindowId};
    use crate::infrastructure::capture::mock::{MockBackendProbe, MockCaptureAdapter};
    use crate::infrastructure::displays::StaticDisplayAdapter;
    use crate::infrastructure::events::RecordingEventSink;
    use crate::infrastructure::sources::StaticSourceAdapter;
    use crate::infrastructure::surface::headless::{HeadlessSurfaceHost, SurfaceProbe};
    use std::time::Duration;

    const DISPLAY: DisplayId = DisplayId(1);
    const WINDOW: WindowId = WindowId(77);

    fn spawn_fixture() -> (
        ControllerHandle,
        JoinHandle<()>,
        Arc<MockBackendProbe>,
        Arc<SurfaceProbe>,
        Arc<RecordingEventSink>,
    ) {
        let backend_probe = Arc::new(MockBackendProbe::default());
        let surface_probe = Arc::new(SurfaceProbe::default());
        let events = Arc::new(RecordingEventSink::default());

        let sources = Arc::new(StaticSourceAdapter::new(vec![SourceWindow {
            id: WINDOW,
            title: "Browser".to_string(),
            application_name: "Web".to_string(),
            owner_pid: 1,
            on_screen: true,
            frame: SizeF::new(1200.0, 900.0),
        }]));
        let displays = Arc::new(StaticDisplayAdapter::new());
        displays.set_geometry(
            DISPLAY,
            DisplayGeometry {
                frame: RectF::new(0.0, 0.0, 1920.0, 1105.0),
                visible_frame: RectF::new(0.0, 25.0, 1920.0, 1080.0),
                scale_factor: 2.0,
            },
        );

        let bp = backend_probe.clone();
        let sp = surface_probe.clone();
        let ev = events.clone();
        let (handle, join) = spawn_controller(move |observer| {
            CaptureSessionController::new(
                MockCaptureAdapter::with_probe(bp),
                sources,
                displays,
                Box::new(HeadlessSurfaceHost::with_probe(sp)),
                ev,
                observer,
                CaptureConfig::default(),
                Duration::from_secs(3600),
            )
        });

        (handle, join, backend_probe, surface_probe, events)
    }

    #[test]
    fn test_start_and_stop_through_loop() {
        let (handle, join, backend_probe, surface_probe, _events) = spawn_fixture();

        handle
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");
        assert_eq!(backend_probe.opened(), 1);
        assert_eq!(surface_probe.open(), 1);

        handle.stop_capture();
        assert_eq!(surface_probe.open(), 0);

        handle.shutdown();
        join.join().expect("loop panicked");
    }

    #[test]
    fn test_stream_error_via_observer_handle() {
        let (handle, join, backend_probe, surface_probe, events) = spawn_fixture();

        handle
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");

        // バックエンド監視経路と同じAPIで通知する
        handle.notify_stream_error("simulated device loss".to_string());

        // 停止はランデブーなので、これが返った時点でエラー処理も完了している
        handle.stop_capture();
        assert_eq!(surface_probe.open(), 0);
        assert_eq!(backend_probe.streams().len(), 1);

        let recorded = events.take();
        assert!(recorded
            .iter()
            .any(|e| matches!(e, AppEvent::StreamEnded { .. })));

        handle.shutdown();
        join.join().expect("loop panicked");
    }

    #[test]
    fn test_shutdown_stops_active_session() {
        let (handle, join, _backend_probe, surface_probe, _events) = spawn_fixture();

        handle
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");

        handle.shutdown();
        join.join().expect("loop panicked");

        // ループ終了時にセッションが片付けられている
        assert_eq!(surface_probe.open(), 0);
    }

    #[test]
    fn test_requests_after_shutdown_fail_gracefully() {
        let (handle, join, _bp, _sp, _ev) = spawn_fixture();
        handle.shutdown();
        join.join().expect("loop panicked");

        let result = handle.start_capture(CaptureMode::Window(WINDOW), DISPLAY);
        assert!(matches!(result, Err(CaptureError::StreamStartFailure(_))));

        // stopはループ消滅後も失敗しない
        handle.stop_capture();
    }
}
