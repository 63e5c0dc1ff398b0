//! キャプチャセッションコントローラ
//!
//! アクティブなキャプチャセッション（最大1つ）のライフサイクルを所有する。
//! ソース選択、目標解像度の計算、ストリームの開始・停止・再構成、
//! オーバーレイ出力サーフェスの生成・破棄を担う。
//!
//! # 状態機械
//! `Idle -> Starting -> Active -> (Reconfiguring -> Active)* -> Stopping -> Idle`
//!
//! Startingで失敗した場合は、途中で確保したリソースを解放してIdleへ戻る。
//!
//! # スレッドモデル
//! すべての状態変更は単一のコントローラループスレッド（runner参照）上で
//! 直列化されるため、コントローラ自身はロックを持たない。

use std::sync::Arc;
use std::time::Duration;

use crate::application::delivery::StreamOutputAdapter;
use crate::domain::config::CaptureConfig;
use crate::domain::error::{CaptureError, CaptureResult};
use crate::domain::ports::{
    AppEvent, CaptureBackend, CaptureStream, DisplayTopologyPort, EventSink, FrameSink,
    OutputSurface, SourceEnumerationPort, StreamObserver, SurfaceHost,
};
use crate::domain::types::{target_geometry, CaptureMode, DisplayId, StreamConfig, WindowId};

/// コントローラの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// セッションなし
    Idle,
    /// セッション開始処理中
    Starting,
    /// セッション稼働中
    Active,
    /// ディスプレイ形状変更への追従中
    Reconfiguring,
    /// セッション停止処理中
    Stopping,
}

/// アクティブなキャプチャセッション
///
/// ストリームハンドル、現在の構成、出力サーフェス、配信アダプタを束ねる。
struct ActiveSession {
    window: WindowId,
    display: DisplayId,
    stream: Box<dyn CaptureStream>,
    config: StreamConfig,
    surface: Box<dyn OutputSurface>,
    delivery: Arc<StreamOutputAdapter>,
}

/// キャプチャセッションコントローラ
pub struct CaptureSessionController<B: CaptureBackend> {
    backend: B,
    sources: Arc<dyn SourceEnumerationPort>,
    displays: Arc<dyn DisplayTopologyPort>,
    surfaces: Box<dyn SurfaceHost>,
    events: Arc<dyn EventSink>,
    observer: Arc<dyn StreamObserver>,
    capture_config: CaptureConfig,
    stats_interval: Duration,
    session: Option<ActiveSession>,
    state: ControllerState,
}

impl<B: CaptureBackend> CaptureSessionController<B> {
    /// 新しいコントローラを作成
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: B,
        sources: Arc<dyn SourceEnumerationPort>,
        displays: Arc<dyn DisplayTopologyPort>,
        surfaces: Box<dyn SurfaceHost>,
        events: Arc<dyn EventSink>,
        observer: Arc<dyn StreamObserver>,
        capture_config: CaptureConfig,
        stats_interval: Duration,
    ) -> Self {
        Self {
            backend,
            sources,
            displays,
            surfaces,
            events,
            observer,
            capture_config,
            stats_interval,
            session: None,
            state: ControllerState::Idle,
        }
    }

    /// 現在の状態を取得
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// セッション稼働中か
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// アクティブセッションの構成解像度を取得（テスト・診断用）
    pub fn session_resolution(&self) -> Option<(u32, u32)> {
        self.session.as_ref().map(|s| s.config.resolution())
    }

    /// セッションがバインドされているディスプレイを取得
    pub fn bound_display(&self) -> Option<DisplayId> {
        self.session.as_ref().map(|s| s.display)
    }

    /// キャプチャを開始する
    ///
    /// `FullDesktop`はアクティブなセッションを停止するだけで、オーバーレイは
    /// 作らない（仮想ディスプレイ自身のコンポジタ出力が表示される）。
    ///
    /// `Window(id)`は前セッションの完全停止後に新セッションを開始する
    /// （逐次置き換え。2セッションが同時に存在する瞬間はない）。
    pub fn start_capture(&mut self, mode: CaptureMode, display: DisplayId) -> CaptureResult<()> {
        match mode {
            CaptureMode::FullDesktop => {
                self.stop_capture();
                self.events.emit(AppEvent::ModeChanged(CaptureMode::FullDesktop));
                Ok(())
            }
            CaptureMode::Window(window) => match self.start_window_capture(window, display) {
                Ok(()) => {
                    self.events.emit(AppEvent::ModeChanged(mode));
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(window = window.0, error = %e, "Window capture start failed");
                    // 失敗はFullDesktopへのフォールバックとしてイベント通知される。
                    // モードの巻き戻し自体は選択レイヤの責務
                    self.events.emit(AppEvent::CaptureFailed {
                        requested: mode,
                        error: e.to_string(),
                    });
                    Err(e)
                }
            },
        }
    }

    fn start_window_capture(&mut self, window: WindowId, display: DisplayId) -> CaptureResult<()> {
        // ソースとディスプレイの解決は前セッションに触れる前に行う。
        // 解決失敗時は既存セッションを無傷のまま残す
        let windows = self.sources.capturable_windows()?;
        if !windows.iter().any(|w| w.id == window) {
            return Err(CaptureError::SourceNotFound);
        }

        let geometry = self
            .displays
            .geometry(display)
            .ok_or(CaptureError::SourceNotFound)?;

        // 逐次置き換え: 前セッションを完全に停止してから開始する
        self.stop_capture();
        self.state = ControllerState::Starting;

        let (width, height) = target_geometry(&geometry, self.capture_config.oversampling);
        let config = self.capture_config.stream_config(width, height);

        let window_id = window.0;
        let display_id = display.0;
        tracing::info!(
            window = window_id,
            display = display_id,
            width,
            height,
            "Starting window capture"
        );

        // セッションごとに新しい配信アダプタを作る。旧ストリームの遅延フレームが
        // 新しいサーフェスへ流れ込むのを防ぐ
        let delivery = Arc::new(StreamOutputAdapter::new(self.stats_interval));
        let sink: Arc<dyn FrameSink> = delivery.clone();

        let stream = match self
            .backend
            .open_stream(window, &config, sink, self.observer.clone())
        {
            Ok(stream) => stream,
            Err(e) => {
                self.state = ControllerState::Idle;
                return Err(e);
            }
        };

        let surface = match self
            .surfaces
            .create_surface(geometry.visible_frame, geometry.scale_factor)
        {
            Ok(surface) => surface,
            Err(e) => {
                // 開始途中で確保したストリームを解放してから失敗を返す
                let mut stream = stream;
                stream.request_stop();
                self.state = ControllerState::Idle;
                return Err(e);
            }
        };

        delivery.bind(&surface.presentation_sink());

        self.session = Some(ActiveSession {
            window,
            display,
            stream,
            config,
            surface,
            delivery,
        });
        self.state = ControllerState::Active;

        Ok(())
    }

    /// キャプチャを停止する（冪等）
    ///
    /// ストリームへの停止要求は非同期（fire-and-forget）だが、コントローラの
    /// 可視状態（ハンドル消去、シンク解除、サーフェス破棄）はこの呼び出しが
    /// 返る時点で整合している。後続のstart_captureが未完了の停止と競合しない。
    pub fn stop_capture(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.state = ControllerState::Idle;
            return;
        };

        self.state = ControllerState::Stopping;
        tracing::info!(window = session.window.0, "Stopping capture session");

        // 以降に届くフレームはアダプタが黙って破棄する
        session.delivery.unbind();
        session.stream.request_stop();
        session.surface.close();

        self.state = ControllerState::Idle;
    }

    /// ディスプレイ構成変更への追従
    ///
    /// セッションがなければ何もしない。目標解像度が変わっていなければ
    /// ストリーム更新もサーフェス再配置も行わない。
    ///
    /// 変わっていた場合はストリームを再起動せずに構成を更新し（高速パス）、
    /// サーフェスを新しい可視フレームに合わせる。この経路の失敗は
    /// ベストエフォートで握りつぶす: 動いているキャプチャを壊すより、
    /// 旧解像度のまま継続するほうがよい。
    pub fn handle_display_geometry_changed(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let Some(geometry) = self.displays.geometry(session.display) else {
            // 変更通知の最中にディスプレイが消えた。セッションはそのまま残し、
            // ストリーム側のエラー通知か明示的なstopに任せる
            tracing::debug!(display = session.display.0, "Bound display not found");
            return;
        };

        let (width, height) = target_geometry(&geometry, self.capture_config.oversampling);
        if (width, height) == session.config.resolution() {
            return;
        }

        self.state = ControllerState::Reconfiguring;
        tracing::info!(
            display = session.display.0,
            width,
            height,
            "Display geometry changed, reconfiguring stream"
        );

        let mut next = session.config.clone();
        next.width = width;
        next.height = height;

        match session.stream.update_configuration(&next) {
            Ok(()) => {
                session.config = next;

                if let Err(e) = session.surface.set_frame(geometry.visible_frame) {
                    tracing::warn!(error = %e, "Surface resize failed after reconfiguration");
                }
                session.surface.set_scale_factor(geometry.scale_factor);
            }
            Err(e) => {
                // 旧解像度のまま継続
                tracing::warn!(error = %e, "Stream reconfiguration failed, keeping old resolution");
            }
        }

        self.state = ControllerState::Active;
    }

    /// バックエンドからの非同期ストリームエラー通知
    ///
    /// 致命的エラーとして扱い、セッションを破棄する。再試行はしない。
    /// 再選択を促すかどうかは外側のレイヤが決める。
    pub fn handle_stream_error(&mut self, reason: &str) {
        if self.session.is_none() {
            return;
        }

        tracing::error!(reason, "Stream reported fatal error, tearing down session");
        self.stop_capture();
        self.events.emit(AppEvent::StreamEnded {
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullStreamObserver;
    use crate::domain::types::{DisplayGeometry, RectF, SizeF, SourceWindow};
    use crate::infrastructure::capture::mock::{MockBackendProbe, MockCaptureAdapter};
    use crate::infrastructure::displays::StaticDisplayAdapter;
    use crate::infrastructure::events::RecordingEventSink;
    use crate::infrastructure::sources::StaticSourceAdapter;
    use crate::infrastructure::surface::headless::{HeadlessSurfaceHost, SurfaceProbe};

    const DISPLAY: DisplayId = DisplayId(1);
    const WINDOW: WindowId = WindowId(10);

    fn source_window(id: WindowId) -> SourceWindow {
        SourceWindow {
            id,
            title: "Terminal".to_string(),
            application_name: "Shell".to_string(),
            owner_pid: 321,
            on_screen: true,
            frame: SizeF::new(1024.0, 768.0),
        }
    }

    fn geometry() -> DisplayGeometry {
        DisplayGeometry {
            frame: RectF::new(0.0, 0.0, 1920.0, 1105.0),
            visible_frame: RectF::new(0.0, 25.0, 1920.0, 1080.0),
            scale_factor: 2.0,
        }
    }

    struct Fixture {
        backend_probe: Arc<MockBackendProbe>,
        surface_probe: Arc<SurfaceProbe>,
        events: Arc<RecordingEventSink>,
        sources: Arc<StaticSourceAdapter>,
        displays: Arc<StaticDisplayAdapter>,
        controller: CaptureSessionController<MockCaptureAdapter>,
    }

    fn fixture() -> Fixture {
        let backend_probe = Arc::new(MockBackendProbe::default());
        let backend = MockCaptureAdapter::with_probe(backend_probe.clone());

        let surface_probe = Arc::new(SurfaceProbe::default());
        let surfaces = HeadlessSurfaceHost::with_probe(surface_probe.clone());

        let sources = Arc::new(StaticSourceAdapter::new(vec![source_window(WINDOW)]));
        let displays = Arc::new(StaticDisplayAdapter::new());
        displays.set_geometry(DISPLAY, geometry());

        let events = Arc::new(RecordingEventSink::default());

        let controller = CaptureSessionController::new(
            backend,
            sources.clone(),
            displays.clone(),
            Box::new(surfaces),
            events.clone(),
            Arc::new(NullStreamObserver),
            CaptureConfig::default(),
            Duration::from_secs(3600),
        );

        Fixture {
            backend_probe,
            surface_probe,
            events,
            sources,
            displays,
            controller,
        }
    }

    #[test]
    fn test_full_desktop_start_requires_no_session() {
        let mut f = fixture();

        let result = f.controller.start_capture(CaptureMode::FullDesktop, DISPLAY);

        assert!(result.is_ok());
        assert_eq!(f.controller.state(), ControllerState::Idle);
        assert!(!f.controller.is_active());
        assert_eq!(f.surface_probe.created(), 0);
        assert_eq!(
            f.events.take(),
            vec![AppEvent::ModeChanged(CaptureMode::FullDesktop)]
        );
    }

    #[test]
    fn test_window_start_creates_session_and_surface() {
        let mut f = fixture();

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");

        assert_eq!(f.controller.state(), ControllerState::Active);
        assert_eq!(f.backend_probe.opened(), 1);
        assert_eq!(f.surface_probe.open(), 1);
        // 1920x1080 @ 2x、3倍オーバーサンプリング
        assert_eq!(f.controller.session_resolution(), Some((11520, 6480)));
        assert_eq!(
            f.events.take(),
            vec![AppEvent::ModeChanged(CaptureMode::Window(WINDOW))]
        );
    }

    #[test]
    fn test_missing_window_leaves_prior_session_untouched() {
        let mut f = fixture();

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");
        f.events.take();

        let result = f
            .controller
            .start_capture(CaptureMode::Window(WindowId(999)), DISPLAY);

        assert_eq!(result, Err(CaptureError::SourceNotFound));
        // 前セッションは稼働を続ける
        assert_eq!(f.controller.state(), ControllerState::Active);
        assert_eq!(f.backend_probe.opened(), 1);
        assert_eq!(f.surface_probe.open(), 1);
        assert!(matches!(
            f.events.take().as_slice(),
            [AppEvent::CaptureFailed { .. }]
        ));
    }

    #[test]
    fn test_missing_display_is_source_not_found() {
        let mut f = fixture();

        let result = f
            .controller
            .start_capture(CaptureMode::Window(WINDOW), DisplayId(404));

        assert_eq!(result, Err(CaptureError::SourceNotFound));
        assert_eq!(f.controller.state(), ControllerState::Idle);
    }

    #[test]
    fn test_backend_failure_returns_to_idle() {
        let mut f = fixture();
        f.backend_probe
            .fail_next_open(CaptureError::StreamStartFailure("busy".to_string()));

        let result = f.controller.start_capture(CaptureMode::Window(WINDOW), DISPLAY);

        assert!(matches!(result, Err(CaptureError::StreamStartFailure(_))));
        assert_eq!(f.controller.state(), ControllerState::Idle);
        assert_eq!(f.surface_probe.open(), 0);
    }

    #[test]
    fn test_surface_failure_releases_stream() {
        let mut f = fixture();
        f.surface_probe
            .fail_next_create(CaptureError::Surface("no compositor".to_string()));

        let result = f.controller.start_capture(CaptureMode::Window(WINDOW), DISPLAY);

        assert!(matches!(result, Err(CaptureError::Surface(_))));
        assert_eq!(f.controller.state(), ControllerState::Idle);
        // 途中で開いたストリームには停止が要求されている
        let streams = f.backend_probe.streams();
        assert_eq!(streams.len(), 1);
        assert!(streams[0].stop_requested());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut f = fixture();

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");

        f.controller.stop_capture();
        assert_eq!(f.controller.state(), ControllerState::Idle);
        assert_eq!(f.surface_probe.open(), 0);

        // 2回目は何も起きない
        f.controller.stop_capture();
        assert_eq!(f.controller.state(), ControllerState::Idle);
    }

    #[test]
    fn test_sequential_replace_on_window_switch() {
        let mut f = fixture();
        let window_b = WindowId(11);
        f.sources
            .set_windows(vec![source_window(WINDOW), source_window(window_b)]);

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start A failed");
        f.controller
            .start_capture(CaptureMode::Window(window_b), DISPLAY)
            .expect("start B failed");

        let streams = f.backend_probe.streams();
        assert_eq!(streams.len(), 2);
        // Aのストリームは停止済み、Bのみ稼働
        assert!(streams[0].stop_requested());
        assert!(!streams[1].stop_requested());
        assert_eq!(f.surface_probe.open(), 1);
        assert_eq!(f.surface_probe.created(), 2);
    }

    #[test]
    fn test_geometry_change_updates_stream_in_place() {
        let mut f = fixture();

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");

        // 可視フレームが縮んだ
        let mut geom = geometry();
        geom.visible_frame = RectF::new(0.0, 25.0, 1280.0, 720.0);
        f.displays.set_geometry(DISPLAY, geom);

        f.controller.handle_display_geometry_changed();

        assert_eq!(f.controller.state(), ControllerState::Active);
        // ストリームは同一のまま構成のみ更新
        let streams = f.backend_probe.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].update_count(), 1);
        assert!(!streams[0].stop_requested());
        assert_eq!(f.controller.session_resolution(), Some((7680, 4320)));
        // サーフェスも追従
        let surfaces = f.surface_probe.surfaces();
        assert_eq!(surfaces[0].frame().width, 1280.0);
        assert_eq!(surfaces[0].resize_count(), 1);
    }

    #[test]
    fn test_unchanged_geometry_is_noop() {
        let mut f = fixture();

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");

        f.controller.handle_display_geometry_changed();

        let streams = f.backend_probe.streams();
        assert_eq!(streams[0].update_count(), 0);
        assert_eq!(f.surface_probe.surfaces()[0].resize_count(), 0);
    }

    #[test]
    fn test_geometry_change_without_session_is_noop() {
        let mut f = fixture();
        f.controller.handle_display_geometry_changed();
        assert_eq!(f.controller.state(), ControllerState::Idle);
    }

    #[test]
    fn test_reconfiguration_failure_keeps_old_resolution() {
        let mut f = fixture();

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");

        let mut geom = geometry();
        geom.visible_frame = RectF::new(0.0, 25.0, 1280.0, 720.0);
        f.displays.set_geometry(DISPLAY, geom);

        f.backend_probe
            .streams()[0]
            .fail_next_update(CaptureError::StreamStartFailure("rejected".to_string()));

        f.controller.handle_display_geometry_changed();

        // 失敗は握りつぶし、旧解像度のままActiveを維持
        assert_eq!(f.controller.state(), ControllerState::Active);
        assert_eq!(f.controller.session_resolution(), Some((11520, 6480)));
        // サーフェスも触らない
        assert_eq!(f.surface_probe.surfaces()[0].resize_count(), 0);
    }

    #[test]
    fn test_stream_error_tears_down_session() {
        let mut f = fixture();

        f.controller
            .start_capture(CaptureMode::Window(WINDOW), DISPLAY)
            .expect("start failed");
        f.events.take();

        f.controller.handle_stream_error("device lost");

        assert_eq!(f.controller.state(), ControllerState::Idle);
        assert!(!f.controller.is_active());
        assert_eq!(f.surface_probe.open(), 0);
        assert_eq!(
            f.events.take(),
            vec![AppEvent::StreamEnded {
                reason: "device lost".to_string()
            }]
        );
    }

    #[test]
    fn test_stream_error_without_session_is_noop() {
        let mut f = fixture();
        f.controller.handle_stream_error("late notification");
        assert!(f.events.take().is_empty());
    }
}
