mod application;
mod domain;
mod infrastructure;
mod logging;

use crate::application::controller::CaptureSessionController;
use crate::application::runner::spawn_controller;
use crate::application::watcher::DisplayChangeWatcher;
use crate::domain::config::{AppConfig, CaptureBackendKind};
use crate::domain::ports::{DisplayTopologyPort, SourceEnumerationPort};
use crate::domain::types::{CaptureMode, DisplayId};
use crate::infrastructure::capture::CaptureSelector;
use crate::infrastructure::events::LogEventSink;
use crate::logging::init_logging;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    // ログシステムの初期化（非同期ファイル出力）
    let log_dir = PathBuf::from("logs");
    let _guard = init_logging("info", false, Some(log_dir));
    // 注意: _guardはmain終了まで保持する必要がある（Dropでログスレッドが終了）

    tracing::info!("deskmirror starting...");

    match run() {
        Ok(_) => {
            tracing::info!("deskmirror terminated gracefully.");
        }
        Err(e) => {
            tracing::error!("Fatal error: {:?}", e);
            std::process::exit(1);
        }
    }
}

/// アプリケーションのメイン処理
fn run() -> anyhow::Result<()> {
    // 設定ファイルの読み込み（存在しない場合はデフォルト設定を使用）
    let config = match AppConfig::from_file("config.toml") {
        Ok(config) => {
            tracing::info!("Loaded configuration from config.toml");
            config
        }
        Err(e) => {
            tracing::warn!("Failed to load config.toml: {:?}, using defaults", e);
            AppConfig::default()
        }
    };

    config.validate().context("Configuration validation failed")?;

    tracing::info!(
        "Capture: backend={:?}, fps_cap={}, queue_depth={}, oversampling={}x",
        config.capture.backend,
        config.capture.frame_rate_cap,
        config.capture.queue_depth,
        config.capture.oversampling
    );

    // キャプチャバックエンドの構築
    let frame_interval = Duration::from_secs(1) / config.capture.frame_rate_cap.max(1);
    let mut backend_kind = config.capture.backend;
    if !cfg!(windows) && backend_kind == CaptureBackendKind::Wgc {
        tracing::warn!("WGC backend is unavailable on this platform, falling back to mock");
        backend_kind = CaptureBackendKind::Mock;
    }
    let backend = CaptureSelector::from_kind(backend_kind, frame_interval)?;
    tracing::info!("Capture backend: {}", backend.backend_type());

    // プラットフォームアダプタの構築
    let (sources, displays, target_display) = build_platform_adapters(&config)?;

    let surface_config = config.surface.clone();
    let capture_config = config.capture.clone();
    let stats_interval = config.pipeline.stats_interval();
    let sources_for_controller = sources.clone();
    let displays_for_controller = displays.clone();

    // コントローラループの起動
    let (handle, controller_join) = spawn_controller(move |observer| {
        CaptureSessionController::new(
            backend,
            sources_for_controller,
            displays_for_controller,
            build_surface_host(surface_config),
            Arc::new(LogEventSink),
            observer,
            capture_config,
            stats_interval,
        )
    });

    // ディスプレイ構成変更の監視
    let notifications = subscribe_display_changes(&config);
    let _watcher = DisplayChangeWatcher::spawn(notifications, handle.clone());

    // 初期モードはFullDesktop（セッションなし、仮想ディスプレイ自身の出力）
    handle.start_capture(CaptureMode::FullDesktop, target_display)?;

    // モックバックエンドの場合はデモとして最初のソースをキャプチャする
    if backend_kind == CaptureBackendKind::Mock {
        let windows = sources.capturable_windows()?;
        if let Some(window) = windows.first() {
            tracing::info!(
                "Demo: capturing synthetic source '{}' ({})",
                window.title,
                window.application_name
            );
            handle.start_capture(CaptureMode::Window(window.id), target_display)?;
        }
    }

    tracing::info!("deskmirror running (capture selection is driven externally)");

    // コントローラループが終了するまで待機
    controller_join
        .join()
        .map_err(|_| anyhow::anyhow!("Controller loop panicked"))?;

    Ok(())
}

/// プラットフォーム依存のアダプタを構築する（Windows: Win32実装）
#[cfg(windows)]
fn build_platform_adapters(
    _config: &AppConfig,
) -> anyhow::Result<(
    Arc<dyn SourceEnumerationPort>,
    Arc<dyn DisplayTopologyPort>,
    DisplayId,
)> {
    use crate::infrastructure::displays::Win32DisplayAdapter;
    use crate::infrastructure::sources::Win32SourceAdapter;

    let displays = Arc::new(Win32DisplayAdapter::new());
    let target = displays
        .displays()
        .into_iter()
        .next()
        .context("No displays found")?;

    tracing::info!(display = target.0, "Target display selected");

    Ok((Arc::new(Win32SourceAdapter::new()), displays, target))
}

/// プラットフォーム依存のアダプタを構築する（非Windows: モック構成）
#[cfg(not(windows))]
fn build_platform_adapters(
    _config: &AppConfig,
) -> anyhow::Result<(
    Arc<dyn SourceEnumerationPort>,
    Arc<dyn DisplayTopologyPort>,
    DisplayId,
)> {
    use crate::domain::types::{DisplayGeometry, RectF, SizeF, SourceWindow, WindowId};
    use crate::infrastructure::displays::StaticDisplayAdapter;
    use crate::infrastructure::sources::StaticSourceAdapter;

    let target = DisplayId(1);
    let displays = Arc::new(StaticDisplayAdapter::new());
    displays.set_geometry(
        target,
        DisplayGeometry {
            frame: RectF::new(0.0, 0.0, 1280.0, 720.0),
            visible_frame: RectF::new(0.0, 0.0, 1280.0, 720.0),
            scale_factor: 1.0,
        },
    );

    let sources = Arc::new(StaticSourceAdapter::new(vec![SourceWindow {
        id: WindowId(1),
        title: "Synthetic Source".to_string(),
        application_name: "deskmirror".to_string(),
        owner_pid: std::process::id(),
        on_screen: true,
        frame: SizeF::new(1280.0, 720.0),
    }]));

    Ok((sources, displays, target))
}

/// 出力サーフェスホストを構築する
#[cfg(windows)]
fn build_surface_host(
    config: crate::domain::config::SurfaceConfig,
) -> Box<dyn crate::domain::ports::SurfaceHost> {
    Box::new(crate::infrastructure::surface::OverlaySurfaceHost::new(
        config,
    ))
}

#[cfg(not(windows))]
fn build_surface_host(
    _config: crate::domain::config::SurfaceConfig,
) -> Box<dyn crate::domain::ports::SurfaceHost> {
    Box::new(crate::infrastructure::surface::HeadlessSurfaceHost::new())
}

/// ディスプレイ構成変更の通知チャネルを用意する
#[cfg(windows)]
fn subscribe_display_changes(
    config: &AppConfig,
) -> crossbeam_channel::Receiver<crate::domain::ports::DisplayNotification> {
    use crate::infrastructure::displays::Win32DisplayAdapter;

    Win32DisplayAdapter::new().start_change_polling(config.pipeline.display_poll_interval())
}

#[cfg(not(windows))]
fn subscribe_display_changes(
    _config: &AppConfig,
) -> crossbeam_channel::Receiver<crate::domain::ports::DisplayNotification> {
    // 静的トポロジでは構成変更は発生しない。閉じないチャネルを返す
    let (tx, rx) = crossbeam_channel::unbounded();
    std::mem::forget(tx);
    rx
}
