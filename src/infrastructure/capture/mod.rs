//! Capture実装: キャプチャバックエンドの具体実装
//!
//! WGC（Windows Graphics Capture）とモック（合成フレーム）の2方式を提供。

pub mod mock;
#[cfg(windows)]
pub mod wgc;

use std::sync::Arc;

use crate::domain::config::CaptureBackendKind;
use crate::domain::error::CaptureResult;
use crate::domain::ports::{CaptureBackend, CaptureStream, FrameSink, StreamObserver};
use crate::domain::types::{StreamConfig, WindowId};

use mock::MockCaptureAdapter;
#[cfg(windows)]
use wgc::WgcCaptureAdapter;

/// キャプチャバックエンドのセレクタ（実行時選択用）
///
/// ビルド時のfeatureフラグではなく、設定ファイルでバックエンドを選択する。
/// vtableのオーバーヘッドを避けるため、trait objectではなくenumでディスパッチ。
pub enum CaptureSelector {
    /// Windows Graphics Capture
    #[cfg(windows)]
    Wgc(WgcCaptureAdapter),
    /// 合成フレーム生成（テスト・非Windows環境）
    Mock(MockCaptureAdapter),
}

impl CaptureSelector {
    /// 設定からバックエンドを構築する
    pub fn from_kind(kind: CaptureBackendKind, frame_interval: std::time::Duration) -> CaptureResult<Self> {
        match kind {
            #[cfg(windows)]
            CaptureBackendKind::Wgc => Ok(CaptureSelector::Wgc(WgcCaptureAdapter::new()?)),
            #[cfg(not(windows))]
            CaptureBackendKind::Wgc => Err(crate::domain::error::CaptureError::Configuration(
                "WGC backend is only available on Windows (use backend = \"mock\")".to_string(),
            )),
            CaptureBackendKind::Mock => {
                Ok(CaptureSelector::Mock(MockCaptureAdapter::synthesizing(
                    frame_interval,
                )))
            }
        }
    }

    /// バックエンド名を取得
    pub fn backend_type(&self) -> &'static str {
        match self {
            #[cfg(windows)]
            CaptureSelector::Wgc(_) => "Windows Graphics Capture",
            CaptureSelector::Mock(_) => "Mock (synthetic frames)",
        }
    }
}

impl CaptureBackend for CaptureSelector {
    fn open_stream(
        &mut self,
        window: WindowId,
        config: &StreamConfig,
        sink: Arc<dyn FrameSink>,
        observer: Arc<dyn StreamObserver>,
    ) -> CaptureResult<Box<dyn CaptureStream>> {
        match self {
            #[cfg(windows)]
            CaptureSelector::Wgc(adapter) => adapter.open_stream(window, config, sink, observer),
            CaptureSelector::Mock(adapter) => adapter.open_stream(window, config, sink, observer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_mock_selector_from_kind() {
        let selector =
            CaptureSelector::from_kind(CaptureBackendKind::Mock, Duration::from_millis(33))
                .expect("mock selector failed");
        assert_eq!(selector.backend_type(), "Mock (synthetic frames)");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_wgc_unavailable_off_windows() {
        use crate::domain::error::CaptureError;

        let result = CaptureSelector::from_kind(CaptureBackendKind::Wgc, Duration::from_millis(33));
        assert!(matches!(result, Err(CaptureError::Configuration(_))));
    }
}
