//! 設定管理
//!
//! TOML設定ファイルの読み込みとDomain型への変換。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::error::{CaptureError, CaptureResult};
use crate::domain::types::{PixelFormat, StreamConfig};

/// キャプチャバックエンド
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackendKind {
    /// Windows Graphics Capture（Win10 1803+、ウィンドウ単位キャプチャ）
    #[default]
    Wgc,
    /// 合成フレーム生成バックエンド（テスト・非Windows環境用）
    Mock,
}

/// アプリケーション設定のルート構造
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// キャプチャ設定
    pub capture: CaptureConfig,
    /// 出力サーフェス設定
    #[serde(default)]
    pub surface: SurfaceConfig,
    /// パイプライン設定
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// キャプチャ設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureConfig {
    /// キャプチャバックエンド
    ///
    /// 選択肢: "wgc", "mock"
    /// デフォルト: "wgc"
    #[serde(default)]
    pub backend: CaptureBackendKind,

    /// フレームレート上限（fps）
    ///
    /// デフォルト: 60
    pub frame_rate_cap: u32,

    /// バックエンド内部のフレームキュー深さ
    ///
    /// デフォルト: 3
    pub queue_depth: u32,

    /// オーバーサンプリング係数
    ///
    /// 可視フレームの物理ピクセル数に掛けてキャプチャ解像度を決める。
    /// 拡大表示時の文字のシャープさを保つための係数。
    /// デフォルト: 3
    pub oversampling: u32,

    /// カーソルを含めてキャプチャするか
    ///
    /// デフォルト: true
    pub show_cursor: bool,
}

impl CaptureConfig {
    /// デフォルトのフレームレート上限（fps）
    pub const DEFAULT_FRAME_RATE_CAP: u32 = 60;
    /// デフォルトのキュー深さ
    pub const DEFAULT_QUEUE_DEPTH: u32 = 3;
    /// デフォルトのオーバーサンプリング係数
    pub const DEFAULT_OVERSAMPLING: u32 = 3;

    /// 目標解像度からストリーム構成を組み立てる
    pub fn stream_config(&self, width: u32, height: u32) -> StreamConfig {
        StreamConfig {
            width,
            height,
            pixel_format: PixelFormat::Bgra8,
            frame_rate_cap: self.frame_rate_cap,
            queue_depth: self.queue_depth,
            show_cursor: self.show_cursor,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackendKind::default(),
            frame_rate_cap: Self::DEFAULT_FRAME_RATE_CAP,
            queue_depth: Self::DEFAULT_QUEUE_DEPTH,
            oversampling: Self::DEFAULT_OVERSAMPLING,
            show_cursor: true,
        }
    }
}

/// 出力サーフェス設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SurfaceConfig {
    /// サーフェスを通常ウィンドウより前面に置くか
    pub topmost: bool,

    /// 不透明描画を使うか（半透明合成より効率が良い）
    pub opaque: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            topmost: true,
            opaque: true,
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    /// 配信統計の出力間隔（秒）
    pub stats_interval_sec: u64,

    /// ディスプレイ構成変更の監視間隔（ミリ秒）
    pub display_poll_interval_ms: u64,
}

impl PipelineConfig {
    /// デフォルトの統計出力間隔（秒）
    pub const DEFAULT_STATS_INTERVAL_SEC: u64 = 10;
    /// デフォルトのディスプレイ監視間隔（ミリ秒）
    pub const DEFAULT_DISPLAY_POLL_INTERVAL_MS: u64 = 1000;

    /// 統計出力間隔をDurationとして取得
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_sec)
    }

    /// ディスプレイ監視間隔をDurationとして取得
    pub fn display_poll_interval(&self) -> Duration {
        Duration::from_millis(self.display_poll_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stats_interval_sec: Self::DEFAULT_STATS_INTERVAL_SEC,
            display_poll_interval_ms: Self::DEFAULT_DISPLAY_POLL_INTERVAL_MS,
        }
    }
}

impl AppConfig {
    /// TOMLファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> CaptureResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CaptureError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content)
            .map_err(|e| CaptureError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// デフォルト設定をTOMLファイルに書き出す
    pub fn write_default<P: AsRef<Path>>(path: P) -> CaptureResult<()> {
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| CaptureError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CaptureError::Configuration(format!("Failed to write config file: {}", e)))
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> CaptureResult<()> {
        if self.capture.frame_rate_cap == 0 || self.capture.frame_rate_cap > 240 {
            return Err(CaptureError::Configuration(
                "frame_rate_cap must be between 1 and 240".to_string(),
            ));
        }

        if self.capture.queue_depth == 0 || self.capture.queue_depth > 8 {
            return Err(CaptureError::Configuration(
                "queue_depth must be between 1 and 8".to_string(),
            ));
        }

        // 1はオーバーサンプリングなし。4超はメモリ帯域の無駄が大きい
        if self.capture.oversampling == 0 || self.capture.oversampling > 4 {
            return Err(CaptureError::Configuration(
                "oversampling must be between 1 and 4".to_string(),
            ));
        }

        if self.pipeline.display_poll_interval_ms == 0 {
            return Err(CaptureError::Configuration(
                "display_poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.capture.backend, CaptureBackendKind::Wgc);
        assert_eq!(config.capture.frame_rate_cap, 60);
        assert_eq!(config.capture.queue_depth, 3);
        assert_eq!(config.capture.oversampling, 3);
        assert!(config.capture.show_cursor);
        assert_eq!(config.pipeline.stats_interval_sec, 10);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        // 不正なフレームレート
        config.capture.frame_rate_cap = 0;
        assert!(config.validate().is_err());
        config.capture.frame_rate_cap = 60;

        // 不正なキュー深さ
        config.capture.queue_depth = 0;
        assert!(config.validate().is_err());
        config.capture.queue_depth = 3;

        // 不正なオーバーサンプリング
        config.capture.oversampling = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_kind_parsing() {
        let toml = r#"
            [capture]
            backend = "mock"
            frame_rate_cap = 30
            queue_depth = 2
            oversampling = 1
            show_cursor = false
        "#;
        let config: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(config.capture.backend, CaptureBackendKind::Mock);
        assert_eq!(config.capture.frame_rate_cap, 30);
        assert!(!config.capture.show_cursor);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        // [surface]と[pipeline]は省略可能
        let toml = r#"
            [capture]
            frame_rate_cap = 60
            queue_depth = 3
            oversampling = 3
            show_cursor = true
        "#;
        let config: AppConfig = toml::from_str(toml).expect("parse failed");
        assert!(config.surface.topmost);
        assert!(config.surface.opaque);
        assert_eq!(
            config.pipeline.display_poll_interval_ms,
            PipelineConfig::DEFAULT_DISPLAY_POLL_INTERVAL_MS
        );
    }

    #[test]
    fn test_stream_config_from_capture_config() {
        let capture = CaptureConfig::default();
        let stream = capture.stream_config(11520, 6480);
        assert_eq!(stream.resolution(), (11520, 6480));
        assert_eq!(stream.pixel_format, PixelFormat::Bgra8);
        assert_eq!(stream.frame_rate_cap, 60);
        assert_eq!(stream.queue_depth, 3);
    }

    #[test]
    fn test_config_loads() {
        // config.tomlが正常に読み込めることを確認
        let config = AppConfig::from_file("config.toml").expect("config.toml could not be read");
        config.validate().expect("config.toml failed validation");
    }

    #[test]
    fn test_config_example_loads() {
        // config.toml.exampleが正常に読み込めることを確認
        let config = AppConfig::from_file("config.toml.example")
            .expect("config.toml.example could not be read");
        config.validate().expect("example config failed validation");
    }

    #[test]
    fn test_write_default_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("config.toml");

        AppConfig::write_default(&path).expect("write failed");
        let loaded = AppConfig::from_file(&path).expect("reload failed");

        assert_eq!(loaded.capture.frame_rate_cap, 60);
        assert!(loaded.validate().is_ok());
    }
}
