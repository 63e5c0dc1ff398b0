/// エラー型定義
///
/// Domain層の統一エラー型。thiserrorを使用して型安全なエラー処理を提供します。
///
/// # 設計方針
/// - unwrap()の使用を禁止し、明示的なエラーハンドリングを強制
/// - 同期エラー（SourceNotFound / StreamStartFailure / PermissionDenied）は
///   start_capture()の呼び出し元へResultで返す
/// - 非同期エラー（StreamFatal）はバックエンド通知経由でコントローラへ届く

use thiserror::Error;

/// キャプチャパイプラインの統一エラー型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// 選択されたウィンドウがキャプチャ開始時点で存在しない
    #[error("capture source not found")]
    SourceNotFound,

    /// OSがキャプチャ権限を拒否した
    #[error("capture permission denied")]
    PermissionDenied,

    /// バックエンドがストリーム構成を拒否した（同期的な開始失敗）
    #[error("stream start failure: {0}")]
    StreamStartFailure(String),

    /// アクティブなストリームがバックエンド側で予期せず停止した（非同期）
    #[error("stream stopped unexpectedly: {0}")]
    StreamFatal(String),

    /// 出力サーフェスの作成・操作に失敗した
    #[error("surface error: {0}")]
    Surface(String),

    /// 設定関連のエラー
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// 統一Result型
pub type CaptureResult<T> = Result<T, CaptureError>;
