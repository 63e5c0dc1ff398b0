/// Port定義（Clean Architectureのインターフェース）
///
/// Domain層が外部実装に依存するための抽象trait。
/// Infrastructure層がこれらを実装し、Application層がDIで注入する。
/// コントローラはグローバルな状態コンテナを持たず、狭いポート
/// （列挙・ディスプレイ・イベント送出）だけを明示的に受け取る。

use std::sync::Arc;

use crate::domain::error::CaptureResult;
use crate::domain::types::{
    CaptureMode, DisplayGeometry, DisplayId, FrameBuffer, RectF, SizeF, SourceWindow,
    StreamConfig, WindowId,
};

/// ソース列挙ポート: 現在キャプチャ可能なウィンドウの問い合わせ
///
/// サイズやシステムアプリによるフィルタリングは列挙側の責務。
/// コントローラはIDの解決にのみ使用する。
pub trait SourceEnumerationPort: Send + Sync {
    /// キャプチャ可能なウィンドウの一覧を返す
    fn capturable_windows(&self) -> CaptureResult<Vec<SourceWindow>>;
}

/// ディスプレイトポロジポート: ディスプレイ形状の問い合わせ
pub trait DisplayTopologyPort: Send + Sync {
    /// 指定ディスプレイの形状を返す（存在しなければNone）
    fn geometry(&self, display: DisplayId) -> Option<DisplayGeometry>;
}

/// ディスプレイ構成変更の通知（ペイロードなし）
///
/// 実際に形状が変わったかどうかはコントローラ側で判定するため、
/// 通知自体は「変わったかもしれない」ことだけを伝える。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayNotification;

/// フレーム配信シンク: バックエンドの配信スレッドから呼ばれる
///
/// 実装は配信スレッドをブロックしてはならない。渡されるのは軽量ハンドルのみ。
pub trait FrameSink: Send + Sync {
    /// デコード済みフレームが1枚到着した
    fn on_frame(&self, frame: FrameBuffer);
}

/// ストリーム状態の監視者
///
/// バックエンドが非同期にストリーム停止（致命的エラー）を通知するための
/// コールバック。
pub trait StreamObserver: Send + Sync {
    /// アクティブなストリームが予期せず停止した
    fn stream_stopped(&self, reason: String);
}

/// 何もしない監視者（直接呼び出しのテスト用）
pub struct NullStreamObserver;

impl StreamObserver for NullStreamObserver {
    fn stream_stopped(&self, _reason: String) {}
}

/// 起動済みキャプチャストリームのハンドル
pub trait CaptureStream: Send {
    /// ストリームを再起動せずに構成を更新する（再構成の高速パス）
    ///
    /// 再起動はキャプチャを目に見えて中断させるため、形状変更時は
    /// 必ずこのin-place更新を使う。
    fn update_configuration(&mut self, config: &StreamConfig) -> CaptureResult<()>;

    /// ストリームの停止を要求する（非同期、呼び出し元をブロックしない）
    ///
    /// バックエンドの停止完了を待たない。停止後に配信されたフレームは
    /// シンク側で黙って破棄される。
    fn request_stop(&mut self);
}

/// キャプチャバックエンド: 単一ソースに絞ったストリームを開く
pub trait CaptureBackend: Send {
    /// 指定ウィンドウをキャプチャするストリームを構成・起動する
    ///
    /// # Arguments
    /// - `window`: キャプチャ対象ウィンドウ
    /// - `config`: 目標解像度・フォーマット・フレームレート上限
    /// - `sink`: フレーム配信先（配信スレッドから呼ばれる）
    /// - `observer`: 非同期ストリーム停止の通知先
    fn open_stream(
        &mut self,
        window: WindowId,
        config: &StreamConfig,
        sink: Arc<dyn FrameSink>,
        observer: Arc<dyn StreamObserver>,
    ) -> CaptureResult<Box<dyn CaptureStream>>;
}

/// プレゼンテーションシンク: 直近フレームの表示面
///
/// 直近の1フレームのみを保持し、present()のたびに置き換える。
/// bounds/scaleの更新はフレーム到着とは独立に行える。
pub trait PresentationSink: Send + Sync {
    /// 表示中のフレームを置き換える（旧フレームの参照は解放される）
    fn present(&self, frame: FrameBuffer);

    /// 論理サイズを変更する（次のフレームから新サイズに引き伸ばされる）
    fn set_bounds(&self, size: SizeF);

    /// バッキングスケールを変更する
    fn set_scale_factor(&self, scale: f64);
}

/// オーバーレイ出力サーフェス
///
/// 対象ディスプレイの可視領域に正確に重なるボーダーレス領域。
/// セッション開始時に作成され、停止時に破棄される。
pub trait OutputSurface: Send {
    /// サーフェスの位置・サイズを可視フレームに合わせる
    fn set_frame(&mut self, frame: RectF) -> CaptureResult<()>;

    /// バッキングスケールを変更する
    fn set_scale_factor(&mut self, scale: f64);

    /// このサーフェスが内包するプレゼンテーションシンクを取得
    fn presentation_sink(&self) -> Arc<dyn PresentationSink>;

    /// サーフェスを閉じて破棄する（冪等）
    fn close(&mut self);
}

/// サーフェスホスト: オーバーレイサーフェスの生成
pub trait SurfaceHost: Send {
    /// 指定の可視フレームを覆うサーフェスを作成する
    fn create_surface(
        &mut self,
        frame: RectF,
        scale_factor: f64,
    ) -> CaptureResult<Box<dyn OutputSurface>>;
}

/// アプリケーションレベルのイベント
///
/// モード変更とキャプチャ失敗の結果は、UI層への同期的な戻り値ではなく
/// イベントとして通知される（start/stopの直接呼び出し契約は別）。
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// キャプチャモードが変更された
    ModeChanged(CaptureMode),
    /// キャプチャ開始に失敗し、FullDesktopへフォールバックした
    CaptureFailed {
        requested: CaptureMode,
        error: String,
    },
    /// アクティブなストリームがバックエンド側の理由で終了した
    StreamEnded { reason: String },
}

/// イベント送出ポート
pub trait EventSink: Send + Sync {
    /// イベントを1件送出する
    fn emit(&self, event: AppEvent);
}
