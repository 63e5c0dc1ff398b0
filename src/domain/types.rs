/// コア型定義
///
/// Domain層の中心となるデータ構造。
/// キャプチャ対象の識別、ディスプレイ形状、ストリーム構成、フレームハンドルなど、
/// すべての層で共有される型を定義する。

use std::sync::Arc;

/// キャプチャ対象ウィンドウの安定識別子（プラットフォーム固有のハンドル値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// ディスプレイの安定識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayId(pub u64);

/// キャプチャモード
///
/// `FullDesktop`は仮想ディスプレイ自身のコンポジタ出力をそのまま表示するため、
/// キャプチャセッションもオーバーレイも不要。モード変更時は丸ごと置き換える。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// 仮想デスクトップ全体（セッションなし）
    FullDesktop,
    /// 単一ウィンドウのキャプチャ
    Window(WindowId),
}

impl CaptureMode {
    /// ウィンドウキャプチャモードの場合、対象ウィンドウIDを返す
    #[allow(dead_code)]
    pub fn window_id(&self) -> Option<WindowId> {
        match self {
            CaptureMode::FullDesktop => None,
            CaptureMode::Window(id) => Some(*id),
        }
    }
}

/// 論理座標系のサイズ（ポイント単位）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeF {
    pub width: f64,
    pub height: f64,
}

impl SizeF {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// 論理座標系の矩形（ポイント単位）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 矩形のサイズ部分を取得
    pub fn size(&self) -> SizeF {
        SizeF::new(self.width, self.height)
    }
}

/// 列挙ポートから返されるキャプチャ可能ウィンドウのメタデータ
///
/// フィルタリング（最小サイズ、システムアプリ除外など）は列挙側コラボレータの
/// 責務であり、コントローラは一切フィルタしない。
#[derive(Debug, Clone)]
pub struct SourceWindow {
    pub id: WindowId,
    pub title: String,
    pub application_name: String,
    pub owner_pid: u32,
    pub on_screen: bool,
    pub frame: SizeF,
}

impl PartialEq for SourceWindow {
    // 同一性はIDのみで判定（タイトルは変化しうる）
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// ディスプレイ形状
///
/// `visible_frame`はメニューバー等のシステム予約領域を除いた可視領域。
/// オーバーレイサーフェスはこの領域に正確に重ねて配置される。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    /// ディスプレイ全体のフレーム（論理座標）
    pub frame: RectF,
    /// システム予約領域を除いた可視フレーム（論理座標）
    pub visible_frame: RectF,
    /// バッキングスケール係数（物理px / 論理pt）
    pub scale_factor: f64,
}

/// ストリームのピクセルフォーマット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32bit BGRA（プリマルチプライなし、連続メモリ）
    Bgra8,
}

impl PixelFormat {
    /// 1ピクセルあたりのバイト数
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra8 => 4,
        }
    }
}

/// キャプチャストリームの構成
///
/// 解像度はTargetGeometry（可視フレーム×スケール×オーバーサンプリング）から
/// 導出され、ディスプレイ形状変更時はストリームを再起動せずに更新される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// 目標幅（物理ピクセル）
    pub width: u32,
    /// 目標高さ（物理ピクセル）
    pub height: u32,
    /// ピクセルフォーマット
    pub pixel_format: PixelFormat,
    /// フレームレート上限（fps）
    pub frame_rate_cap: u32,
    /// バックエンド内部のフレームキュー深さ
    pub queue_depth: u32,
    /// カーソルを含めてキャプチャするか
    pub show_cursor: bool,
}

impl StreamConfig {
    /// 構成の解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// ディスプレイ形状から目標キャプチャ解像度を導出
///
/// 拡大表示下でも文字のシャープさを保つため、可視フレームの物理ピクセル数に
/// オーバーサンプリング係数を掛けた解像度でキャプチャする。
///
/// # Arguments
/// - `geometry`: 対象ディスプレイの形状
/// - `oversampling`: オーバーサンプリング係数（通常は3）
pub fn target_geometry(geometry: &DisplayGeometry, oversampling: u32) -> (u32, u32) {
    let factor = geometry.scale_factor * oversampling as f64;
    let width = (geometry.visible_frame.width * factor).round() as u32;
    let height = (geometry.visible_frame.height * factor).round() as u32;
    (width, height)
}

/// デコード済みフレームへの軽量ハンドル
///
/// ピクセルペイロードはArcで共有され、配信境界ではハンドルのみが渡される。
/// プレゼンテーション側は直近の1フレームだけを保持し、置き換え時に旧フレームの
/// 参照を解放する（フレームキューなし）。
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// ストリーム内の通し番号
    pub sequence: u64,
    /// フレーム幅（物理ピクセル）
    pub width: u32,
    /// フレーム高さ（物理ピクセル）
    pub height: u32,
    /// ピクセルフォーマット
    pub format: PixelFormat,
    /// ピクセルデータ（行連続、パディングなし）
    pub pixels: Arc<Vec<u8>>,
}

impl FrameBuffer {
    /// 新しいフレームハンドルを作成
    pub fn new(sequence: u64, width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Self {
        Self {
            sequence,
            width,
            height,
            format,
            pixels: Arc::new(pixels),
        }
    }

    /// 期待されるバッファサイズ（バイト）
    #[allow(dead_code)]
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}
