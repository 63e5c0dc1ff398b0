//! ヘッドレスサーフェスホスト
//!
//! テスト・非Windows環境用の出力サーフェス実装。描画は行わず、
//! フレーム・サイズ・スケールの変化をプローブ経由で観測可能にする。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::error::{CaptureError, CaptureResult};
use crate::domain::ports::{OutputSurface, PresentationSink, SurfaceHost};
use crate::domain::types::{FrameBuffer, RectF, SizeF};

/// 直近フレームだけを保持するプレゼンテーションシンク
///
/// present()のたびに前のフレームハンドルを置き換える（参照が解放される）。
#[derive(Default)]
pub struct HeadlessSink {
    latest: Mutex<Option<FrameBuffer>>,
    presented: AtomicU64,
    bounds: Mutex<SizeF>,
    scale: Mutex<f64>,
}

#[allow(dead_code)]
impl HeadlessSink {
    /// 表示中のフレーム（直近の1枚）
    pub fn latest(&self) -> Option<FrameBuffer> {
        self.latest.lock().unwrap().clone()
    }

    /// presentされたフレームの累計
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    /// 現在の論理サイズ
    pub fn bounds(&self) -> SizeF {
        *self.bounds.lock().unwrap()
    }

    /// 現在のスケール係数
    #[allow(dead_code)]
    pub fn scale(&self) -> f64 {
        *self.scale.lock().unwrap()
    }
}

impl PresentationSink for HeadlessSink {
    fn present(&self, frame: FrameBuffer) {
        *self.latest.lock().unwrap() = Some(frame);
        self.presented.fetch_add(1, Ordering::SeqCst);
    }

    fn set_bounds(&self, size: SizeF) {
        *self.bounds.lock().unwrap() = size;
    }

    fn set_scale_factor(&self, scale: f64) {
        *self.scale.lock().unwrap() = scale;
    }
}

/// サーフェス1枚分の観測可能な状態
pub struct HeadlessSurfaceState {
    frame: Mutex<RectF>,
    scale: Mutex<f64>,
    resize_count: AtomicU32,
    closed: AtomicBool,
    sink: Arc<HeadlessSink>,
}

#[allow(dead_code)]
impl HeadlessSurfaceState {
    fn new(frame: RectF, scale: f64) -> Self {
        let sink = Arc::new(HeadlessSink::default());
        sink.set_bounds(frame.size());
        sink.set_scale_factor(scale);
        Self {
            frame: Mutex::new(frame),
            scale: Mutex::new(scale),
            resize_count: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            sink,
        }
    }

    /// 現在の配置フレーム
    pub fn frame(&self) -> RectF {
        *self.frame.lock().unwrap()
    }

    /// 現在のスケール係数
    pub fn scale(&self) -> f64 {
        *self.scale.lock().unwrap()
    }

    /// set_frameが呼ばれた回数
    pub fn resize_count(&self) -> u32 {
        self.resize_count.load(Ordering::SeqCst)
    }

    /// 閉じられたか
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 内包するシンク
    pub fn sink(&self) -> Arc<HeadlessSink> {
        self.sink.clone()
    }
}

/// ホスト全体の観測プローブ
#[derive(Default)]
pub struct SurfaceProbe {
    created: AtomicUsize,
    open: AtomicUsize,
    surfaces: Mutex<Vec<Arc<HeadlessSurfaceState>>>,
    fail_create: Mutex<Option<CaptureError>>,
}

#[allow(dead_code)]
impl SurfaceProbe {
    /// これまでに作成されたサーフェスの枚数
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 現在開いているサーフェスの枚数
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// 作成順のサーフェス状態一覧
    pub fn surfaces(&self) -> Vec<Arc<HeadlessSurfaceState>> {
        self.surfaces.lock().unwrap().clone()
    }

    /// 次のcreate_surfaceを失敗させる（テスト用）
    pub fn fail_next_create(&self, error: CaptureError) {
        *self.fail_create.lock().unwrap() = Some(error);
    }
}

/// ヘッドレスサーフェスホスト
pub struct HeadlessSurfaceHost {
    probe: Arc<SurfaceProbe>,
}

impl HeadlessSurfaceHost {
    /// 新しいホストを作成
    pub fn new() -> Self {
        Self::with_probe(Arc::new(SurfaceProbe::default()))
    }

    /// 既存のプローブを共有するホストを作成
    pub fn with_probe(probe: Arc<SurfaceProbe>) -> Self {
        Self { probe }
    }

    /// プローブへの参照を取得
    #[allow(dead_code)]
    pub fn probe(&self) -> Arc<SurfaceProbe> {
        self.probe.clone()
    }
}

impl Default for HeadlessSurfaceHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceHost for HeadlessSurfaceHost {
    fn create_surface(
        &mut self,
        frame: RectF,
        scale_factor: f64,
    ) -> CaptureResult<Box<dyn OutputSurface>> {
        if let Some(error) = self.probe.fail_create.lock().unwrap().take() {
            return Err(error);
        }

        let state = Arc::new(HeadlessSurfaceState::new(frame, scale_factor));
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        self.probe.open.fetch_add(1, Ordering::SeqCst);
        self.probe.surfaces.lock().unwrap().push(state.clone());

        Ok(Box::new(HeadlessSurface {
            state,
            probe: self.probe.clone(),
        }))
    }
}

/// ヘッドレスサーフェス
struct HeadlessSurface {
    state: Arc<HeadlessSurfaceState>,
    probe: Arc<SurfaceProbe>,
}

impl OutputSurface for HeadlessSurface {
    fn set_frame(&mut self, frame: RectF) -> CaptureResult<()> {
        *self.state.frame.lock().unwrap() = frame;
        self.state.resize_count.fetch_add(1, Ordering::SeqCst);
        self.state.sink.set_bounds(frame.size());
        Ok(())
    }

    fn set_scale_factor(&mut self, scale: f64) {
        *self.state.scale.lock().unwrap() = scale;
        self.state.sink.set_scale_factor(scale);
    }

    fn presentation_sink(&self) -> Arc<dyn PresentationSink> {
        self.state.sink.clone()
    }

    fn close(&mut self) {
        // 冪等: 2重closeでカウンタを壊さない
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            self.probe.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
