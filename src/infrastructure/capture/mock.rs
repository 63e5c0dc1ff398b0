//! モックキャプチャバックエンド
//!
//! テスト・開発用のキャプチャ実装。実際の画面ではなく合成フレームを生成する。
//! プローブ（MockBackendProbe）経由で、開いたストリームの構成・停止要求・
//! 再構成回数をテストから観測できる。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::error::{CaptureError, CaptureResult};
use crate::domain::ports::{CaptureBackend, CaptureStream, FrameSink, StreamObserver};
use crate::domain::types::{FrameBuffer, PixelFormat, StreamConfig, WindowId};

/// 開いたストリーム1本分の観測可能な状態
#[derive(Debug)]
pub struct MockStreamState {
    window: WindowId,
    config: Mutex<StreamConfig>,
    update_count: AtomicU32,
    stop_requested: AtomicBool,
    fail_update: Mutex<Option<CaptureError>>,
}

#[allow(dead_code)]
impl MockStreamState {
    fn new(window: WindowId, config: StreamConfig) -> Self {
        Self {
            window,
            config: Mutex::new(config),
            update_count: AtomicU32::new(0),
            stop_requested: AtomicBool::new(false),
            fail_update: Mutex::new(None),
        }
    }

    /// キャプチャ対象のウィンドウ
    #[allow(dead_code)]
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// 現在のストリーム構成
    pub fn config(&self) -> StreamConfig {
        self.config.lock().unwrap().clone()
    }

    /// in-place再構成が行われた回数
    pub fn update_count(&self) -> u32 {
        self.update_count.load(Ordering::SeqCst)
    }

    /// 停止が要求されたか
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// 次のupdate_configurationを失敗させる（テスト用）
    pub fn fail_next_update(&self, error: CaptureError) {
        *self.fail_update.lock().unwrap() = Some(error);
    }
}

/// バックエンド全体の観測プローブ
///
/// ストリームはコントローラにmoveされるため、テストはこのプローブ経由で
/// 状態を観測する。シンクと監視者への参照も保持し、フレーム注入や
/// ストリームエラーのシミュレートに使う。
#[derive(Default)]
pub struct MockBackendProbe {
    opened: AtomicU64,
    streams: Mutex<Vec<Arc<MockStreamState>>>,
    sinks: Mutex<Vec<Arc<dyn FrameSink>>>,
    observers: Mutex<Vec<Arc<dyn StreamObserver>>>,
    fail_open: Mutex<Option<CaptureError>>,
}

#[allow(dead_code)]
impl MockBackendProbe {
    /// これまでに開いたストリームの本数
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// 開いた順のストリーム状態一覧
    pub fn streams(&self) -> Vec<Arc<MockStreamState>> {
        self.streams.lock().unwrap().clone()
    }

    /// 最後に開いたストリームのシンク（フレーム注入用）
    pub fn last_sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.sinks.lock().unwrap().last().cloned()
    }

    /// 最後に開いたストリームの監視者（エラー通知のシミュレート用）
    pub fn last_observer(&self) -> Option<Arc<dyn StreamObserver>> {
        self.observers.lock().unwrap().last().cloned()
    }

    /// 次のopen_streamを失敗させる（テスト用）
    pub fn fail_next_open(&self, error: CaptureError) {
        *self.fail_open.lock().unwrap() = Some(error);
    }
}

/// モックキャプチャアダプタ
pub struct MockCaptureAdapter {
    probe: Arc<MockBackendProbe>,
    /// Some(interval)の場合、ストリームごとに合成フレーム生成スレッドを起動
    synthesize_interval: Option<Duration>,
}

impl MockCaptureAdapter {
    /// フレーム生成なしのアダプタを作成（テスト用）
    pub fn new() -> Self {
        Self::with_probe(Arc::new(MockBackendProbe::default()))
    }

    /// 既存のプローブを共有するアダプタを作成
    pub fn with_probe(probe: Arc<MockBackendProbe>) -> Self {
        Self {
            probe,
            synthesize_interval: None,
        }
    }

    /// 合成フレームを指定間隔で生成するアダプタを作成
    ///
    /// 非Windows環境や実ソースなしでの動作確認に使う。
    pub fn synthesizing(interval: Duration) -> Self {
        Self {
            probe: Arc::new(MockBackendProbe::default()),
            synthesize_interval: Some(interval),
        }
    }

    /// プローブへの参照を取得
    #[allow(dead_code)]
    pub fn probe(&self) -> Arc<MockBackendProbe> {
        self.probe.clone()
    }
}

impl Default for MockCaptureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockCaptureAdapter {
    fn open_stream(
        &mut self,
        window: WindowId,
        config: &StreamConfig,
        sink: Arc<dyn FrameSink>,
        observer: Arc<dyn StreamObserver>,
    ) -> CaptureResult<Box<dyn CaptureStream>> {
        if let Some(error) = self.probe.fail_open.lock().unwrap().take() {
            return Err(error);
        }

        let state = Arc::new(MockStreamState::new(window, config.clone()));

        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        self.probe.streams.lock().unwrap().push(state.clone());
        self.probe.sinks.lock().unwrap().push(sink.clone());
        self.probe.observers.lock().unwrap().push(observer);

        if let Some(interval) = self.synthesize_interval {
            spawn_synthesizer(state.clone(), sink, interval);
        }

        tracing::debug!(
            window = window.0,
            width = config.width,
            height = config.height,
            "MockCapture: stream opened"
        );

        Ok(Box::new(MockStream { state }))
    }
}

/// モックストリーム
struct MockStream {
    state: Arc<MockStreamState>,
}

impl CaptureStream for MockStream {
    fn update_configuration(&mut self, config: &StreamConfig) -> CaptureResult<()> {
        if let Some(error) = self.state.fail_update.lock().unwrap().take() {
            return Err(error);
        }

        *self.state.config.lock().unwrap() = config.clone();
        self.state.update_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_stop(&mut self) {
        self.state.stop_requested.store(true, Ordering::SeqCst);
        tracing::debug!(window = self.state.window.0, "MockCapture: stop requested");
    }
}

/// 合成フレームの生成スレッドを起動
///
/// 停止要求後は速やかに終了する（fire-and-forget停止の挙動を再現）。
fn spawn_synthesizer(state: Arc<MockStreamState>, sink: Arc<dyn FrameSink>, interval: Duration) {
    std::thread::Builder::new()
        .name("mock-frame-synth".to_string())
        .spawn(move || {
            let mut sequence: u64 = 0;
            while !state.stop_requested() {
                let config = state.config();
                sink.on_frame(synthetic_frame(sequence, &config));
                sequence += 1;
                std::thread::sleep(interval);
            }
        })
        .expect("Failed to spawn mock frame synthesizer");
}

/// 構成どおりのサイズの合成フレーム（縦グラデーション）を作る
fn synthetic_frame(sequence: u64, config: &StreamConfig) -> FrameBuffer {
    let width = config.width.max(1);
    let height = config.height.max(1);
    let bpp = config.pixel_format.bytes_per_pixel();

    let mut pixels = vec![0u8; width as usize * height as usize * bpp];
    let row_len = width as usize * bpp;
    for (y, row) in pixels.chunks_exact_mut(row_len).enumerate() {
        let shade = ((y as u64 + sequence) % 256) as u8;
        for px in row.chunks_exact_mut(bpp) {
            px[0] = shade; // B
            px[1] = shade; // G
            px[2] = shade; // R
            px[3] = 0xFF; // A
        }
    }

    FrameBuffer {
        sequence,
        width,
        height,
        format: PixelFormat::Bgra8,
        pixels: Arc::new(pixels),
    }
}
