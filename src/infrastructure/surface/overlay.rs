//! DirectCompositionオーバーレイサーフェス
//!
//! 対象ディスプレイの可視領域を正確に覆うボーダーレスウィンドウを作成し、
//! D3D11 + DirectCompositionで直近フレームを描画する。
//!
//! フレームはフルスクリーンの矩形にテクスチャとして貼られ、リニアサンプラで
//! 拡大・縮小の両方向にバイリニア補間される。描画は不透明。
//!
//! ウィンドウとD3D/DCompリソースはすべて専用の描画スレッドが所有する。
//! 他スレッドとの接点はチャネル（フレーム到着通知・リサイズ・クローズ）のみ。

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::domain::config::SurfaceConfig;
use crate::domain::error::{CaptureError, CaptureResult};
use crate::domain::ports::{OutputSurface, PresentationSink, SurfaceHost};
use crate::domain::types::{FrameBuffer, RectF, SizeF};

use windows::core::{w, Interface, PCSTR};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Direct3D::Fxc::{
    D3DCompile, D3DCOMPILE_ENABLE_STRICTNESS, D3DCOMPILE_OPTIMIZATION_LEVEL3,
};
use windows::Win32::Graphics::Direct3D::{
    ID3DBlob, ID3DInclude, D3D_DRIVER_TYPE_HARDWARE, D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
};
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::DirectComposition::{
    DCompositionCreateDevice, IDCompositionDevice, IDCompositionTarget, IDCompositionVisual,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_ALPHA_MODE_IGNORE, DXGI_ALPHA_MODE_PREMULTIPLIED, DXGI_FORMAT_B8G8R8A8_UNORM,
    DXGI_FORMAT_R32G32_FLOAT, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGIDevice, IDXGIFactory2, IDXGISwapChain1, DXGI_SWAP_CHAIN_DESC1,
    DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, PeekMessageW,
    PostQuitMessage, RegisterClassW, SetWindowPos, ShowWindow, TranslateMessage, HWND_TOPMOST,
    MSG, PM_REMOVE, SWP_NOACTIVATE, SWP_NOZORDER, SW_SHOW, WM_DESTROY, WNDCLASSW, WS_EX_NOACTIVATE,
    WS_EX_TOPMOST, WS_POPUP,
};

const SHADER_SOURCE: &str = include_str!("shaders/blit.hlsl");

/// オーバーレイサーフェスホスト
pub struct OverlaySurfaceHost {
    config: SurfaceConfig,
}

impl OverlaySurfaceHost {
    pub fn new(config: SurfaceConfig) -> Self {
        Self { config }
    }
}

impl SurfaceHost for OverlaySurfaceHost {
    fn create_surface(
        &mut self,
        frame: RectF,
        scale_factor: f64,
    ) -> CaptureResult<Box<dyn OutputSurface>> {
        let (frame_tx, frame_rx) = bounded::<()>(1);
        let (cmd_tx, cmd_rx) = unbounded::<SurfaceCommand>();
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        let sink = Arc::new(OverlaySink {
            latest: Mutex::new(None),
            notify: frame_tx,
            bounds: Mutex::new(frame.size()),
            scale: Mutex::new(scale_factor),
        });

        let render_sink = sink.clone();
        let config = self.config.clone();
        let thread = std::thread::Builder::new()
            .name("overlay-render".to_string())
            .spawn(move || {
                render_thread(config, frame, scale_factor, render_sink, frame_rx, cmd_rx, ready_tx);
            })
            .map_err(|e| CaptureError::Surface(format!("Failed to spawn render thread: {}", e)))?;

        // 初期化完了（ウィンドウ・D3D・DComp）を待つ
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                let _ = thread.join();
                return Err(CaptureError::Surface(message));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CaptureError::Surface(
                    "Render thread terminated during startup".to_string(),
                ));
            }
        }

        Ok(Box::new(OverlaySurface {
            sink,
            cmd_tx,
            thread: Some(thread),
            scale_factor,
            closed: false,
        }))
    }
}

/// 描画スレッドへのコマンド
enum SurfaceCommand {
    Resize { frame: RectF, scale: f64 },
    Close,
}

/// オーバーレイのプレゼンテーションシンク
///
/// 配信スレッドから直近フレームを差し替え、描画スレッドを起こす。
/// 通知チャネルはbounded(1)のlatest-only（満杯なら単に無視）。
struct OverlaySink {
    latest: Mutex<Option<FrameBuffer>>,
    notify: Sender<()>,
    bounds: Mutex<SizeF>,
    scale: Mutex<f64>,
}

impl OverlaySink {
    fn take_latest(&self) -> Option<FrameBuffer> {
        self.latest.lock().unwrap().take()
    }
}

impl PresentationSink for OverlaySink {
    fn present(&self, frame: FrameBuffer) {
        *self.latest.lock().unwrap() = Some(frame);
        // 満杯 = 描画スレッドに既に通知済み
        let _ = self.notify.try_send(());
    }

    fn set_bounds(&self, size: SizeF) {
        *self.bounds.lock().unwrap() = size;
    }

    fn set_scale_factor(&self, scale: f64) {
        *self.scale.lock().unwrap() = scale;
    }
}

/// オーバーレイサーフェス（コントローラ側のハンドル）
struct OverlaySurface {
    sink: Arc<OverlaySink>,
    cmd_tx: Sender<SurfaceCommand>,
    thread: Option<JoinHandle<()>>,
    scale_factor: f64,
    closed: bool,
}

impl OutputSurface for OverlaySurface {
    fn set_frame(&mut self, frame: RectF) -> CaptureResult<()> {
        self.sink.set_bounds(frame.size());
        self.cmd_tx
            .send(SurfaceCommand::Resize {
                frame,
                scale: self.scale_factor,
            })
            .map_err(|_| CaptureError::Surface("Render thread is gone".to_string()))
    }

    fn set_scale_factor(&mut self, scale: f64) {
        self.scale_factor = scale;
        self.sink.set_scale_factor(scale);
    }

    fn presentation_sink(&self) -> Arc<dyn PresentationSink> {
        self.sink.clone()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let _ = self.cmd_tx.send(SurfaceCommand::Close);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OverlaySurface {
    fn drop(&mut self) {
        self.close();
    }
}

/// 描画スレッド本体
///
/// ウィンドウとGPUリソースを作成し、フレーム到着・リサイズ・クローズを処理する。
#[allow(clippy::too_many_arguments)]
fn render_thread(
    config: SurfaceConfig,
    frame: RectF,
    scale: f64,
    sink: Arc<OverlaySink>,
    frame_rx: Receiver<()>,
    cmd_rx: Receiver<SurfaceCommand>,
    ready_tx: Sender<Result<(), String>>,
) {
    let mut renderer = match Renderer::new(&config, frame, scale) {
        Ok(renderer) => {
            let _ = ready_tx.send(Ok(()));
            renderer
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };

    tracing::info!(
        x = frame.x,
        y = frame.y,
        width = frame.width,
        height = frame.height,
        "Overlay surface created"
    );

    loop {
        renderer.pump_messages();

        crossbeam_channel::select! {
            recv(frame_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
                if let Some(frame) = sink.take_latest() {
                    if let Err(e) = renderer.draw_frame(&frame) {
                        tracing::debug!(error = %e, "Frame draw failed");
                    }
                }
            }
            recv(cmd_rx) -> cmd => match cmd {
                Ok(SurfaceCommand::Resize { frame, scale }) => {
                    if let Err(e) = renderer.resize(frame, scale) {
                        tracing::warn!(error = %e, "Overlay resize failed");
                    }
                }
                Ok(SurfaceCommand::Close) | Err(_) => break,
            },
            default(Duration::from_millis(8)) => {}
        }
    }

    renderer.destroy();
    tracing::info!("Overlay surface closed");
}

/// 描画スレッド専有のウィンドウ・GPU状態
struct Renderer {
    hwnd: HWND,
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    swap_chain: IDXGISwapChain1,
    _dcomp_device: IDCompositionDevice,
    _dcomp_target: IDCompositionTarget,
    _dcomp_visual: IDCompositionVisual,
    vertex_shader: ID3D11VertexShader,
    pixel_shader: ID3D11PixelShader,
    input_layout: ID3D11InputLayout,
    vertex_buffer: ID3D11Buffer,
    sampler: ID3D11SamplerState,
    render_target: Option<ID3D11RenderTargetView>,
    frame_texture: Option<ID3D11Texture2D>,
    frame_srv: Option<ID3D11ShaderResourceView>,
    frame_size: (u32, u32),
    width_px: u32,
    height_px: u32,
}

impl Renderer {
    fn new(config: &SurfaceConfig, frame: RectF, scale: f64) -> CaptureResult<Self> {
        let (x, y, width_px, height_px) = physical_rect(frame, scale);

        unsafe {
            let hwnd = create_overlay_window(config, x, y, width_px, height_px)?;
            let (device, context) = create_d3d_device()?;
            let swap_chain = create_swap_chain(&device, width_px, height_px, config.opaque)?;

            // DirectComposition: スワップチェーンをウィンドウに合成する
            let dxgi_device: IDXGIDevice = device
                .cast()
                .map_err(|e| surface_error("IDXGIDevice cast", &e))?;
            let dcomp_device: IDCompositionDevice = DCompositionCreateDevice(&dxgi_device)
                .map_err(|e| surface_error("DCompositionCreateDevice", &e))?;
            let dcomp_target = dcomp_device
                .CreateTargetForHwnd(hwnd, true)
                .map_err(|e| surface_error("CreateTargetForHwnd", &e))?;
            let dcomp_visual = dcomp_device
                .CreateVisual()
                .map_err(|e| surface_error("CreateVisual", &e))?;
            dcomp_visual
                .SetContent(&swap_chain)
                .map_err(|e| surface_error("SetContent", &e))?;
            dcomp_target
                .SetRoot(&dcomp_visual)
                .map_err(|e| surface_error("SetRoot", &e))?;
            dcomp_device
                .Commit()
                .map_err(|e| surface_error("Commit", &e))?;

            // ブリット用のシェーダとクアッド
            let vs_blob = compile_shader("VS_Main", "vs_5_0")?;
            let ps_blob = compile_shader("PS_Main", "ps_5_0")?;
            let vertex_shader = create_vertex_shader(&device, &vs_blob)?;
            let pixel_shader = create_pixel_shader(&device, &ps_blob)?;
            let input_layout = create_input_layout(&device, &vs_blob)?;
            let vertex_buffer = create_quad_buffer(&device)?;
            let sampler = create_linear_sampler(&device)?;

            let mut renderer = Self {
                hwnd,
                device,
                context,
                swap_chain,
                _dcomp_device: dcomp_device,
                _dcomp_target: dcomp_target,
                _dcomp_visual: dcomp_visual,
                vertex_shader,
                pixel_shader,
                input_layout,
                vertex_buffer,
                sampler,
                render_target: None,
                frame_texture: None,
                frame_srv: None,
                frame_size: (0, 0),
                width_px,
                height_px,
            };
            renderer.create_render_target()?;

            Ok(renderer)
        }
    }

    fn pump_messages(&self) {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, self.hwnd, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn create_render_target(&mut self) -> CaptureResult<()> {
        unsafe {
            let back_buffer: ID3D11Texture2D = self
                .swap_chain
                .GetBuffer(0)
                .map_err(|e| surface_error("GetBuffer", &e))?;

            let mut rtv: Option<ID3D11RenderTargetView> = None;
            self.device
                .CreateRenderTargetView(&back_buffer, None, Some(&mut rtv))
                .map_err(|e| surface_error("CreateRenderTargetView", &e))?;

            self.render_target = rtv;
            Ok(())
        }
    }

    /// 直近フレームをアップロードし、ウィンドウ全面に引き伸ばして描画
    fn draw_frame(&mut self, frame: &FrameBuffer) -> CaptureResult<()> {
        unsafe {
            self.upload_frame(frame)?;

            let Some(rtv) = self.render_target.clone() else {
                return Ok(());
            };
            let Some(srv) = self.frame_srv.clone() else {
                return Ok(());
            };

            let viewport = D3D11_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: self.width_px as f32,
                Height: self.height_px as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            };

            let clear = [0.0f32, 0.0, 0.0, 1.0];
            self.context.ClearRenderTargetView(&rtv, &clear);
            self.context
                .OMSetRenderTargets(Some(&[Some(rtv.clone())]), None);
            self.context.RSSetViewports(Some(&[viewport]));

            self.context.IASetInputLayout(&self.input_layout);
            self.context
                .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            let stride = (std::mem::size_of::<f32>() * 4) as u32;
            let offset = 0u32;
            self.context.IASetVertexBuffers(
                0,
                1,
                Some(&Some(self.vertex_buffer.clone())),
                Some(&stride),
                Some(&offset),
            );

            self.context.VSSetShader(&self.vertex_shader, None);
            self.context.PSSetShader(&self.pixel_shader, None);
            self.context
                .PSSetShaderResources(0, Some(&[Some(srv)]));
            self.context
                .PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));

            self.context.Draw(6, 0);

            self.swap_chain
                .Present(1, 0)
                .ok()
                .map_err(|e| surface_error("Present", &e))?;

            Ok(())
        }
    }

    /// フレームをGPUテクスチャへ転送（サイズが変わったら作り直す）
    unsafe fn upload_frame(&mut self, frame: &FrameBuffer) -> CaptureResult<()> {
        if self.frame_size != (frame.width, frame.height) || self.frame_texture.is_none() {
            let desc = D3D11_TEXTURE2D_DESC {
                Width: frame.width,
                Height: frame.height,
                MipLevels: 1,
                ArraySize: 1,
                Format: DXGI_FORMAT_B8G8R8A8_UNORM,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Usage: D3D11_USAGE_DEFAULT,
                BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
                CPUAccessFlags: 0,
                MiscFlags: 0,
            };

            let mut texture: Option<ID3D11Texture2D> = None;
            self.device
                .CreateTexture2D(&desc, None, Some(&mut texture))
                .map_err(|e| surface_error("CreateTexture2D", &e))?;
            let texture = texture.ok_or_else(|| {
                CaptureError::Surface("Frame texture creation returned None".to_string())
            })?;

            let mut srv: Option<ID3D11ShaderResourceView> = None;
            self.device
                .CreateShaderResourceView(&texture, None, Some(&mut srv))
                .map_err(|e| surface_error("CreateShaderResourceView", &e))?;

            self.frame_texture = Some(texture);
            self.frame_srv = srv;
            self.frame_size = (frame.width, frame.height);
        }

        if let Some(ref texture) = self.frame_texture {
            let row_pitch = frame.width * frame.format.bytes_per_pixel() as u32;
            self.context.UpdateSubresource(
                texture,
                0,
                None,
                frame.pixels.as_ptr() as *const _,
                row_pitch,
                0,
            );
        }

        Ok(())
    }

    fn resize(&mut self, frame: RectF, scale: f64) -> CaptureResult<()> {
        let (x, y, width_px, height_px) = physical_rect(frame, scale);

        unsafe {
            SetWindowPos(
                self.hwnd,
                HWND_TOPMOST,
                x,
                y,
                width_px as i32,
                height_px as i32,
                SWP_NOACTIVATE | SWP_NOZORDER,
            )
            .map_err(|e| surface_error("SetWindowPos", &e))?;

            // ResizeBuffersの前にバックバッファへの参照を手放す
            self.render_target = None;
            self.context.OMSetRenderTargets(None, None);

            self.swap_chain
                .ResizeBuffers(2, width_px, height_px, DXGI_FORMAT_B8G8R8A8_UNORM, 0)
                .map_err(|e| surface_error("ResizeBuffers", &e))?;
        }

        self.width_px = width_px;
        self.height_px = height_px;
        self.create_render_target()?;

        tracing::debug!(width_px, height_px, "Overlay surface resized");
        Ok(())
    }

    fn destroy(&mut self) {
        self.render_target = None;
        self.frame_srv = None;
        self.frame_texture = None;

        unsafe {
            let _ = DestroyWindow(self.hwnd);
        }
    }
}

/// 論理フレーム（ポイント）を物理ピクセルの位置・サイズへ変換
fn physical_rect(frame: RectF, scale: f64) -> (i32, i32, u32, u32) {
    let x = (frame.x * scale).round() as i32;
    let y = (frame.y * scale).round() as i32;
    let width = (frame.width * scale).round().max(1.0) as u32;
    let height = (frame.height * scale).round().max(1.0) as u32;
    (x, y, width, height)
}

fn surface_error(what: &str, error: &windows::core::Error) -> CaptureError {
    CaptureError::Surface(format!("{} failed: {:?}", what, error))
}

unsafe fn create_overlay_window(
    config: &SurfaceConfig,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> CaptureResult<HWND> {
    let class_name = w!("DeskmirrorOverlay");

    let hmodule = GetModuleHandleW(None).map_err(|e| surface_error("GetModuleHandleW", &e))?;
    let hinstance: HINSTANCE = hmodule.into();

    let wc = WNDCLASSW {
        lpfnWndProc: Some(window_proc),
        hInstance: hinstance,
        lpszClassName: class_name,
        ..Default::default()
    };

    // 2回目以降の登録失敗（既存クラス）は無視してよい
    RegisterClassW(&wc);

    let mut ex_style = WS_EX_NOACTIVATE;
    if config.topmost {
        ex_style |= WS_EX_TOPMOST;
    }

    let hwnd = CreateWindowExW(
        ex_style,
        class_name,
        w!("deskmirror overlay"),
        WS_POPUP,
        x,
        y,
        width as i32,
        height as i32,
        None,
        None,
        hinstance,
        None,
    );

    if hwnd.0 == 0 {
        return Err(CaptureError::Surface(
            "CreateWindowExW returned null".to_string(),
        ));
    }

    let _ = ShowWindow(hwnd, SW_SHOW);

    Ok(hwnd)
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_DESTROY => {
            PostQuitMessage(0);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

unsafe fn create_d3d_device() -> CaptureResult<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    D3D11CreateDevice(
        None,
        D3D_DRIVER_TYPE_HARDWARE,
        None,
        D3D11_CREATE_DEVICE_BGRA_SUPPORT,
        None,
        D3D11_SDK_VERSION,
        Some(&mut device),
        None,
        Some(&mut context),
    )
    .map_err(|e| surface_error("D3D11CreateDevice", &e))?;

    match (device, context) {
        (Some(device), Some(context)) => Ok((device, context)),
        _ => Err(CaptureError::Surface(
            "D3D11CreateDevice returned null device or context".to_string(),
        )),
    }
}

unsafe fn create_swap_chain(
    device: &ID3D11Device,
    width: u32,
    height: u32,
    opaque: bool,
) -> CaptureResult<IDXGISwapChain1> {
    let dxgi_device: IDXGIDevice = device
        .cast()
        .map_err(|e| surface_error("IDXGIDevice cast", &e))?;
    let adapter = dxgi_device
        .GetAdapter()
        .map_err(|e| surface_error("GetAdapter", &e))?;
    let factory: IDXGIFactory2 = adapter
        .GetParent()
        .map_err(|e| surface_error("GetParent", &e))?;

    let desc = DXGI_SWAP_CHAIN_DESC1 {
        Width: width,
        Height: height,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: 2,
        SwapEffect: DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL,
        AlphaMode: if opaque {
            DXGI_ALPHA_MODE_IGNORE
        } else {
            DXGI_ALPHA_MODE_PREMULTIPLIED
        },
        ..Default::default()
    };

    factory
        .CreateSwapChainForComposition(device, &desc, None)
        .map_err(|e| surface_error("CreateSwapChainForComposition", &e))
}

unsafe fn compile_shader(entry_point: &str, target: &str) -> CaptureResult<ID3DBlob> {
    let entry = std::ffi::CString::new(entry_point)
        .map_err(|_| CaptureError::Surface("Shader entry point contains a null byte".to_string()))?;
    let target = std::ffi::CString::new(target)
        .map_err(|_| CaptureError::Surface("Shader target contains a null byte".to_string()))?;

    let mut shader_blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;

    let result = D3DCompile(
        SHADER_SOURCE.as_ptr() as *const _,
        SHADER_SOURCE.len(),
        PCSTR::null(),
        None,
        None::<&ID3DInclude>,
        PCSTR::from_raw(entry.as_ptr() as *const u8),
        PCSTR::from_raw(target.as_ptr() as *const u8),
        D3DCOMPILE_ENABLE_STRICTNESS | D3DCOMPILE_OPTIMIZATION_LEVEL3,
        0,
        &mut shader_blob,
        Some(&mut error_blob),
    );

    if let Err(err) = result {
        let details = error_blob
            .as_ref()
            .map(|blob| {
                let bytes = std::slice::from_raw_parts(
                    blob.GetBufferPointer() as *const u8,
                    blob.GetBufferSize(),
                );
                String::from_utf8_lossy(bytes).to_string()
            })
            .unwrap_or_else(|| format!("{:?}", err));
        return Err(CaptureError::Surface(format!(
            "Blit shader compilation failed: {}",
            details
        )));
    }

    shader_blob
        .ok_or_else(|| CaptureError::Surface("Shader compilation returned no bytecode".to_string()))
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
}

unsafe fn create_vertex_shader(
    device: &ID3D11Device,
    blob: &ID3DBlob,
) -> CaptureResult<ID3D11VertexShader> {
    let mut shader: Option<ID3D11VertexShader> = None;
    device
        .CreateVertexShader(blob_bytes(blob), None, Some(&mut shader))
        .map_err(|e| surface_error("CreateVertexShader", &e))?;
    shader.ok_or_else(|| CaptureError::Surface("Vertex shader creation returned None".to_string()))
}

unsafe fn create_pixel_shader(
    device: &ID3D11Device,
    blob: &ID3DBlob,
) -> CaptureResult<ID3D11PixelShader> {
    let mut shader: Option<ID3D11PixelShader> = None;
    device
        .CreatePixelShader(blob_bytes(blob), None, Some(&mut shader))
        .map_err(|e| surface_error("CreatePixelShader", &e))?;
    shader.ok_or_else(|| CaptureError::Surface("Pixel shader creation returned None".to_string()))
}

unsafe fn create_input_layout(
    device: &ID3D11Device,
    vs_blob: &ID3DBlob,
) -> CaptureResult<ID3D11InputLayout> {
    use windows::core::s;

    let elements = [
        D3D11_INPUT_ELEMENT_DESC {
            SemanticName: s!("POSITION"),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: 0,
            InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
        D3D11_INPUT_ELEMENT_DESC {
            SemanticName: s!("TEXCOORD"),
            SemanticIndex: 0,
            Format: DXGI_FORMAT_R32G32_FLOAT,
            InputSlot: 0,
            AlignedByteOffset: 8,
            InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        },
    ];

    let mut layout: Option<ID3D11InputLayout> = None;
    device
        .CreateInputLayout(&elements, blob_bytes(vs_blob), Some(&mut layout))
        .map_err(|e| surface_error("CreateInputLayout", &e))?;
    layout.ok_or_else(|| CaptureError::Surface("Input layout creation returned None".to_string()))
}

unsafe fn create_quad_buffer(device: &ID3D11Device) -> CaptureResult<ID3D11Buffer> {
    // (x, y, u, v) のフルスクリーン矩形（2三角形）
    let vertices: [f32; 24] = [
        -1.0, 1.0, 0.0, 0.0, //
        1.0, 1.0, 1.0, 0.0, //
        -1.0, -1.0, 0.0, 1.0, //
        1.0, 1.0, 1.0, 0.0, //
        1.0, -1.0, 1.0, 1.0, //
        -1.0, -1.0, 0.0, 1.0, //
    ];

    let data = D3D11_SUBRESOURCE_DATA {
        pSysMem: vertices.as_ptr() as *const _,
        SysMemPitch: 0,
        SysMemSlicePitch: 0,
    };

    let desc = D3D11_BUFFER_DESC {
        ByteWidth: std::mem::size_of_val(&vertices) as u32,
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_VERTEX_BUFFER.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
        StructureByteStride: 0,
    };

    let mut buffer: Option<ID3D11Buffer> = None;
    device
        .CreateBuffer(&desc, Some(&data), Some(&mut buffer))
        .map_err(|e| surface_error("CreateBuffer", &e))?;
    buffer.ok_or_else(|| CaptureError::Surface("Vertex buffer creation returned None".to_string()))
}

unsafe fn create_linear_sampler(device: &ID3D11Device) -> CaptureResult<ID3D11SamplerState> {
    // 縮小・拡大の両方向でバイリニア補間
    let desc = D3D11_SAMPLER_DESC {
        Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
        AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
        AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
        AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
        MipLODBias: 0.0,
        MaxAnisotropy: 1,
        ComparisonFunc: D3D11_COMPARISON_NEVER,
        BorderColor: [0.0, 0.0, 0.0, 0.0],
        MinLOD: 0.0,
        MaxLOD: f32::MAX,
    };

    let mut sampler: Option<ID3D11SamplerState> = None;
    device
        .CreateSamplerState(&desc, Some(&mut sampler))
        .map_err(|e| surface_error("CreateSamplerState", &e))?;
    sampler.ok_or_else(|| CaptureError::Surface("Sampler creation returned None".to_string()))
}
