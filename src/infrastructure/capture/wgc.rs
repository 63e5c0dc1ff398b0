//! WGC (Windows Graphics Capture) キャプチャバックエンド
//!
//! Windows Graphics Capture APIを使用した単一ウィンドウのキャプチャ。
//! Windows 10 バージョン 1803 以降で動作。
//!
//! windows crate を直接使用してWGC APIを実装する。
//! フレームはFrameArrivedコールバックでステージングテクスチャ経由で
//! CPUメモリへ転送され、軽量ハンドルとしてシンクへ配信される。
//!
//! 構成変更はフレームプールのRecreateで行い、セッションは再起動しない。

use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::domain::error::{CaptureError, CaptureResult};
use crate::domain::ports::{CaptureBackend, CaptureStream, FrameSink, StreamObserver};
use crate::domain::types::{FrameBuffer, PixelFormat, StreamConfig, WindowId};

use windows::core::{factory, IInspectable, Interface, IUnknown, GUID};
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{
    Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession,
};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Graphics::SizeInt32;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::System::WinRT::Direct3D11::{
    CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess,
};
use windows::Win32::System::WinRT::{RoInitialize, RO_INIT_MULTITHREADED};

// E_ACCESSDENIED: キャプチャ権限が拒否された場合にWinRTが返すHRESULT
const E_ACCESSDENIED: i32 = 0x8007_0005u32 as i32;

// IGraphicsCaptureItemInterop COM interface
#[repr(C)]
#[derive(Clone, Debug)]
pub struct IGraphicsCaptureItemInterop(IUnknown);

unsafe impl Interface for IGraphicsCaptureItemInterop {
    type Vtable = IGraphicsCaptureItemInterop_Vtbl;
    const IID: GUID = GUID::from_u128(0x3628e81b_3cac_4c60_b7f4_23ce0e0c3356);
}

impl IGraphicsCaptureItemInterop {
    #[allow(non_snake_case)]
    pub unsafe fn CreateForWindow(
        &self,
        window: HWND,
    ) -> windows::core::Result<GraphicsCaptureItem> {
        let mut result: *mut std::ffi::c_void = std::ptr::null_mut();
        (self.vtable().CreateForWindow)(
            self.as_raw(),
            window.0 as *mut std::ffi::c_void,
            &GraphicsCaptureItem::IID,
            &mut result,
        )
        .ok()?;
        Ok(GraphicsCaptureItem::from_raw(result))
    }
}

#[repr(C)]
#[allow(non_snake_case)]
pub struct IGraphicsCaptureItemInterop_Vtbl {
    pub base__: windows::core::IUnknown_Vtbl,
    pub CreateForWindow: unsafe extern "system" fn(
        this: *mut std::ffi::c_void,
        window: *mut std::ffi::c_void,
        iid: *const GUID,
        result: *mut *mut std::ffi::c_void,
    ) -> windows::core::HRESULT,
    pub CreateForMonitor: unsafe extern "system" fn(
        this: *mut std::ffi::c_void,
        monitor: isize,
        iid: *const GUID,
        result: *mut *mut std::ffi::c_void,
    ) -> windows::core::HRESULT,
}

/// WGCキャプチャアダプタ
///
/// CaptureBackend traitを実装し、ウィンドウ単位のキャプチャストリームを提供する。
/// D3D11デバイスはストリームごとに作成する（コンテキストはスレッド安全でない
/// ため、配信コールバックのスレッドに閉じ込める）。
pub struct WgcCaptureAdapter {
    _private: (),
}

impl WgcCaptureAdapter {
    /// 新しいWGCキャプチャアダプタを作成
    pub fn new() -> CaptureResult<Self> {
        // WinRTの初期化（2重初期化はS_FALSEで無害）
        unsafe {
            let _ = RoInitialize(RO_INIT_MULTITHREADED);
        }
        Ok(Self { _private: () })
    }

    /// HWNDからGraphicsCaptureItemを作成
    fn create_capture_item_for_window(window: WindowId) -> CaptureResult<GraphicsCaptureItem> {
        unsafe {
            let interop: IGraphicsCaptureItemInterop =
                factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>().map_err(|e| {
                    CaptureError::StreamStartFailure(format!(
                        "Failed to get IGraphicsCaptureItemInterop factory: {:?}",
                        e
                    ))
                })?;

            interop
                .CreateForWindow(HWND(window.0 as isize))
                .map_err(|e| {
                    if e.code().0 == E_ACCESSDENIED {
                        CaptureError::PermissionDenied
                    } else {
                        // 既に閉じられたウィンドウのHWNDなど
                        CaptureError::SourceNotFound
                    }
                })
        }
    }

    /// D3D11デバイスを作成
    fn create_d3d11_device() -> CaptureResult<(ID3D11Device, ID3D11DeviceContext)> {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;

        unsafe {
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
            .map_err(|e| {
                CaptureError::StreamStartFailure(format!("Failed to create D3D11 device: {:?}", e))
            })?;
        }

        match (device, context) {
            (Some(device), Some(context)) => Ok((device, context)),
            _ => Err(CaptureError::StreamStartFailure(
                "D3D11CreateDevice returned null device or context".to_string(),
            )),
        }
    }

    /// D3D11DeviceからIDirect3DDeviceを作成（WGC用）
    fn create_direct3d_device(d3d_device: &ID3D11Device) -> CaptureResult<IDirect3DDevice> {
        unsafe {
            let dxgi_device: windows::Win32::Graphics::Dxgi::IDXGIDevice =
                d3d_device.cast().map_err(|e| {
                    CaptureError::StreamStartFailure(format!(
                        "Failed to cast to IDXGIDevice: {:?}",
                        e
                    ))
                })?;

            let inspectable = CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device).map_err(|e| {
                CaptureError::StreamStartFailure(format!(
                    "Failed to create IDirect3DDevice: {:?}",
                    e
                ))
            })?;

            inspectable.cast().map_err(|e| {
                CaptureError::StreamStartFailure(format!(
                    "Failed to cast to IDirect3DDevice: {:?}",
                    e
                ))
            })
        }
    }
}

impl CaptureBackend for WgcCaptureAdapter {
    fn open_stream(
        &mut self,
        window: WindowId,
        config: &StreamConfig,
        sink: Arc<dyn FrameSink>,
        observer: Arc<dyn StreamObserver>,
    ) -> CaptureResult<Box<dyn CaptureStream>> {
        let capture_item = Self::create_capture_item_for_window(window)?;
        let (device, context) = Self::create_d3d11_device()?;
        let d3d_device = Self::create_direct3d_device(&device)?;

        let pool_size = SizeInt32 {
            Width: config.width as i32,
            Height: config.height as i32,
        };

        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            &d3d_device,
            DirectXPixelFormat::B8G8R8A8UIntNormalized,
            config.queue_depth as i32,
            pool_size,
        )
        .map_err(|e| {
            CaptureError::StreamStartFailure(format!("Failed to create frame pool: {:?}", e))
        })?;

        let stopped = Arc::new(AtomicBool::new(false));

        // FrameArrivedハンドラ: ステージング経由でCPUへ転送し、シンクへ配信する。
        // フレームレート上限もここで適用する（WGC自体に間隔設定はない）
        let handler_state = Arc::new(FrameHandlerState {
            device: device.clone(),
            context,
            staging: Mutex::new(StagingTexture::new()),
            sink,
            stopped: stopped.clone(),
            sequence: AtomicU64::new(0),
            last_emit: Mutex::new(None),
            min_interval: Duration::from_secs(1) / config.frame_rate_cap.max(1),
        });

        let state_for_callback = handler_state.clone();
        frame_pool
            .FrameArrived(&TypedEventHandler::new(
                move |pool: &Option<Direct3D11CaptureFramePool>, _args| {
                    if let Some(pool) = pool {
                        state_for_callback.handle_frame(pool);
                    }
                    Ok(())
                },
            ))
            .map_err(|e| {
                CaptureError::StreamStartFailure(format!(
                    "Failed to set FrameArrived handler: {:?}",
                    e
                ))
            })?;

        // ウィンドウが閉じられた場合は致命的エラーとして監視者へ通知する
        let observer_for_close = observer;
        let stopped_for_close = stopped.clone();
        capture_item
            .Closed(&TypedEventHandler::<GraphicsCaptureItem, IInspectable>::new(
                move |_item, _args| {
                    if !stopped_for_close.swap(true, Ordering::SeqCst) {
                        observer_for_close.stream_stopped("capture source closed".to_string());
                    }
                    Ok(())
                },
            ))
            .map_err(|e| {
                CaptureError::StreamStartFailure(format!("Failed to set Closed handler: {:?}", e))
            })?;

        let capture_session = frame_pool.CreateCaptureSession(&capture_item).map_err(|e| {
            CaptureError::StreamStartFailure(format!("Failed to create capture session: {:?}", e))
        })?;

        if !config.show_cursor {
            capture_session
                .SetIsCursorCaptureEnabled(false)
                .map_err(|e| {
                    CaptureError::StreamStartFailure(format!(
                        "Failed to disable cursor capture: {:?}",
                        e
                    ))
                })?;
        }

        capture_session.StartCapture().map_err(|e| {
            if e.code().0 == E_ACCESSDENIED {
                CaptureError::PermissionDenied
            } else {
                CaptureError::StreamStartFailure(format!("Failed to start capture: {:?}", e))
            }
        })?;

        tracing::info!(
            window = window.0,
            width = config.width,
            height = config.height,
            queue_depth = config.queue_depth,
            "WGC stream started"
        );

        Ok(Box::new(WgcStream {
            _capture_item: capture_item,
            frame_pool,
            capture_session,
            d3d_device,
            queue_depth: config.queue_depth,
            stopped,
        }))
    }
}

/// FrameArrivedコールバックの共有状態
struct FrameHandlerState {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    staging: Mutex<StagingTexture>,
    sink: Arc<dyn FrameSink>,
    stopped: Arc<AtomicBool>,
    sequence: AtomicU64,
    last_emit: Mutex<Option<Instant>>,
    min_interval: Duration,
}

// コールバックはWinRTのワーカースレッドで実行される。
// contextはこの状態経由でのみ使用され、プールごとに専有される
unsafe impl Send for FrameHandlerState {}
unsafe impl Sync for FrameHandlerState {}

impl FrameHandlerState {
    fn handle_frame(&self, pool: &Direct3D11CaptureFramePool) {
        // 停止要求後に届いたフレームは黙って捨てる
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let Ok(frame) = pool.TryGetNextFrame() else {
            return;
        };

        // フレームレート上限の適用
        {
            let mut last = self.last_emit.lock().unwrap();
            if let Some(prev) = *last {
                if prev.elapsed() < self.min_interval {
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        let Ok(surface) = frame.Surface() else {
            return;
        };

        let texture: ID3D11Texture2D = unsafe {
            let Ok(access) = surface.cast::<IDirect3DDxgiInterfaceAccess>() else {
                return;
            };
            let Ok(texture) = access.GetInterface() else {
                return;
            };
            texture
        };

        match self.copy_to_cpu(&texture) {
            Ok((pixels, width, height)) => {
                let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
                self.sink.on_frame(FrameBuffer {
                    sequence,
                    width,
                    height,
                    format: PixelFormat::Bgra8,
                    pixels: Arc::new(pixels),
                });
            }
            Err(e) => {
                tracing::debug!(error = %e, "Frame transfer failed, skipping frame");
            }
        }
    }

    /// テクスチャをステージング経由でCPUメモリへ転送
    fn copy_to_cpu(&self, texture: &ID3D11Texture2D) -> CaptureResult<(Vec<u8>, u32, u32)> {
        unsafe {
            let mut desc = D3D11_TEXTURE2D_DESC::default();
            texture.GetDesc(&mut desc);

            let mut staging = self.staging.lock().unwrap();
            let staging_tex =
                staging.ensure(&self.device, desc.Width, desc.Height, desc.Format)?;

            self.context.CopyResource(&staging_tex, texture);

            let mut mapped: D3D11_MAPPED_SUBRESOURCE = mem::zeroed();
            self.context
                .Map(&staging_tex, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .map_err(|e| {
                    CaptureError::StreamFatal(format!("Failed to map staging texture: {:?}", e))
                })?;

            // RowPitchを考慮して行単位でコピー（パディング除去）
            let row_pitch = mapped.RowPitch as usize;
            let row_size = desc.Width as usize * 4;
            let mut data = vec![0u8; row_size * desc.Height as usize];

            for y in 0..desc.Height as usize {
                ptr::copy_nonoverlapping(
                    (mapped.pData as *const u8).add(y * row_pitch),
                    data.as_mut_ptr().add(y * row_size),
                    row_size,
                );
            }

            self.context.Unmap(&staging_tex, 0);

            Ok((data, desc.Width, desc.Height))
        }
    }
}

/// ステージングテクスチャのキャッシュ
///
/// サイズ・フォーマットが変わらない間は再利用し、GPUリソースの
/// 再割り当てを避ける。
struct StagingTexture {
    texture: Option<ID3D11Texture2D>,
    size: (u32, u32),
    format: DXGI_FORMAT,
}

impl StagingTexture {
    fn new() -> Self {
        Self {
            texture: None,
            size: (0, 0),
            format: DXGI_FORMAT_B8G8R8A8_UNORM,
        }
    }

    fn ensure(
        &mut self,
        device: &ID3D11Device,
        width: u32,
        height: u32,
        format: DXGI_FORMAT,
    ) -> CaptureResult<ID3D11Texture2D> {
        if let Some(ref tex) = self.texture {
            if self.size == (width, height) && self.format == format {
                return Ok(tex.clone());
            }
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: D3D11_BIND_FLAG(0).0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: D3D11_RESOURCE_MISC_FLAG(0).0 as u32,
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe {
            device
                .CreateTexture2D(&desc, None, Some(&mut texture))
                .map_err(|e| {
                    CaptureError::StreamFatal(format!("Failed to create staging texture: {:?}", e))
                })?;
        }

        let texture = texture.ok_or_else(|| {
            CaptureError::StreamFatal("Staging texture creation returned None".to_string())
        })?;

        self.texture = Some(texture.clone());
        self.size = (width, height);
        self.format = format;

        Ok(texture)
    }
}

/// WGCストリームハンドル
struct WgcStream {
    _capture_item: GraphicsCaptureItem,
    frame_pool: Direct3D11CaptureFramePool,
    capture_session: GraphicsCaptureSession,
    d3d_device: IDirect3DDevice,
    queue_depth: u32,
    stopped: Arc<AtomicBool>,
}

// WGCオブジェクトはスレッド安全に使用できる（WinRTのCOM呼び出しは
// 内部的にスレッドセーフに設計されている）
unsafe impl Send for WgcStream {}

impl CaptureStream for WgcStream {
    fn update_configuration(&mut self, config: &StreamConfig) -> CaptureResult<()> {
        // フレームプールのバッファを新解像度で作り直す。
        // セッションは生きたまま、次フレームから新サイズで配信される
        let size = SizeInt32 {
            Width: config.width as i32,
            Height: config.height as i32,
        };

        self.frame_pool
            .Recreate(
                &self.d3d_device,
                DirectXPixelFormat::B8G8R8A8UIntNormalized,
                self.queue_depth as i32,
                size,
            )
            .map_err(|e| {
                CaptureError::StreamStartFailure(format!("Frame pool recreate failed: {:?}", e))
            })?;

        tracing::debug!(
            width = config.width,
            height = config.height,
            "WGC frame pool reconfigured in place"
        );
        Ok(())
    }

    fn request_stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);

        // Closeは非同期に完了する。失敗しても停止フラグで配信は止まっている
        if let Err(e) = self.capture_session.Close() {
            tracing::debug!(error = ?e, "Capture session close failed");
        }
        if let Err(e) = self.frame_pool.Close() {
            tracing::debug!(error = ?e, "Frame pool close failed");
        }

        tracing::info!("WGC stream stop requested");
    }
}
