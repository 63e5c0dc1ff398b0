//! ディスプレイトポロジアダプタ
//!
//! ディスプレイ形状（全体フレーム・可視フレーム・スケール係数）の問い合わせと、
//! 構成変更通知の発生源を提供する。

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::ports::DisplayTopologyPort;
use crate::domain::types::{DisplayGeometry, DisplayId};

/// 静的なディスプレイトポロジアダプタ（テスト・モック構成用）
///
/// 形状はテストから差し替え可能。差し替え後に通知を送れば
/// 再構成パスを外部から駆動できる。
pub struct StaticDisplayAdapter {
    geometries: Mutex<HashMap<DisplayId, DisplayGeometry>>,
}

#[allow(dead_code)]
impl StaticDisplayAdapter {
    /// 空のアダプタを作成
    pub fn new() -> Self {
        Self {
            geometries: Mutex::new(HashMap::new()),
        }
    }

    /// ディスプレイ形状を設定・差し替える
    pub fn set_geometry(&self, display: DisplayId, geometry: DisplayGeometry) {
        self.geometries.lock().unwrap().insert(display, geometry);
    }

    /// ディスプレイを取り除く（切断のシミュレート）
    #[allow(dead_code)]
    pub fn remove(&self, display: DisplayId) {
        self.geometries.lock().unwrap().remove(&display);
    }
}

impl Default for StaticDisplayAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayTopologyPort for StaticDisplayAdapter {
    fn geometry(&self, display: DisplayId) -> Option<DisplayGeometry> {
        self.geometries.lock().unwrap().get(&display).copied()
    }
}

/// Win32ディスプレイトポロジアダプタ
#[cfg(windows)]
pub use win32::Win32DisplayAdapter;

#[cfg(windows)]
mod win32 {
    use super::*;
    use crate::domain::ports::DisplayNotification;
    use crate::domain::types::RectF;
    use crossbeam_channel::Receiver;
    use std::time::Duration;
    use windows::Win32::Foundation::{BOOL, LPARAM, RECT};
    use windows::Win32::Graphics::Gdi::{
        EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO,
    };
    use windows::Win32::UI::HiDpi::{GetDpiForMonitor, MDT_EFFECTIVE_DPI};

    /// Win32ディスプレイトポロジアダプタ
    ///
    /// DisplayIdはHMONITOR値をそのまま使う。可視フレームは`rcWork`
    /// （タスクバー等のシステム予約領域を除いた領域）から得る。
    pub struct Win32DisplayAdapter;

    impl Win32DisplayAdapter {
        pub fn new() -> Self {
            Self
        }

        /// 接続中のディスプレイID一覧を取得
        pub fn displays(&self) -> Vec<DisplayId> {
            enumerate_monitors()
                .into_iter()
                .map(|m| DisplayId(m.0 as u64))
                .collect()
        }

        /// ディスプレイ構成変更のポーリング監視を開始
        ///
        /// OSの通知ウィンドウを持たない代わりに、形状スナップショットを
        /// 一定間隔で比較し、差分があったときだけ通知を流す。
        /// 変化のない周期では何も送られない。
        pub fn start_change_polling(&self, interval: Duration) -> Receiver<DisplayNotification> {
            let (tx, rx) = crossbeam_channel::unbounded();

            std::thread::Builder::new()
                .name("display-poll".to_string())
                .spawn(move || {
                    let mut previous = topology_snapshot();
                    loop {
                        std::thread::sleep(interval);
                        let current = topology_snapshot();
                        if current != previous {
                            previous = current;
                            if tx.send(DisplayNotification).is_err() {
                                break;
                            }
                        }
                    }
                })
                .expect("Failed to spawn display poll thread");

            rx
        }
    }

    impl Default for Win32DisplayAdapter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DisplayTopologyPort for Win32DisplayAdapter {
        fn geometry(&self, display: DisplayId) -> Option<DisplayGeometry> {
            let hmonitor = enumerate_monitors()
                .into_iter()
                .find(|m| m.0 as u64 == display.0)?;
            monitor_geometry(hmonitor)
        }
    }

    struct MonitorEnumData {
        monitors: Vec<HMONITOR>,
    }

    fn enumerate_monitors() -> Vec<HMONITOR> {
        let mut data = MonitorEnumData {
            monitors: Vec::new(),
        };

        unsafe {
            extern "system" fn enum_proc(
                hmonitor: HMONITOR,
                _hdc: HDC,
                _lprect: *mut RECT,
                lparam: LPARAM,
            ) -> BOOL {
                unsafe {
                    let data = &mut *(lparam.0 as *mut MonitorEnumData);
                    data.monitors.push(hmonitor);
                    BOOL(1) // TRUE
                }
            }

            let _ = EnumDisplayMonitors(
                HDC(0),
                None,
                Some(enum_proc),
                LPARAM(&mut data as *mut _ as isize),
            );
        }

        data.monitors
    }

    fn monitor_geometry(hmonitor: HMONITOR) -> Option<DisplayGeometry> {
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };

        unsafe {
            if !GetMonitorInfoW(hmonitor, &mut info).as_bool() {
                return None;
            }
        }

        let scale = monitor_scale(hmonitor);

        Some(DisplayGeometry {
            frame: rect_to_logical(&info.rcMonitor, scale),
            visible_frame: rect_to_logical(&info.rcWork, scale),
            scale_factor: scale,
        })
    }

    /// モニタの実効DPIからスケール係数を求める（96dpi = 1.0）
    fn monitor_scale(hmonitor: HMONITOR) -> f64 {
        let mut dpi_x: u32 = 0;
        let mut dpi_y: u32 = 0;

        unsafe {
            if GetDpiForMonitor(hmonitor, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y).is_err()
                || dpi_x == 0
            {
                return 1.0;
            }
        }

        dpi_x as f64 / 96.0
    }

    fn rect_to_logical(rect: &RECT, scale: f64) -> RectF {
        RectF::new(
            rect.left as f64 / scale,
            rect.top as f64 / scale,
            (rect.right - rect.left) as f64 / scale,
            (rect.bottom - rect.top) as f64 / scale,
        )
    }

    /// 形状比較用のスナップショット
    fn topology_snapshot() -> Vec<(u64, (i32, i32, i32, i32), u32)> {
        enumerate_monitors()
            .into_iter()
            .map(|m| {
                let mut info = MONITORINFO {
                    cbSize: std::mem::size_of::<MONITORINFO>() as u32,
                    ..Default::default()
                };
                let ok = unsafe { GetMonitorInfoW(m, &mut info).as_bool() };
                let rect = if ok {
                    (
                        info.rcWork.left,
                        info.rcWork.top,
                        info.rcWork.right,
                        info.rcWork.bottom,
                    )
                } else {
                    (0, 0, 0, 0)
                };

                let mut dpi_x: u32 = 0;
                let mut dpi_y: u32 = 0;
                unsafe {
                    let _ = GetDpiForMonitor(m, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y);
                }

                (m.0 as u64, rect, dpi_x)
            })
            .collect()
    }
}
