//! ソース列挙アダプタ
//!
//! キャプチャ可能なウィンドウ一覧を提供する。サイズ・可視性・タイトルに
//! よるフィルタリングはこの層の責務であり、コントローラは結果をそのまま使う。

use std::sync::Mutex;

use crate::domain::error::CaptureResult;
use crate::domain::ports::SourceEnumerationPort;
use crate::domain::types::SourceWindow;

/// 静的なソース列挙アダプタ（テスト・モック構成用）
///
/// 一覧はテストから差し替え可能。
#[allow(dead_code)]
pub struct StaticSourceAdapter {
    windows: Mutex<Vec<SourceWindow>>,
}

#[allow(dead_code)]
impl StaticSourceAdapter {
    /// 指定の一覧を返すアダプタを作成
    pub fn new(windows: Vec<SourceWindow>) -> Self {
        Self {
            windows: Mutex::new(windows),
        }
    }

    /// 一覧を差し替える
    pub fn set_windows(&self, windows: Vec<SourceWindow>) {
        *self.windows.lock().unwrap() = windows;
    }
}

impl SourceEnumerationPort for StaticSourceAdapter {
    fn capturable_windows(&self) -> CaptureResult<Vec<SourceWindow>> {
        Ok(self.windows.lock().unwrap().clone())
    }
}

/// Win32ウィンドウ列挙アダプタ
#[cfg(windows)]
pub use win32::Win32SourceAdapter;

#[cfg(windows)]
mod win32 {
    use super::*;
    use crate::domain::types::{SizeF, WindowId};
    use windows::core::PWSTR;
    use windows::Win32::Foundation::{BOOL, CloseHandle, HWND, LPARAM, RECT};
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowRect, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
    };

    /// 列挙対象とする最小ウィンドウサイズ（これ未満はユーティリティ類とみなす）
    const MIN_WINDOW_WIDTH: i32 = 800;
    const MIN_WINDOW_HEIGHT: i32 = 600;

    /// Win32ウィンドウ列挙アダプタ
    ///
    /// トップレベルの可視ウィンドウのうち、タイトルを持ち一定サイズ以上の
    /// ものだけを返す。
    pub struct Win32SourceAdapter;

    impl Win32SourceAdapter {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for Win32SourceAdapter {
        fn default() -> Self {
            Self::new()
        }
    }

    struct EnumState {
        windows: Vec<SourceWindow>,
    }

    impl SourceEnumerationPort for Win32SourceAdapter {
        fn capturable_windows(&self) -> CaptureResult<Vec<SourceWindow>> {
            let mut state = EnumState {
                windows: Vec::new(),
            };

            unsafe {
                let _ = EnumWindows(Some(enum_proc), LPARAM(&mut state as *mut _ as isize));
            }

            Ok(state.windows)
        }
    }

    unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let state = &mut *(lparam.0 as *mut EnumState);

        if let Some(window) = describe_window(hwnd) {
            state.windows.push(window);
        }

        BOOL(1) // TRUE: 列挙を継続
    }

    unsafe fn describe_window(hwnd: HWND) -> Option<SourceWindow> {
        if !IsWindowVisible(hwnd).as_bool() {
            return None;
        }

        let mut title_buf = [0u16; 512];
        let title_len = GetWindowTextW(hwnd, &mut title_buf);
        if title_len <= 0 {
            return None;
        }
        let title = String::from_utf16_lossy(&title_buf[..title_len as usize]);

        let mut rect = RECT::default();
        if GetWindowRect(hwnd, &mut rect).is_err() {
            return None;
        }
        let width = rect.right - rect.left;
        let height = rect.bottom - rect.top;
        if width < MIN_WINDOW_WIDTH || height < MIN_WINDOW_HEIGHT {
            return None;
        }

        let mut pid: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
        if pid == 0 {
            return None;
        }

        Some(SourceWindow {
            id: WindowId(hwnd.0 as u64),
            title,
            application_name: process_name(pid).unwrap_or_default(),
            owner_pid: pid,
            on_screen: true,
            frame: SizeF::new(width as f64, height as f64),
        })
    }

    /// プロセスの実行ファイル名を取得（失敗時はNone）
    unsafe fn process_name(pid: u32) -> Option<String> {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;

        let mut buf = [0u16; 512];
        let mut len = buf.len() as u32;
        let result =
            QueryFullProcessImageNameW(handle, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut len);
        let _ = CloseHandle(handle);

        if result.is_err() || len == 0 {
            return None;
        }

        let path = String::from_utf16_lossy(&buf[..len as usize]);
        // フルパスからファイル名のみ取り出す
        path.rsplit(['\\', '/']).next().map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SizeF, WindowId};

    fn window(id: u64) -> SourceWindow {
        SourceWindow {
            id: WindowId(id),
            title: format!("Window {}", id),
            application_name: "App".to_string(),
            owner_pid: id as u32,
            on_screen: true,
            frame: SizeF::new(1024.0, 768.0),
        }
    }

    #[test]
    fn test_static_adapter_returns_configured_windows() {
        let adapter = StaticSourceAdapter::new(vec![window(1), window(2)]);
        let windows = adapter.capturable_windows().expect("enumeration failed");
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].id, WindowId(1));
    }

    #[test]
    fn test_static_adapter_set_windows() {
        let adapter = StaticSourceAdapter::new(vec![window(1)]);
        adapter.set_windows(vec![window(3), window(4), window(5)]);

        let windows = adapter.capturable_windows().expect("enumeration failed");
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].id, WindowId(5));
    }
}
