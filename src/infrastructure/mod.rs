//! Infrastructure層: 外部技術の統合
//!
//! Domain層のtraitを実装し、外部API（WGC/D3D11/DirectComposition/Win32）と
//! 接続する。テスト・非Windows環境向けのモック実装も同じ層に置く。

pub mod capture;
pub mod displays;
pub mod events;
pub mod sources;
pub mod surface;
