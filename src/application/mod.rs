//! Application Layer
//!
//! キャプチャセッションのライフサイクル制御、コントローラループ、
//! フレーム配信、ディスプレイ変更監視などのユースケースを実装します。
//!
//! ## モジュール構成
//! - `controller`: セッション状態機械（開始・停止・再構成）
//! - `runner`: 単一スレッドのコントローラループとハンドル
//! - `delivery`: ストリーム出力→プレゼンテーションシンクの配信アダプタ
//! - `watcher`: ディスプレイ構成変更の購読と転送
//! - `stats`: フレーム配信統計

pub mod controller;
pub mod delivery;
pub mod runner;
pub mod stats;
pub mod watcher;
