//! # 松鼠牌局核心逻辑库
//!
//! 这个 `core` crate 包含了"关牌比小"纸牌游戏的所有核心状态管理、
//! 回合与阶段推进、计分淘汰规则，以及客户端-宿主通信消息的定义。
//! 它的设计目标是与具体实现（如网络宿主、客户端UI）解耦，
//! 使其可以被任何上层应用复用。

mod card;
mod logic;
mod message;
mod state;

pub use card::*;

pub use logic::*;

pub use message::*;

pub use state::*;
