use crate::state::{GameState, PeerId, PlayerAction, SessionCode};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 宿主 的消息 ---
// 这些是客户端可以发送给宿主的指令或动作。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientMessage {
    // --- 会话管理消息 ---
    /// 客户端请求创建一个新会话（创建者即宿主）
    CreateSession { nickname: String },
    /// 客户端凭口令加入一个已存在的会话
    JoinSession { code: SessionCode, nickname: String },
    /// 客户端主动离开会话
    LeaveSession,

    // --- 对局消息 ---
    /// 宿主要求按当前名单开始对局
    StartMatch,
    /// 玩家执行的游戏动作。动作发起者由连接身份解析，
    /// 消息里不携带（也不信任）玩家索引。
    PerformAction(PlayerAction),
    /// 一局结算完毕后，宿主要求发下一局
    NextRound,
}

// --- 宿主 -> 客户端 的消息 ---
// 宿主是唯一的状态权威：每次成功的动作之后，
// 它把完整的 GameState 快照广播给所有客户端。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    /// 成功创建或加入会话后，宿主私密地发给该玩家
    SessionJoined {
        your_id: PeerId,
        code: SessionCode,
        roster: Vec<RosterEntry>,
    },

    /// 会话名单变动（有人加入、离开或宿主易主）
    RosterUpdate { players: Vec<RosterEntry> },

    /// 对局开始，附带第一局的完整状态
    MatchStart(GameState),

    /// 完整游戏状态的快照。
    /// 客户端收到后整体替换本地状态，不做增量合并。
    StateBroadcast(GameState),

    /// 宿主向特定客户端发送提示或错误信息
    Info { message: String },
    Error { message: String },
}

/// 名单里的一个玩家
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RosterEntry {
    pub id: PeerId,
    pub name: String,
    pub is_host: bool,
}

impl From<PlayerAction> for ClientMessage {
    fn from(action: PlayerAction) -> Self {
        ClientMessage::PerformAction(action)
    }
}
