use crate::card::Card;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PeerId = Uuid;

/// 会话口令：四个字符组成的短码，口头传达给同桌的朋友
pub type SessionCode = String;

/// 手牌中的一个槽位
/// 槽位顺序用于寻址（"第几张牌"），计分时顺序无关。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HandSlot {
    pub card: Card,
    // 短暂翻开展示用的标志，动作结束后必须复位为 false
    pub face_up: bool,
    // 发牌时固定：只有最后发的两张（索引 >= 2）可以在开局阶段偷看
    pub can_peek: bool,
    // 单调标志：本局内一旦看过就不再复位
    pub has_been_peeked: bool,
}

impl HandSlot {
    /// 一个背面朝上的新槽位
    pub fn hidden(card: Card, can_peek: bool) -> HandSlot {
        HandSlot { card, face_up: false, can_peek, has_been_peeked: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    // 手牌：初始 4 张，配对弃牌成功会变少，罚牌会变多
    pub hand: Vec<HandSlot>,
    // 开局偷看阶段是否已确认"看完了"（每局重置）
    pub has_looked_at_initial_cards: bool,
    // 联机模式下绑定到网络参与者；单机模式为 None
    pub peer_id: Option<PeerId>,
}

/// 回合/阶段状态机的主状态
/// setup -> peek_initial -> playing <-> action -> round_end，
/// round_end 之后回到下一局的 peek_initial 或者整场结束。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Setup,
    PeekInitial,
    Playing,
    Action,
    RoundEnd,
}

/// action 阶段的子状态，由 10/J/Q 触发
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPhase {
    PeekSelf,
    PeekOpponent,
    SwapSelectOwn,
    SwapSelectOther,
}

/// 玩家动作（action-request 的载荷）
/// 每个变体与引擎对外的一个动词一一对应。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAction {
    /// 从牌堆摸一张
    Draw,
    /// 拿走弃牌堆顶
    TakeDiscard,
    /// 把摸到的牌直接丢进弃牌堆
    DiscardDrawn,
    /// 用摸到的牌替换自己的一个槽位，被换下的牌进弃牌堆
    Replace { slot: usize },
    /// 配对弃牌：赌自己的某张牌和弃牌堆顶同点数（不限回合归属）
    MatchingDiscard { slot: usize },
    /// 开局偷看：点自己的一张可偷看牌（两张同时翻给自己看）
    PeekInitial { slot: usize },
    /// 开局偷看完毕
    EndPeek,
    /// 宣布关牌（"我关了"）
    CloseRound,
    /// 10 的动作：看自己的一张牌
    PeekOwn { slot: usize },
    /// J 的动作：看某个对手的一张牌
    PeekOpponent { player: usize, slot: usize },
    /// Q 的动作第一步：选中自己的一张牌
    SwapOwn { slot: usize },
    /// Q 的动作第二步：选中对方的一张牌并完成交换
    SwapOther { player: usize, slot: usize },
    /// 结束自己的回合
    EndTurn,
}

/// 可配置的规则开关
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rules {
    // 是否允许在别人的 action 子阶段里抢配对弃牌
    pub match_during_action: bool,
}

impl Default for Rules {
    fn default() -> Rules {
        Rules { match_during_action: false }
    }
}

/// 换牌动作中已选中的己方槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub player: usize,
    pub slot: usize,
}

/// 一局结束时的结算快照
/// 保留在状态里，迟到渲染的客户端也能展示结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    // 每个玩家本局的最终得分（含关牌奖惩）；已淘汰玩家为 None
    pub round_scores: Vec<Option<i32>>,
    pub closer_index: Option<usize>,
    pub closer_bonus: i32,
    pub closer_won: bool,
    pub newly_eliminated: Vec<usize>,
}

/// 整场对局的唯一权威状态
/// 联机模式下只有主机改动它；客户端整体替换收到的快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub players: Vec<Player>,
    pub current_player_index: usize,
    // 牌堆，顶部 = 末尾元素
    pub draw_pile: Vec<Card>,
    // 弃牌堆，顶部 = 末尾元素
    pub discard_pile: Vec<Card>,
    // 本回合已摸起但还没处理的牌
    pub drawn_card: Option<Card>,
    pub phase: GamePhase,
    pub action_phase: Option<ActionPhase>,
    // 换牌动作中途选中的己方槽位（最多一个）
    pub pending_selection: Option<SlotRef>,
    // 跨局累计分
    pub total_scores: Vec<i32>,
    // 单调：淘汰后不会复活
    pub eliminated: Vec<bool>,
    // 本局宣布关牌的玩家（每局最多设置一次）
    pub closer_index: Option<usize>,
    pub last_round_mode: bool,
    pub turns_remaining_after_close: u32,
    // 本回合已完成主动作（弃牌/替换），可以尝试配对弃牌或结束回合
    pub has_acted_this_turn: bool,
    pub last_round_result: Option<RoundResult>,
    pub rules: Rules,
}

// --- GameState 的查询方法 ---

impl GameState {
    /// 未淘汰玩家的数量
    pub fn active_player_count(&self) -> usize {
        self.eliminated.iter().filter(|&&e| !e).count()
    }

    /// 整场是否结束（至多剩一名未淘汰玩家）
    pub fn is_match_over(&self) -> bool {
        self.active_player_count() <= 1
    }

    /// 弃牌堆顶的牌
    pub fn discard_top(&self) -> Option<&Card> {
        self.discard_pile.last()
    }

    /// 根据网络身份查找玩家索引
    pub fn player_index_of(&self, peer: &PeerId) -> Option<usize> {
        self.players.iter().position(|p| p.peer_id.as_ref() == Some(peer))
    }

    /// 一局之内全部牌的总数（守恒量，应恒等于 52）
    pub fn card_count(&self) -> usize {
        self.draw_pile.len()
            + self.discard_pile.len()
            + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + usize::from(self.drawn_card.is_some())
    }

    /// 某个玩家当前手牌的分值合计
    pub fn hand_score(&self, index: usize) -> i32 {
        self.players[index].hand.iter().map(|s| s.card.point_value()).sum()
    }

    /// 最终排名：未淘汰者按累计分升序在前，已淘汰者在后
    pub fn final_ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        order.sort_by_key(|&i| (self.eliminated[i], self.total_scores[i]));
        order
    }
}
