use crate::card::*;
use crate::state::*;
use rand::Rng;

// --- 对局生命周期 ---

/// 开始一场新对局
///
/// - 为每个座位创建玩家，累计分清零。
/// - 发第一局的牌并进入开局偷看阶段。
/// - 整场开局时弃牌堆为空，第一个玩家必须从牌堆摸牌；
///   之后的每一局才翻一张牌垫底。
///
/// # Panics
/// 玩家数不在 2 到 6 之间时 panic，游戏无法进行。
pub fn start_match(seats: Vec<(String, Option<PeerId>)>, rules: Rules) -> GameState {
    assert!(
        (2..=6).contains(&seats.len()),
        "Number of players must be between 2 and 6."
    );

    let players: Vec<Player> = seats
        .into_iter()
        .map(|(name, peer_id)| Player {
            name,
            hand: Vec::new(),
            has_looked_at_initial_cards: false,
            peer_id,
        })
        .collect();

    let n = players.len();
    let mut state = GameState {
        players,
        current_player_index: 0,
        draw_pile: Vec::new(),
        discard_pile: Vec::new(),
        drawn_card: None,
        phase: GamePhase::Setup,
        action_phase: None,
        pending_selection: None,
        total_scores: vec![0; n],
        eliminated: vec![false; n],
        closer_index: None,
        last_round_mode: false,
        turns_remaining_after_close: 0,
        has_acted_this_turn: false,
        last_round_result: None,
        rules,
    };
    deal_round(&mut state, true);
    state
}

/// 从 round_end 进入下一局
///
/// 只在结算阶段且还剩至少两名玩家时才被接受。
pub fn start_next_round(state: &mut GameState) -> bool {
    if state.phase != GamePhase::RoundEnd || state.is_match_over() {
        return false;
    }
    deal_round(state, false);
    true
}

/// 发一局的牌并重置所有局内字段
///
/// 已淘汰玩家的手牌被清空（不再参与发牌），
/// 这样牌的守恒量在每一局内都严格成立。
fn deal_round(state: &mut GameState, is_match_start: bool) {
    let mut deck = shuffled(&build_deck());

    for (index, player) in state.players.iter_mut().enumerate() {
        player.hand.clear();
        player.has_looked_at_initial_cards = false;
        if state.eliminated[index] {
            continue;
        }
        for i in 0..4 {
            // 最后发的两张（索引 2 和 3）可以在开局阶段偷看
            let card = deck.pop().unwrap();
            player.hand.push(HandSlot::hidden(card, i >= 2));
        }
    }

    state.discard_pile.clear();
    if !is_match_start {
        if let Some(card) = deck.pop() {
            state.discard_pile.push(card);
        }
    }
    state.draw_pile = deck;

    state.drawn_card = None;
    state.action_phase = None;
    state.pending_selection = None;
    state.closer_index = None;
    state.last_round_mode = false;
    state.turns_remaining_after_close = 0;
    state.has_acted_this_turn = false;
    state.last_round_result = None;

    // 在未淘汰玩家中均匀随机抽出先手
    state.current_player_index = random_active_index(state);
    state.phase = GamePhase::PeekInitial;
}

fn random_active_index(state: &GameState) -> usize {
    let active: Vec<usize> = (0..state.players.len())
        .filter(|&i| !state.eliminated[i])
        .collect();
    active[rand::rng().random_range(0..active.len())]
}

// --- 动作处理器 ---

/// 校验并应用一个玩家动作
///
/// 这是游戏逻辑的唯一驱动入口。actor 是动作发起者的玩家索引，
/// 联机模式下由主机根据连接身份解析，客户端声称的身份不可信。
///
/// 返回 true 表示动作被接受且状态已更新（主机此时广播快照）；
/// 返回 false 表示动作不合法，状态没有任何改动。
/// 不合法的动作静默丢弃，没有部分应用，也就不需要回滚。
pub fn apply_action(state: &mut GameState, actor: usize, action: &PlayerAction) -> bool {
    if actor >= state.players.len() || state.eliminated[actor] {
        return false;
    }

    match *action {
        // 这三类动作不受回合归属限制
        PlayerAction::PeekInitial { slot } => peek_initial_card(state, actor, slot),
        PlayerAction::EndPeek => end_peek(state, actor),
        PlayerAction::MatchingDiscard { slot } => attempt_matching_discard(state, actor, slot),
        // 其余动作只接受当前玩家
        PlayerAction::Draw => draw_from_stock(state, actor),
        PlayerAction::TakeDiscard => take_from_discard(state, actor),
        PlayerAction::DiscardDrawn => discard_drawn(state, actor),
        PlayerAction::Replace { slot } => replace_slot(state, actor, slot),
        PlayerAction::CloseRound => close_round(state, actor),
        PlayerAction::PeekOwn { slot } => resolve_peek_own(state, actor, slot),
        PlayerAction::PeekOpponent { player, slot } => {
            resolve_peek_opponent(state, actor, player, slot)
        }
        PlayerAction::SwapOwn { slot } => select_swap_own(state, actor, slot),
        PlayerAction::SwapOther { player, slot } => resolve_swap_other(state, actor, player, slot),
        PlayerAction::EndTurn => end_turn(state, actor),
    }
}

/// 清掉所有短暂翻开的牌面
///
/// 翻面展示只是给渲染层的窗口期，由宿主在固定延迟后调用本函数
/// 复位并重新广播。返回是否有任何改动。
pub fn clear_transient_reveals(state: &mut GameState) -> bool {
    let mut changed = false;
    for player in &mut state.players {
        for slot in &mut player.hand {
            if slot.face_up {
                slot.face_up = false;
                changed = true;
            }
        }
    }
    changed
}

fn is_current(state: &GameState, actor: usize) -> bool {
    actor == state.current_player_index
}

// --- 开局偷看阶段 ---

/// 点一张可偷看的牌：两张可偷看牌同时翻给自己看
///
/// 只标记 has_been_peeked（对自己的展示由渲染层完成，不进权威状态）。
/// 已经看过之后再点是无效操作。
fn peek_initial_card(state: &mut GameState, actor: usize, slot: usize) -> bool {
    if state.phase != GamePhase::PeekInitial {
        return false;
    }
    let player = &mut state.players[actor];
    match player.hand.get(slot) {
        Some(s) if s.can_peek && !s.has_been_peeked => {}
        _ => return false,
    }
    for s in &mut player.hand {
        if s.can_peek {
            s.has_been_peeked = true;
        }
    }
    true
}

/// 玩家确认"看完了"
///
/// 所有未淘汰玩家都确认之后才进入 playing 阶段；
/// 开局抽出的先手不受这个阶段影响。
fn end_peek(state: &mut GameState, actor: usize) -> bool {
    if state.phase != GamePhase::PeekInitial {
        return false;
    }
    if state.players[actor].has_looked_at_initial_cards {
        return false;
    }
    state.players[actor].has_looked_at_initial_cards = true;

    let all_ready = state
        .players
        .iter()
        .enumerate()
        .filter(|(i, _)| !state.eliminated[*i])
        .all(|(_, p)| p.has_looked_at_initial_cards);
    if all_ready {
        state.phase = GamePhase::Playing;
    }
    true
}

// --- playing 阶段的主动作 ---

/// 从牌堆摸一张
fn draw_from_stock(state: &mut GameState, actor: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Playing {
        return false;
    }
    if state.drawn_card.is_some() || state.has_acted_this_turn {
        return false;
    }
    recycle_discard_into_draw_pile(state);
    match state.draw_pile.pop() {
        Some(card) => {
            state.drawn_card = Some(card);
            true
        }
        // 牌堆和弃牌堆都枯竭，摸牌无效
        None => false,
    }
}

/// 拿走弃牌堆顶
fn take_from_discard(state: &mut GameState, actor: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Playing {
        return false;
    }
    if state.drawn_card.is_some() || state.has_acted_this_turn {
        return false;
    }
    match state.discard_pile.pop() {
        Some(card) => {
            state.drawn_card = Some(card);
            true
        }
        None => false,
    }
}

/// 把摸到的牌直接丢进弃牌堆
///
/// 丢出 10/J/Q 会立即进入对应的 action 子阶段。
fn discard_drawn(state: &mut GameState, actor: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Playing {
        return false;
    }
    let Some(card) = state.drawn_card.take() else {
        return false;
    };
    state.discard_pile.push(card);
    match card.special_action() {
        Some(action) => enter_special_action(state, action),
        None => state.has_acted_this_turn = true,
    }
    true
}

/// 用摸到的牌替换自己的一个槽位
///
/// 新牌短暂翻开展示给所有人，被换下的牌进弃牌堆；
/// 换下 10/J/Q 同样触发 action 子阶段。
fn replace_slot(state: &mut GameState, actor: usize, slot: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Playing {
        return false;
    }
    let Some(drawn) = state.drawn_card else {
        return false;
    };
    if slot >= state.players[actor].hand.len() {
        return false;
    }

    let slot_ref = &mut state.players[actor].hand[slot];
    let displaced = slot_ref.card;
    slot_ref.card = drawn;
    slot_ref.face_up = true;
    state.drawn_card = None;
    state.discard_pile.push(displaced);

    // 和 discard_drawn 同一约定：进入子阶段期间主动作标志保持 false，
    // 由子阶段收尾统一置位
    match displaced.special_action() {
        Some(action) => enter_special_action(state, action),
        None => state.has_acted_this_turn = true,
    }
    true
}

/// 配对弃牌：任何玩家任何时候都可以赌一把
///
/// 点数和弃牌堆顶相同：这张牌离手，手牌少一张，不消耗回合。
/// 点数不同：原牌留在原槽位，从牌堆摸一张罚牌背面朝上加入手牌。
fn attempt_matching_discard(state: &mut GameState, actor: usize, slot: usize) -> bool {
    match state.phase {
        GamePhase::Playing => {}
        GamePhase::Action if state.rules.match_during_action => {}
        _ => return false,
    }
    if state.drawn_card.is_some() {
        return false;
    }
    let Some(&top) = state.discard_top() else {
        return false;
    };
    if slot >= state.players[actor].hand.len() {
        return false;
    }

    let offered = state.players[actor].hand[slot].card;
    if offered.rank == top.rank {
        // 配对成功：牌离手进弃牌堆
        let removed = state.players[actor].hand.remove(slot);
        state.discard_pile.push(removed.card);
        // 换牌中途选中的槽位必须跟着移位：
        // 选中项只可能指向当前玩家自己的手牌
        if let Some(sel) = state.pending_selection {
            if sel.player == actor {
                if sel.slot == slot {
                    // 选中的牌刚被配对打出，退回重新选择
                    state.pending_selection = None;
                    if state.action_phase == Some(ActionPhase::SwapSelectOther) {
                        state.action_phase = Some(ActionPhase::SwapSelectOwn);
                    }
                } else if sel.slot > slot {
                    state.pending_selection = Some(SlotRef {
                        player: sel.player,
                        slot: sel.slot - 1,
                    });
                }
            }
        }
        true
    } else {
        // 配对失败：罚一张牌
        recycle_discard_into_draw_pile(state);
        match state.draw_pile.pop() {
            Some(penalty) => {
                state.players[actor].hand.push(HandSlot::hidden(penalty, false));
                true
            }
            // 无牌可罚，整个尝试视为无效
            None => false,
        }
    }
}

/// 宣布关牌（"我关了"）
///
/// 每局只能关一次，只有当前玩家、且手里没有摸起的牌时才能关。
/// 关牌者自己的回合不计入剩余回合数；没有对手要行动时立即结算。
fn close_round(state: &mut GameState, actor: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Playing {
        return false;
    }
    if state.drawn_card.is_some() {
        return false;
    }
    if state.closer_index.is_some() || state.last_round_mode {
        return false;
    }

    state.closer_index = Some(actor);
    state.last_round_mode = true;
    let opponents = (0..state.players.len())
        .filter(|&i| i != actor && !state.eliminated[i])
        .count() as u32;
    state.turns_remaining_after_close = opponents;

    if opponents == 0 {
        end_round(state);
        return true;
    }

    state.has_acted_this_turn = false;
    state.action_phase = None;
    state.current_player_index = next_active_index(state, actor);
    true
}

/// 结束自己的回合
///
/// 主动作完成后才允许。关牌倒计时在这里递减；
/// 计数归零或轮转回到关牌者都会触发结算，先到先触发。
fn end_turn(state: &mut GameState, actor: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Playing {
        return false;
    }
    if !state.has_acted_this_turn {
        return false;
    }

    state.drawn_card = None;
    state.action_phase = None;
    state.has_acted_this_turn = false;

    if state.last_round_mode {
        state.turns_remaining_after_close -= 1;
        if state.turns_remaining_after_close == 0 {
            end_round(state);
            return true;
        }
    }

    state.current_player_index = next_active_index(state, state.current_player_index);
    if state.last_round_mode && Some(state.current_player_index) == state.closer_index {
        end_round(state);
    }
    true
}

// --- action 子阶段（10/J/Q 的特殊动作） ---

fn enter_special_action(state: &mut GameState, action: SpecialAction) {
    state.phase = GamePhase::Action;
    state.pending_selection = None;
    state.action_phase = Some(match action {
        SpecialAction::PeekSelf => ActionPhase::PeekSelf,
        SpecialAction::PeekOpponent => ActionPhase::PeekOpponent,
        SpecialAction::Swap => ActionPhase::SwapSelectOwn,
    });
}

/// 子阶段收尾：回到 playing，主动作视为已完成，
/// 配对弃牌的窗口在结束回合之前仍然开放。
fn finish_special_action(state: &mut GameState) {
    state.phase = GamePhase::Playing;
    state.action_phase = None;
    state.pending_selection = None;
    state.has_acted_this_turn = true;
}

/// 10 的动作：看自己的一张牌
///
/// 展示只对本人、只在渲染层发生，权威状态不翻牌面。
fn resolve_peek_own(state: &mut GameState, actor: usize, slot: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Action {
        return false;
    }
    if state.action_phase != Some(ActionPhase::PeekSelf) {
        return false;
    }
    if slot >= state.players[actor].hand.len() {
        return false;
    }
    finish_special_action(state);
    true
}

/// J 的动作：看某个对手的一张牌
fn resolve_peek_opponent(state: &mut GameState, actor: usize, player: usize, slot: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Action {
        return false;
    }
    if state.action_phase != Some(ActionPhase::PeekOpponent) {
        return false;
    }
    if player == actor || player >= state.players.len() || state.eliminated[player] {
        return false;
    }
    if slot >= state.players[player].hand.len() {
        return false;
    }
    finish_special_action(state);
    true
}

/// Q 的动作第一步：选中自己的一张牌
fn select_swap_own(state: &mut GameState, actor: usize, slot: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Action {
        return false;
    }
    if state.action_phase != Some(ActionPhase::SwapSelectOwn) {
        return false;
    }
    if slot >= state.players[actor].hand.len() {
        return false;
    }
    state.pending_selection = Some(SlotRef { player: actor, slot });
    state.action_phase = Some(ActionPhase::SwapSelectOther);
    true
}

/// Q 的动作第二步：选中对方的一张牌并无条件交换
///
/// 两张牌背面朝上互换位置，谁也看不到内容。
fn resolve_swap_other(state: &mut GameState, actor: usize, player: usize, slot: usize) -> bool {
    if !is_current(state, actor) || state.phase != GamePhase::Action {
        return false;
    }
    if state.action_phase != Some(ActionPhase::SwapSelectOther) {
        return false;
    }
    if player == actor || player >= state.players.len() || state.eliminated[player] {
        return false;
    }
    if slot >= state.players[player].hand.len() {
        return false;
    }
    let Some(own) = state.pending_selection else {
        return false;
    };

    let own_card = state.players[own.player].hand[own.slot].card;
    let other_card = state.players[player].hand[slot].card;
    state.players[own.player].hand[own.slot].card = other_card;
    state.players[player].hand[slot].card = own_card;

    finish_special_action(state);
    true
}

// --- 结算与辅助 ---

/// 下一个未淘汰的玩家（循环）
fn next_active_index(state: &GameState, from: usize) -> usize {
    let mut index = from;
    loop {
        index = (index + 1) % state.players.len();
        if !state.eliminated[index] {
            return index;
        }
    }
}

/// 牌堆摸空时，把弃牌堆（保留堆顶）洗回成新牌堆
///
/// 这不是错误路径，是正常的循环用牌。
fn recycle_discard_into_draw_pile(state: &mut GameState) {
    if !state.draw_pile.is_empty() || state.discard_pile.len() <= 1 {
        return;
    }
    let top = state.discard_pile.pop().unwrap();
    state.draw_pile = shuffled(&state.discard_pile);
    state.discard_pile.clear();
    state.discard_pile.push(top);
}

/// 一局结算
///
/// - 每个未淘汰玩家的本局得分 = 手牌分值合计。
/// - 关牌者得分 <= 全场最低分：奖励 -4；否则惩罚 +10。
///   奖惩只作用于关牌者本人。
/// - 累计分达到 100 即淘汰，且淘汰不可逆。
fn end_round(state: &mut GameState) {
    state.phase = GamePhase::RoundEnd;

    let n = state.players.len();
    let raw_scores: Vec<Option<i32>> = (0..n)
        .map(|i| (!state.eliminated[i]).then(|| state.hand_score(i)))
        .collect();
    let min_score = raw_scores.iter().flatten().copied().min().unwrap_or(0);

    let mut closer_bonus = 0;
    let mut closer_won = false;
    if let Some(closer) = state.closer_index {
        // raw_scores[closer] 为 Some 当且仅当关牌者未淘汰
        if let Some(closer_score) = raw_scores[closer] {
            if closer_score <= min_score {
                closer_bonus = -4;
                closer_won = true;
            } else {
                closer_bonus = 10;
            }
        }
    }

    let mut round_scores = vec![None; n];
    let mut newly_eliminated = Vec::new();
    for (i, raw) in raw_scores.into_iter().enumerate() {
        let Some(score) = raw else { continue };
        let final_score = if Some(i) == state.closer_index {
            score + closer_bonus
        } else {
            score
        };
        round_scores[i] = Some(final_score);
        state.total_scores[i] += final_score;
        if state.total_scores[i] >= 100 {
            state.eliminated[i] = true;
            newly_eliminated.push(i);
        }
    }

    state.last_round_result = Some(RoundResult {
        round_scores,
        closer_index: state.closer_index,
        closer_bonus,
        closer_won,
        newly_eliminated,
    });
}

// --- 单元测试 ---
