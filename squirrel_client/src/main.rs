use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use squirrel_core::{
    ClientMessage, GamePhase, GameState, PeerId, PlayerAction, ServerMessage,
};

/// 客户端本地保存的视图：自己的身份 + 最近一次收到的完整快照。
/// 快照整体替换，从不增量合并。
#[derive(Default)]
struct View {
    my_id: Option<PeerId>,
    game: Option<GameState>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url_str = std::env::var("SQUIRREL_URL")
        .unwrap_or_else(|_| "ws://127.0.0.1:26014/ws".to_string());
    let url = Url::parse(&url_str)?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await.expect("无法连接");
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    let view = Arc::new(Mutex::new(View::default()));

    // 启动一个任务来处理从宿主接收的消息
    let reader_view = view.clone();
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(server_msg) => {
                            handle_server_message(server_msg, &reader_view);
                            print!("> "); // 重新显示输入提示符
                            std::io::stdout().flush().unwrap();
                        }
                        Err(e) => eprintln!("解析宿主消息失败: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 松鼠牌局客户端 ---");
    println!("可用命令:");
    println!("  create <昵称>             - 创建一个新会话");
    println!("  join <口令> <昵称>        - 凭口令加入会话");
    println!("  start                     - 开始对局 (仅宿主)");
    println!("  peek <槽位>               - 开局时偷看（两张一起翻给自己）");
    println!("  ready                     - 确认看完开局牌");
    println!("  draw                      - 从牌堆摸一张");
    println!("  take                      - 拿走弃牌堆顶");
    println!("  discard                   - 丢掉摸到的牌");
    println!("  replace <槽位>            - 用摸到的牌替换自己的槽位");
    println!("  match <槽位>              - 配对弃牌（任何时候都可以赌）");
    println!("  close                     - 宣布关牌");
    println!("  end                       - 结束自己的回合");
    println!("  peekown <槽位>            - [10] 看自己的一张牌");
    println!("  peekopp <玩家> <槽位>     - [J] 看对手的一张牌");
    println!("  swapown <槽位>            - [Q] 选中自己的牌");
    println!("  swapother <玩家> <槽位>   - [Q] 选中对方的牌并交换");
    println!("  next                      - 发下一局 (仅宿主)");
    println!("  leave                     - 离开会话");
    println!("  exit                      - 退出");
    println!("(槽位和玩家编号都从 0 开始)");

    loop {
        print!("> ");
        std::io::stdout().flush().unwrap();

        let line = stdin.next_line().await?.unwrap_or_default();
        let parts: Vec<&str> = line.trim().split_whitespace().collect();
        let command = parts.first().cloned();

        let client_msg = match command {
            None => continue,
            Some("create") => {
                let nickname = parts.get(1).unwrap_or(&"新玩家").to_string();
                Some(ClientMessage::CreateSession { nickname })
            }
            Some("join") => {
                if parts.len() < 3 {
                    println!("用法: join <口令> <昵称>");
                    continue;
                }
                Some(ClientMessage::JoinSession {
                    code: parts[1].to_string(),
                    nickname: parts[2].to_string(),
                })
            }
            Some("start") => Some(ClientMessage::StartMatch),
            Some("peek") => match parse_slot(&parts) {
                Some(slot) => {
                    reveal_initial_peek(&view, slot);
                    Some(PlayerAction::PeekInitial { slot }.into())
                }
                None => continue,
            },
            Some("ready") => Some(PlayerAction::EndPeek.into()),
            Some("draw") => Some(PlayerAction::Draw.into()),
            Some("take") => Some(PlayerAction::TakeDiscard.into()),
            Some("discard") => Some(PlayerAction::DiscardDrawn.into()),
            Some("replace") => parse_slot(&parts).map(|slot| PlayerAction::Replace { slot }.into()),
            Some("match") => {
                parse_slot(&parts).map(|slot| PlayerAction::MatchingDiscard { slot }.into())
            }
            Some("close") => Some(PlayerAction::CloseRound.into()),
            Some("end") => Some(PlayerAction::EndTurn.into()),
            Some("peekown") => match parse_slot(&parts) {
                Some(slot) => {
                    reveal_own_card(&view, slot);
                    Some(PlayerAction::PeekOwn { slot }.into())
                }
                None => continue,
            },
            Some("peekopp") => match parse_player_slot(&parts) {
                Some((player, slot)) => {
                    reveal_opponent_card(&view, player, slot);
                    Some(PlayerAction::PeekOpponent { player, slot }.into())
                }
                None => continue,
            },
            Some("swapown") => parse_slot(&parts).map(|slot| PlayerAction::SwapOwn { slot }.into()),
            Some("swapother") => parse_player_slot(&parts)
                .map(|(player, slot)| PlayerAction::SwapOther { player, slot }.into()),
            Some("next") => Some(ClientMessage::NextRound),
            Some("leave") => Some(ClientMessage::LeaveSession),
            Some("exit") => {
                println!("正在断开连接...");
                break;
            }
            _ => {
                println!("未知命令: {}", line);
                continue;
            }
        };

        if let Some(msg) = client_msg {
            let payload = serde_json::to_string(&msg)?;
            write.send(Message::Text(payload.into())).await?;
        }
    }

    Ok(())
}

fn parse_slot(parts: &[&str]) -> Option<usize> {
    match parts.get(1).and_then(|s| s.parse().ok()) {
        Some(slot) => Some(slot),
        None => {
            println!("用法: {} <槽位>", parts[0]);
            None
        }
    }
}

fn parse_player_slot(parts: &[&str]) -> Option<(usize, usize)> {
    let player = parts.get(1).and_then(|s| s.parse().ok());
    let slot = parts.get(2).and_then(|s| s.parse().ok());
    match (player, slot) {
        (Some(player), Some(slot)) => Some((player, slot)),
        _ => {
            println!("用法: {} <玩家> <槽位>", parts[0]);
            None
        }
    }
}

/// 处理宿主消息并更新本地视图
fn handle_server_message(msg: ServerMessage, view: &Arc<Mutex<View>>) {
    match msg {
        ServerMessage::SessionJoined { your_id, code, roster } => {
            view.lock().unwrap().my_id = Some(your_id);
            println!("\n已加入会话，口令: {}", code);
            print_roster(&roster);
        }
        ServerMessage::RosterUpdate { players } => {
            println!("\n名单更新:");
            print_roster(&players);
        }
        ServerMessage::MatchStart(state) | ServerMessage::StateBroadcast(state) => {
            let mut v = view.lock().unwrap();
            let my_id = v.my_id;
            render_state(&state, my_id);
            v.game = Some(state);
        }
        ServerMessage::Info { message } => println!("\n[提示] {}", message),
        ServerMessage::Error { message } => println!("\n[错误] {}", message),
    }
}

fn print_roster(roster: &[squirrel_core::RosterEntry]) {
    for (i, entry) in roster.iter().enumerate() {
        let host_mark = if entry.is_host { " (宿主)" } else { "" };
        println!("  [{}] {}{}", i, entry.name, host_mark);
    }
}

/// 把完整快照渲染成一块紧凑的牌桌
fn render_state(state: &GameState, my_id: Option<PeerId>) {
    println!("\n==== 牌桌 ====");
    println!(
        "阶段: {:?}{}  牌堆: {} 张  弃牌堆顶: {}",
        state.phase,
        state
            .action_phase
            .map(|a| format!(" / {:?}", a))
            .unwrap_or_default(),
        state.draw_pile.len(),
        state
            .discard_top()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "(空)".to_string()),
    );
    if state.last_round_mode {
        println!("** 已关牌，剩余 {} 个回合 **", state.turns_remaining_after_close);
    }

    for (i, player) in state.players.iter().enumerate() {
        let is_me = my_id.is_some() && player.peer_id == my_id;
        let mut marks = String::new();
        if i == state.current_player_index && state.phase != GamePhase::RoundEnd {
            marks.push('*');
        }
        if state.closer_index == Some(i) {
            marks.push('关');
        }
        if state.eliminated[i] {
            marks.push_str("出局");
        }
        let hand: Vec<String> = player
            .hand
            .iter()
            .map(|s| {
                if s.face_up {
                    s.card.to_string()
                } else {
                    "[#]".to_string()
                }
            })
            .collect();
        println!(
            "  [{}] {:<10} 累计 {:>3} 分  手牌: {}{}",
            i,
            format!("{}{}", player.name, if is_me { "(我)" } else { "" }),
            state.total_scores[i],
            hand.join(" "),
            if marks.is_empty() {
                String::new()
            } else {
                format!("  <{}>", marks)
            },
        );
    }

    if let Some(card) = state.drawn_card {
        let holder = &state.players[state.current_player_index].name;
        let mine = my_id.is_some()
            && state.players[state.current_player_index].peer_id == my_id;
        if mine {
            println!("  摸到的牌: {}", card);
        } else {
            println!("  {} 手里正摸着一张牌", holder);
        }
    }

    if state.phase == GamePhase::RoundEnd {
        if let Some(result) = &state.last_round_result {
            println!("---- 本局结算 ----");
            for (i, score) in result.round_scores.iter().enumerate() {
                if let Some(score) = score {
                    let closer_mark = if result.closer_index == Some(i) {
                        if result.closer_won {
                            " (关牌成功 -4)"
                        } else {
                            " (关牌失败 +10)"
                        }
                    } else {
                        ""
                    };
                    println!("  {}: {} 分{}", state.players[i].name, score, closer_mark);
                }
            }
            if !result.newly_eliminated.is_empty() {
                for &i in &result.newly_eliminated {
                    println!("  {} 累计超过 100 分，出局!", state.players[i].name);
                }
            }
            if state.is_match_over() {
                println!("==== 整场结束 ====");
                for (rank, &i) in state.final_ranking().iter().enumerate() {
                    println!(
                        "  第 {} 名: {} ({} 分)",
                        rank + 1,
                        state.players[i].name,
                        state.total_scores[i]
                    );
                }
            }
        }
    }
}

// --- 本地偷看展示 ---
// 看牌只展示给自己，宿主广播的快照不翻牌面，
// 所以内容直接从本地快照里读出来打印。

fn reveal_initial_peek(view: &Arc<Mutex<View>>, slot: usize) {
    let v = view.lock().unwrap();
    let Some((state, me)) = my_seat(&v) else { return };
    if state.phase != GamePhase::PeekInitial {
        return;
    }
    if state.players[me].hand.get(slot).is_none_or(|s| !s.can_peek) {
        return;
    }
    let peeked: Vec<String> = state.players[me]
        .hand
        .iter()
        .enumerate()
        .filter(|(_, s)| s.can_peek)
        .map(|(i, s)| format!("槽位 {} = {}", i, s.card))
        .collect();
    println!("(偷看) {}", peeked.join("，"));
}

fn reveal_own_card(view: &Arc<Mutex<View>>, slot: usize) {
    let v = view.lock().unwrap();
    let Some((state, me)) = my_seat(&v) else { return };
    if let Some(s) = state.players[me].hand.get(slot) {
        println!("(偷看) 自己的槽位 {} = {}", slot, s.card);
    }
}

fn reveal_opponent_card(view: &Arc<Mutex<View>>, player: usize, slot: usize) {
    let v = view.lock().unwrap();
    let Some((state, _)) = my_seat(&v) else { return };
    if let Some(s) = state
        .players
        .get(player)
        .and_then(|p| p.hand.get(slot))
    {
        println!("(偷看) {} 的槽位 {} = {}", state.players[player].name, slot, s.card);
    }
}

fn my_seat(v: &View) -> Option<(&GameState, usize)> {
    let state = v.game.as_ref()?;
    let my_id = v.my_id?;
    let me = state.player_index_of(&my_id)?;
    Some((state, me))
}
